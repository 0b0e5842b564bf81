//! # CastGuard Configuration Module
//!
//! Configuration management for CastGuard:
//! - an embedded default configuration (`castguard.yaml`)
//! - merged with `<config_dir>/config.yaml` when present
//! - overridden by `CASTGUARD_CONFIG__SECTION__KEY` environment variables
//! - typed getters/setters, written back to disk on every change
//!
//! ## Usage
//!
//! ```no_run
//! use cgconfig::{get_config, init_config};
//!
//! // Optional: choose the directory before the first access
//! init_config("/etc/castguard")?;
//!
//! let config = get_config();
//! let port = config.get_http_port();
//! let keywords_file = config.get_keywords_file();
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Result, anyhow};
use cgutils::guess_local_ip;
use dirs::home_dir;
use once_cell::sync::OnceCell;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::info;

#[cfg(feature = "api")]
pub mod api;
#[cfg(feature = "api")]
pub mod openapi;

#[cfg(feature = "api")]
pub use openapi::ApiDoc;

const DEFAULT_CONFIG: &str = include_str!("castguard.yaml");

static CONFIG: OnceCell<Arc<Config>> = OnceCell::new();

const ENV_CONFIG_DIR: &str = "CASTGUARD_CONFIG";
const ENV_PREFIX: &str = "CASTGUARD_CONFIG__";
const CONFIG_DIR_NAME: &str = ".castguard";

const DEFAULT_HTTP_PORT: u16 = 80;
const DEFAULT_FALLBACK_HTTP_PORT: u16 = 8080;
const DEFAULT_CAST_PORT: u16 = 8009;
const DEFAULT_LOG_BUFFER_CAPACITY: usize = 1000;
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;
const DEFAULT_KEYWORDS_FILE: &str = "blocker_config.json";

/// Generates a getter/setter pair for an unsigned value with a default.
macro_rules! impl_u64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> u64 {
            match self.get_value($path) {
                Ok(Value::Number(n)) => n.as_u64().unwrap_or($default),
                Ok(Value::String(s)) => s.trim().parse().unwrap_or($default),
                _ => $default,
            }
        }

        pub fn $setter(&self, value: u64) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

/// Generates a getter/setter pair for a usize value with a default.
macro_rules! impl_usize_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> usize {
            match self.get_value($path) {
                Ok(Value::Number(n)) => n.as_u64().map(|v| v as usize).unwrap_or($default),
                _ => $default,
            }
        }

        pub fn $setter(&self, size: usize) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(size)))
        }
    };
}

/// Generates a getter/setter pair for a bool value with a default.
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> bool {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => b,
                _ => $default,
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Configuration manager for CastGuard.
///
/// The whole tree is kept as a YAML value behind a mutex; every setter
/// writes the file back so the on-disk `config.yaml` always reflects the
/// running configuration.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        if Path::new(CONFIG_DIR_NAME).exists() {
            return CONFIG_DIR_NAME.to_string();
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        CONFIG_DIR_NAME.to_string()
    }

    /// Creates the directory if needed and checks it is readable and writable.
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        fs::read_dir(path)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `CASTGUARD_CONFIG` environment variable
    /// 3. `.castguard` in the current directory
    /// 4. `.castguard` in the user's home directory
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides
    /// 5. Saves the merged configuration
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir = %config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut config_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        match fs::read(&path) {
            Ok(data) => {
                info!(config_file = %path, "Loaded config file");
                let external_value: Value = serde_yaml::from_slice(&data)?;
                merge_yaml(&mut config_value, &Self::lower_keys_value(external_value));
            }
            Err(_) => {
                info!(config_file = %path, "Config file not found, using default embedded config");
            }
        }

        let mut config_value = Self::lower_keys_value(config_value);
        Self::apply_overrides(&mut config_value, env::vars());

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Value>> {
        self.data
            .lock()
            .map_err(|e| anyhow!("Configuration lock poisoned: {}", e))
    }

    /// Returns the directory holding `config.yaml`.
    pub fn dir(&self) -> &str {
        &self.config_dir
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let yaml = {
            let data = self.lock()?;
            serde_yaml::to_string(&*data)?
        };
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// `path` is an array of keys, e.g. `&["host", "http_port"]`.
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.lock()?;
            Self::set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.lock()?;
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                match map.get(Value::String(key.to_lowercase())) {
                    Some(next) => current = next,
                    None => {
                        return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                    }
                }
            } else {
                return Err(anyhow!("Path {} is not a mapping", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    /// Applies `CASTGUARD_CONFIG__A__B=value` style overrides.
    fn apply_overrides<I>(config: &mut Value, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                if let Err(e) = Self::set_value_internal(config, &key_path, yaml_value) {
                    tracing::warn!(env_var = %key, "Ignoring configuration override: {}", e);
                }
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    let key = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    new_map.insert(key, Self::lower_keys_value(v));
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Resolves a path relative to the configuration directory.
    ///
    /// Absolute paths are returned untouched.
    pub fn resolve_path(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.config_dir).join(path)
        }
    }

    fn get_string(&self, path: &[&str]) -> Option<String> {
        match self.get_value(path) {
            Ok(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Ok(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    fn get_port(&self, path: &[&str], default: u16) -> u16 {
        match self.get_value(path) {
            Ok(Value::Number(n)) => match n.as_u64().and_then(|p| u16::try_from(p).ok()) {
                Some(port) => port,
                None => {
                    tracing::warn!("Invalid port {} at {}, using {}", n, path.join("."), default);
                    default
                }
            },
            Ok(Value::String(s)) => s.trim().parse::<u16>().unwrap_or_else(|_| {
                tracing::warn!("Invalid port '{}' at {}, using {}", s, path.join("."), default);
                default
            }),
            _ => default,
        }
    }

    // ------------------------------------------------------------------
    // host
    // ------------------------------------------------------------------

    /// Gets the base URL (host name or IP) advertised for the HTTP server.
    ///
    /// Falls back to the guessed local IP address when not configured.
    pub fn get_base_url(&self) -> String {
        self.get_string(&["host", "base_url"])
            .unwrap_or_else(guess_local_ip)
    }

    /// Gets the HTTP port of the control panel (80 unless configured).
    pub fn get_http_port(&self) -> u16 {
        self.get_port(&["host", "http_port"], DEFAULT_HTTP_PORT)
    }

    pub fn set_http_port(&self, port: u16) -> Result<()> {
        self.set_value(&["host", "http_port"], Value::Number(Number::from(port)))
    }

    /// Port tried when the main HTTP port cannot be bound.
    pub fn get_fallback_http_port(&self) -> u16 {
        self.get_port(&["host", "fallback_http_port"], DEFAULT_FALLBACK_HTTP_PORT)
    }

    impl_usize_config!(
        get_log_cache_size,
        set_log_cache_size,
        &["host", "logger", "buffer_capacity"],
        DEFAULT_LOG_BUFFER_CAPACITY
    );

    impl_bool_config!(
        get_log_enable_console,
        set_log_enable_console,
        &["host", "logger", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );

    pub fn get_log_min_level(&self) -> String {
        self.get_string(&["host", "logger", "min_level"])
            .unwrap_or_else(|| DEFAULT_LOG_MIN_LEVEL.to_string())
    }

    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["host", "logger", "min_level"], Value::String(level))
    }

    // ------------------------------------------------------------------
    // device
    // ------------------------------------------------------------------

    /// Friendly name of the device to monitor, if one is configured.
    pub fn get_device_friendly_name(&self) -> Option<String> {
        self.get_string(&["device", "friendly_name"])
    }

    /// Address of the device when discovery should be skipped.
    pub fn get_device_host(&self) -> Option<String> {
        self.get_string(&["device", "host"])
    }

    pub fn get_device_port(&self) -> u16 {
        self.get_port(&["device", "port"], DEFAULT_CAST_PORT)
    }

    impl_u64_config!(
        get_discovery_timeout_secs,
        set_discovery_timeout_secs,
        &["device", "discovery_timeout_secs"],
        5
    );

    impl_u64_config!(
        get_discovery_retry_secs,
        set_discovery_retry_secs,
        &["device", "discovery_retry_secs"],
        5
    );

    impl_u64_config!(
        get_command_timeout_secs,
        set_command_timeout_secs,
        &["device", "command_timeout_secs"],
        5
    );

    // ------------------------------------------------------------------
    // blocker
    // ------------------------------------------------------------------

    /// Path of the keyword file, resolved against the config directory.
    pub fn get_keywords_file(&self) -> PathBuf {
        let file = self
            .get_string(&["blocker", "keywords_file"])
            .unwrap_or_else(|| DEFAULT_KEYWORDS_FILE.to_string());
        self.resolve_path(&file)
    }

    impl_u64_config!(
        get_poll_interval_ms,
        set_poll_interval_ms,
        &["blocker", "poll_interval_ms"],
        2000
    );

    impl_u64_config!(
        get_reconnect_interval_secs,
        set_reconnect_interval_secs,
        &["blocker", "reconnect_interval_secs"],
        10
    );

    impl_u64_config!(
        get_volume_check_interval_secs,
        set_volume_check_interval_secs,
        &["blocker", "volume_check_interval_secs"],
        5
    );

    impl_u64_config!(
        get_mute_duration_secs,
        set_mute_duration_secs,
        &["blocker", "mute_duration_secs"],
        600
    );

    impl_u64_config!(
        get_detection_log_interval_secs,
        set_detection_log_interval_secs,
        &["blocker", "detection_log_interval_secs"],
        10
    );

    impl_u64_config!(
        get_pause_settle_ms,
        set_pause_settle_ms,
        &["blocker", "pause_settle_ms"],
        500
    );

    impl_usize_config!(
        get_recent_apps_capacity,
        set_recent_apps_capacity,
        &["blocker", "recent_apps_capacity"],
        5
    );

    /// Apps (display names or app ids) that may play without exposing a title.
    pub fn get_titleless_apps(&self) -> Vec<String> {
        match self.get_value(&["blocker", "titleless_apps"]) {
            Ok(Value::Sequence(seq)) => seq
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            _ => vec!["YouTube".to_string(), "233637DE".to_string()],
        }
    }
}

/// Loads the global configuration from `directory` (empty: default lookup).
///
/// Must be called before the first [`get_config`] to have any effect;
/// later calls return the already loaded instance.
pub fn init_config(directory: &str) -> Result<Arc<Config>> {
    CONFIG
        .get_or_try_init(|| Config::load_config(directory).map(Arc::new))
        .cloned()
}

/// Returns the global configuration instance, loading it on first access.
///
/// # Panics
///
/// Panics if the default configuration directory cannot be created.
pub fn get_config() -> Arc<Config> {
    CONFIG
        .get_or_init(|| {
            Arc::new(Config::load_config("").expect("Failed to load CastGuard configuration"))
        })
        .clone()
}

/// Merges external YAML configuration into default configuration
///
/// Mappings are merged key by key; scalars and sequences from `external`
/// replace the default value.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_in(dir: &tempfile::TempDir) -> Config {
        Config::load_config(dir.path().to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_defaults_from_embedded_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_in(&dir);

        assert_eq!(config.get_http_port(), 80);
        assert_eq!(config.get_fallback_http_port(), 8080);
        assert_eq!(config.get_poll_interval_ms(), 2000);
        assert_eq!(config.get_reconnect_interval_secs(), 10);
        assert_eq!(config.get_volume_check_interval_secs(), 5);
        assert_eq!(config.get_mute_duration_secs(), 600);
        assert_eq!(config.get_recent_apps_capacity(), 5);
        assert_eq!(config.get_device_port(), 8009);
        assert_eq!(config.get_device_host(), None);
        assert_eq!(config.get_titleless_apps(), vec!["YouTube", "233637DE"]);
    }

    #[test]
    fn test_config_file_is_written_back() {
        let dir = tempfile::tempdir().unwrap();
        let _config = load_in(&dir);
        assert!(dir.path().join("config.yaml").exists());
    }

    #[test]
    fn test_external_file_is_merged() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.yaml"),
            "Host:\n  HTTP_PORT: 9090\nblocker:\n  mute_duration_secs: 30\n",
        )
        .unwrap();

        let config = load_in(&dir);
        assert_eq!(config.get_http_port(), 9090);
        assert_eq!(config.get_mute_duration_secs(), 30);
        // untouched defaults survive the merge
        assert_eq!(config.get_poll_interval_ms(), 2000);
    }

    #[test]
    fn test_setter_persists() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_in(&dir);
        config.set_http_port(8181).unwrap();

        let reloaded = load_in(&dir);
        assert_eq!(reloaded.get_http_port(), 8181);
    }

    #[test]
    fn test_overrides_apply_to_nested_keys() {
        let mut value: Value = serde_yaml::from_str(DEFAULT_CONFIG).unwrap();
        Config::apply_overrides(
            &mut value,
            vec![
                (
                    "CASTGUARD_CONFIG__BLOCKER__POLL_INTERVAL_MS".to_string(),
                    "500".to_string(),
                ),
                ("UNRELATED".to_string(), "1".to_string()),
            ],
        );

        let poll = Config::get_value_internal(&value, &["blocker", "poll_interval_ms"]).unwrap();
        assert_eq!(poll, Value::Number(Number::from(500)));
    }

    #[test]
    fn test_keywords_file_resolved_in_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_in(&dir);
        assert_eq!(
            config.get_keywords_file(),
            dir.path().join("blocker_config.json")
        );
    }

    #[test]
    fn test_invalid_port_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_in(&dir);
        config
            .set_value(&["host", "http_port"], Value::String("nope".into()))
            .unwrap();
        assert_eq!(config.get_http_port(), 80);
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_in(&dir);
        assert!(config.get_value(&["nothing", "here"]).is_err());
    }
}
