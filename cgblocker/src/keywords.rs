//! Keyword list shared between the HTTP layer and the monitor thread.
//!
//! Persisted as `{"keywords": [...]}`. Keywords are kept trimmed and
//! lower-cased; an empty list puts the monitor in cautious mode.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::BlockerError;

/// Keywords used until the operator saves a list of their own.
pub const DEFAULT_KEYWORDS: [&str; 10] = [
    "minecraft",
    "minecraf",
    "miecraft",
    "creeper",
    "steve",
    "enderman",
    "ender dragon",
    "skeleton",
    "zombie",
    "mojang",
];

#[derive(Debug, Serialize, Deserialize)]
struct KeywordFile {
    keywords: Vec<String>,
}

/// Splits a comma separated list: `"a, B ,,c"` gives `["a", "b", "c"]`.
pub fn parse_keyword_list(input: &str) -> Vec<String> {
    normalize_keywords(input.split(','))
}

/// Trims, lower-cases and drops blank entries, keeping order.
pub fn normalize_keywords<I, S>(keywords: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keywords
        .into_iter()
        .map(|k| k.as_ref().trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

fn default_keywords() -> Vec<String> {
    DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

#[derive(Clone, Debug)]
pub struct KeywordStore {
    path: PathBuf,
    keywords: Arc<RwLock<Vec<String>>>,
}

impl KeywordStore {
    /// Loads the list from `path`.
    ///
    /// A missing or unreadable file yields the default list; nothing is
    /// written until the first [`KeywordStore::replace`].
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let keywords = match Self::read(&path) {
            Ok(Some(keywords)) => {
                info!("Loaded {} keyword(s) from {}", keywords.len(), path.display());
                keywords
            }
            Ok(None) => {
                info!(
                    "No keyword file at {}, using the default list",
                    path.display()
                );
                default_keywords()
            }
            Err(e) => {
                warn!("Ignoring keyword file {}: {}", path.display(), e);
                default_keywords()
            }
        };

        Self {
            path,
            keywords: Arc::new(RwLock::new(keywords)),
        }
    }

    fn read(path: &Path) -> Result<Option<Vec<String>>, BlockerError> {
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(path).map_err(|e| BlockerError::keywords(path, e))?;
        let file: KeywordFile =
            serde_json::from_str(&data).map_err(|e| BlockerError::keywords(path, e))?;
        Ok(Some(normalize_keywords(file.keywords)))
    }

    fn save(&self, keywords: &[String]) -> Result<(), BlockerError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| BlockerError::keywords(&self.path, e))?;
        }

        let file = KeywordFile {
            keywords: keywords.to_vec(),
        };
        let json =
            serde_json::to_string_pretty(&file).map_err(|e| BlockerError::keywords(&self.path, e))?;
        fs::write(&self.path, json).map_err(|e| BlockerError::keywords(&self.path, e))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.keywords
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// True when no keyword is configured.
    pub fn is_cautious(&self) -> bool {
        self.keywords
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Replaces the list and writes it to disk.
    ///
    /// The in-memory list is updated even when saving fails, so the monitor
    /// uses the new keywords right away.
    pub fn replace<I, S>(&self, keywords: I) -> Result<Vec<String>, BlockerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = normalize_keywords(keywords);
        *self
            .keywords
            .write()
            .unwrap_or_else(PoisonError::into_inner) = keywords.clone();

        self.save(&keywords)?;
        info!("Keywords updated: {:?}", keywords);
        Ok(keywords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keyword_list() {
        assert_eq!(parse_keyword_list("a, B ,,c"), vec!["a", "b", "c"]);
        assert!(parse_keyword_list(" , ,").is_empty());
        assert_eq!(parse_keyword_list("Ender Dragon"), vec!["ender dragon"]);
    }

    #[test]
    fn test_missing_file_uses_defaults_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocker_config.json");

        let store = KeywordStore::load(&path);
        assert_eq!(store.snapshot().len(), DEFAULT_KEYWORDS.len());
        assert!(store.snapshot().contains(&"minecraft".to_string()));
        assert!(!store.is_cautious());
        assert!(!path.exists());
    }

    #[test]
    fn test_replace_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocker_config.json");

        let store = KeywordStore::load(&path);
        let saved = store.replace(["  Peppa ", "", "BLUEY"]).unwrap();
        assert_eq!(saved, vec!["peppa", "bluey"]);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({ "keywords": ["peppa", "bluey"] }));

        let reloaded = KeywordStore::load(&path);
        assert_eq!(reloaded.snapshot(), vec!["peppa", "bluey"]);
    }

    #[test]
    fn test_saved_empty_list_means_cautious() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocker_config.json");
        fs::write(&path, r#"{"keywords": []}"#).unwrap();

        let store = KeywordStore::load(&path);
        assert!(store.is_cautious());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocker_config.json");
        fs::write(&path, "not json").unwrap();

        let store = KeywordStore::load(&path);
        assert_eq!(store.snapshot().len(), DEFAULT_KEYWORDS.len());
    }

    #[test]
    fn test_clones_share_the_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeywordStore::load(dir.path().join("k.json"));
        let other = store.clone();

        store.replace(Vec::<String>::new()).unwrap();
        assert!(other.is_cautious());
    }

    #[test]
    fn test_save_failure_still_updates_memory() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the file should be
        let path = dir.path().join("taken");
        fs::create_dir(&path).unwrap();

        let store = KeywordStore::load(&path);
        assert!(store.replace(["bluey"]).is_err());
        assert_eq!(store.snapshot(), vec!["bluey"]);
    }
}
