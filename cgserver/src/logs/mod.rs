//! Journalisation : ring buffer, flux SSE et niveau de log réglable à chaud.
//!
//! [`init_logging`] installe un subscriber `tracing` composé d'un filtre
//! rechargeable, d'un [`SseLayer`] qui alimente le buffer et, si demandé,
//! d'une sortie console.

mod sselayer;

pub use sselayer::SseLayer;

use std::{
    collections::VecDeque,
    sync::{Arc, PoisonError, RwLock},
};

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use cgconfig::Config;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::Level;
use tracing_subscriber::{
    Registry, filter::LevelFilter, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

const LEVELS: [&str; 5] = ["ERROR", "WARN", "INFO", "DEBUG", "TRACE"];

/// Une entrée de log capturée
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
}

/// Buffer circulaire partagé entre le layer et les handlers HTTP
#[derive(Clone)]
pub struct LogState {
    buffer: Arc<RwLock<VecDeque<LogEntry>>>,
    capacity: usize,
    tx: broadcast::Sender<LogEntry>,
    max_level: Arc<RwLock<Level>>,
    reload_handle: reload::Handle<LevelFilter, Registry>,
}

impl LogState {
    pub fn new(capacity: usize, reload_handle: reload::Handle<LevelFilter, Registry>) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
            tx: broadcast::channel(256).0,
            max_level: Arc::new(RwLock::new(Level::TRACE)),
            reload_handle,
        }
    }

    /// Change le niveau minimal, côté filtre comme côté flux SSE.
    pub fn set_max_level(&self, level: Level) -> Result<(), reload::Error> {
        *self.max_level.write().unwrap_or_else(PoisonError::into_inner) = level;
        self.reload_handle.reload(LevelFilter::from_level(level))
    }

    pub fn get_max_level(&self) -> Level {
        *self.max_level.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, entry: LogEntry) {
        {
            let mut buf = self.buffer.write().unwrap_or_else(PoisonError::into_inner);
            while buf.len() >= self.capacity {
                buf.pop_front();
            }
            buf.push_back(entry.clone());
        }
        // no subscriber is fine
        let _ = self.tx.send(entry);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.tx.subscribe()
    }

    pub fn dump(&self) -> Vec<LogEntry> {
        self.buffer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

/// Paramètres de `/log-sse` : filtres par niveau et recherche plein texte
#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub error: Option<bool>,
    #[serde(default)]
    pub warn: Option<bool>,
    #[serde(default)]
    pub info: Option<bool>,
    #[serde(default)]
    pub debug: Option<bool>,
    #[serde(default)]
    pub trace: Option<bool>,
    #[serde(default)]
    pub search: Option<String>,
}

impl LogQuery {
    fn accepts(&self, entry: &LogEntry) -> bool {
        let flags = [
            ("ERROR", self.error),
            ("WARN", self.warn),
            ("INFO", self.info),
            ("DEBUG", self.debug),
            ("TRACE", self.trace),
        ];

        let any_flag = flags.iter().any(|(_, f)| f.unwrap_or(false));
        let level_ok = !any_flag
            || flags
                .iter()
                .any(|(name, f)| f.unwrap_or(false) && entry.level.eq_ignore_ascii_case(name));

        let search_ok = match &self.search {
            Some(s) => entry.message.contains(s.as_str()) || entry.target.contains(s.as_str()),
            None => true,
        };

        level_ok && search_ok
    }
}

/// GET /log-sse : historique puis flux temps réel
pub async fn log_sse(
    State(state): State<LogState>,
    Query(params): Query<LogQuery>,
) -> impl IntoResponse {
    let mut rx = state.subscribe();
    let history = state.dump();

    let stream = async_stream::stream! {
        let level = state.get_max_level();
        for entry in history {
            if is_level_allowed(&entry.level, level) && params.accepts(&entry) {
                if let Ok(event) = Event::default().json_data(&entry) {
                    yield Ok::<_, axum::Error>(event);
                }
            }
        }

        loop {
            match rx.recv().await {
                Ok(entry) => {
                    if !is_level_allowed(&entry.level, state.get_max_level()) || !params.accepts(&entry) {
                        continue;
                    }
                    if let Ok(event) = Event::default().json_data(&entry) {
                        yield Ok::<_, axum::Error>(event);
                    }
                }
                // slow client: skip what was dropped
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// GET /log-dump : contenu du buffer en JSON
pub async fn log_dump(State(state): State<LogState>) -> impl IntoResponse {
    Json(state.dump())
}

fn is_level_allowed(log_level: &str, max_level: Level) -> bool {
    match string_to_level(log_level) {
        // Level orders TRACE as the greatest
        Some(level) => level <= max_level,
        None => false,
    }
}

/// Options d'initialisation du logging
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Nombre d'entrées conservées dans le buffer
    pub buffer_capacity: usize,
    /// Sortie console en plus du buffer
    pub enable_console: bool,
    /// Niveau minimal au démarrage
    pub min_level: Level,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: 1000,
            enable_console: true,
            min_level: Level::INFO,
        }
    }
}

impl LoggingOptions {
    /// Lit les options depuis la section `host.logger` de la configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            buffer_capacity: config.get_log_cache_size(),
            enable_console: config.get_log_enable_console(),
            min_level: string_to_level(&config.get_log_min_level()).unwrap_or(Level::INFO),
        }
    }
}

/// Installe le subscriber global et retourne l'état partagé des logs.
///
/// Un second appel ne remplace pas le subscriber déjà installé ; l'état
/// retourné reste utilisable mais ne reçoit alors aucun événement.
pub fn init_logging(options: LoggingOptions) -> LogState {
    let (filter, reload_handle) = reload::Layer::new(LevelFilter::from_level(options.min_level));

    let log_state = LogState::new(options.buffer_capacity, reload_handle);
    if let Ok(mut level) = log_state.max_level.write() {
        *level = options.min_level;
    }

    // the filter must come first so it also applies to the SSE layer
    let subscriber = Registry::default()
        .with(filter)
        .with(SseLayer::new(log_state.clone()));

    let result = if options.enable_console {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .try_init()
    } else {
        subscriber.try_init()
    };

    if let Err(e) = result {
        tracing::warn!("Logging already initialised: {}", e);
    }

    log_state
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LogSetupRequest {
    pub level: String,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LogSetupResponse {
    pub current_level: String,
    pub available_levels: Vec<String>,
}

impl LogSetupResponse {
    fn new(level: Level) -> Self {
        Self {
            current_level: level.to_string(),
            available_levels: LEVELS.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// GET /api/logs/log_setup
#[utoipa::path(
    get,
    path = "/api/logs/log_setup",
    responses(
        (status = 200, description = "Niveau de log courant", body = LogSetupResponse)
    ),
    tag = "logs"
)]
pub async fn log_setup_get(State(state): State<LogState>) -> impl IntoResponse {
    Json(LogSetupResponse::new(state.get_max_level()))
}

/// POST /api/logs/log_setup
#[utoipa::path(
    post,
    path = "/api/logs/log_setup",
    request_body = LogSetupRequest,
    responses(
        (status = 200, description = "Niveau de log modifié", body = LogSetupResponse),
        (status = 400, description = "Niveau inconnu"),
        (status = 500, description = "Rechargement du filtre impossible")
    ),
    tag = "logs"
)]
pub async fn log_setup_post(
    State(state): State<LogState>,
    Json(payload): Json<LogSetupRequest>,
) -> impl IntoResponse {
    let Some(level) = string_to_level(&payload.level) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": format!("Invalid log level. Must be one of: {}", LEVELS.join(", "))
            })),
        )
            .into_response();
    };

    if let Err(e) = state.set_max_level(level) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response();
    }

    tracing::info!("Log level changed to: {}", level);
    (StatusCode::OK, Json(LogSetupResponse::new(level))).into_response()
}

fn string_to_level(s: &str) -> Option<Level> {
    s.trim().parse::<Level>().ok()
}

/// Router de l'API des logs (monté sous `/api/logs`)
pub fn create_logs_router(log_state: LogState) -> Router {
    Router::new()
        .route("/log_setup", get(log_setup_get).post(log_setup_post))
        .with_state(log_state)
}

#[derive(utoipa::OpenApi)]
#[openapi(
    paths(log_setup_get, log_setup_post),
    components(schemas(LogSetupRequest, LogSetupResponse)),
    tags(
        (name = "logs", description = "Réglage du niveau de log")
    )
)]
pub struct LogsApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(level: &str, message: &str) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            level: level.to_string(),
            target: "cgblocker::monitor".to_string(),
            message: message.to_string(),
        }
    }

    fn state(capacity: usize) -> LogState {
        let (_filter, handle) = reload::Layer::new(LevelFilter::TRACE);
        LogState::new(capacity, handle)
    }

    #[test]
    fn test_buffer_is_bounded() {
        let state = state(2);
        state.push(entry("INFO", "one"));
        state.push(entry("INFO", "two"));
        state.push(entry("INFO", "three"));

        let messages: Vec<_> = state.dump().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["two", "three"]);
    }

    #[test]
    fn test_level_ordering() {
        assert!(is_level_allowed("ERROR", Level::INFO));
        assert!(is_level_allowed("INFO", Level::INFO));
        assert!(!is_level_allowed("DEBUG", Level::INFO));
        assert!(is_level_allowed("TRACE", Level::TRACE));
        assert!(!is_level_allowed("bogus", Level::TRACE));
    }

    #[test]
    fn test_query_filters() {
        let query = LogQuery {
            warn: Some(true),
            search: Some("mute".to_string()),
            ..Default::default()
        };
        assert!(query.accepts(&entry("WARN", "mute applied")));
        assert!(!query.accepts(&entry("INFO", "mute applied")));
        assert!(!query.accepts(&entry("WARN", "title changed")));
        assert!(LogQuery::default().accepts(&entry("DEBUG", "anything")));
    }

    #[test]
    fn test_parse_levels() {
        assert_eq!(string_to_level("debug"), Some(Level::DEBUG));
        assert_eq!(string_to_level(" WARN "), Some(Level::WARN));
        assert_eq!(string_to_level("loud"), None);
    }
}
