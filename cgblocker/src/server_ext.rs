//! Extension cgserver pour le bloqueur
//!
//! Monte l'API JSON du bloqueur sous `/api` et sa documentation sous
//! `/swagger-ui/blocker`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use cgserver::{Server, ServerInfo};
use tokio::time;
use tracing::{info, warn};
use utoipa::OpenApi;

use crate::controller::{Blocker, BlockerStatus};
use crate::errors::BlockerError;
use crate::openapi::{ApiDoc, CommandResponse, InfoResponse, KeywordsRequest};

pub type ApiError = (StatusCode, Json<CommandResponse>);
pub type ApiResult = Result<Json<CommandResponse>, ApiError>;

#[derive(Clone)]
pub struct BlockerState {
    blocker: Arc<Blocker>,
    server: ServerInfo,
    command_timeout: Duration,
}

impl BlockerState {
    pub fn new(blocker: Arc<Blocker>, server: ServerInfo, command_timeout: Duration) -> Self {
        Self {
            blocker,
            server,
            command_timeout,
        }
    }
}

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(CommandResponse::error(message)))
}

fn status_for(err: &BlockerError) -> StatusCode {
    match err {
        BlockerError::AlreadyRunning | BlockerError::NotRunning => StatusCode::CONFLICT,
        BlockerError::Keywords { .. } | BlockerError::Device(_) | BlockerError::Spawn(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Exécute `task` sur le pool bloquant de tokio, borné par `timeout`.
async fn run_blocking<T, F>(timeout: Duration, operation: &str, task: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, BlockerError> + Send + 'static,
    T: Send + 'static,
{
    time::timeout(timeout, tokio::task::spawn_blocking(task))
        .await
        .map_err(|_| {
            warn!("{} exceeded {:?}", operation, timeout);
            api_error(
                StatusCode::GATEWAY_TIMEOUT,
                format!(
                    "{} timed out after {}s, the command may still complete",
                    operation,
                    timeout.as_secs()
                ),
            )
        })?
        .map_err(|e| {
            warn!("Task join error during {}: {}", operation, e);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal task error: {}", e),
            )
        })?
        .map_err(|e| {
            warn!("{} failed: {}", operation, e);
            api_error(status_for(&e), e.to_string())
        })
}

/// Corps JSON optionnel : un corps vide vaut `{}`.
fn parse_keywords_request(body: &Bytes) -> Result<KeywordsRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(KeywordsRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {}", e)))
}

/// Démarre la surveillance
#[utoipa::path(
    post,
    path = "/api/start",
    request_body(
        content = KeywordsRequest,
        description = "Nouvelle liste de mots-clés (optionnelle)",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Bloqueur démarré", body = CommandResponse),
        (status = 400, description = "Corps JSON invalide", body = CommandResponse),
        (status = 409, description = "Bloqueur déjà actif", body = CommandResponse),
        (status = 500, description = "Erreur interne", body = CommandResponse),
        (status = 504, description = "Délai dépassé", body = CommandResponse)
    ),
    tag = "blocker"
)]
pub async fn start_blocker(State(state): State<BlockerState>, body: Bytes) -> ApiResult {
    let request = parse_keywords_request(&body)?;
    let keywords = request.keywords.map(|k| k.into_keywords());

    // l'attente d'un thread précédent n'est pas bornée par le délai de commande
    let previous = state.blocker.clone();
    tokio::task::spawn_blocking(move || previous.reap_stopped())
        .await
        .map_err(|e| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal task error: {}", e),
            )
        })?;

    let blocker = state.blocker.clone();
    run_blocking(state.command_timeout, "Start", move || blocker.start(keywords)).await?;

    Ok(Json(CommandResponse::success("Blocker started")))
}

/// Arrête la surveillance et rend le son
#[utoipa::path(
    post,
    path = "/api/stop",
    responses(
        (status = 200, description = "Bloqueur arrêté", body = CommandResponse),
        (status = 409, description = "Bloqueur inactif", body = CommandResponse),
        (status = 504, description = "Délai dépassé", body = CommandResponse)
    ),
    tag = "blocker"
)]
pub async fn stop_blocker(State(state): State<BlockerState>) -> ApiResult {
    let blocker = state.blocker.clone();
    run_blocking(state.command_timeout, "Stop", move || blocker.stop()).await?;

    Ok(Json(CommandResponse::success("Blocker stopped")))
}

/// État courant du bloqueur et dernière observation
#[utoipa::path(
    get,
    path = "/api/status",
    responses(
        (status = 200, description = "État du bloqueur", body = BlockerStatus)
    ),
    tag = "blocker"
)]
pub async fn blocker_status(State(state): State<BlockerState>) -> Json<BlockerStatus> {
    Json(state.blocker.status())
}

/// Remplace la liste des mots-clés
#[utoipa::path(
    post,
    path = "/api/update_keywords",
    request_body(content = KeywordsRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Liste enregistrée", body = CommandResponse),
        (status = 400, description = "Champ `keywords` absent ou JSON invalide", body = CommandResponse),
        (status = 500, description = "Échec de l'enregistrement", body = CommandResponse)
    ),
    tag = "blocker"
)]
pub async fn update_keywords(State(state): State<BlockerState>, body: Bytes) -> ApiResult {
    let request = parse_keywords_request(&body)?;
    // une liste vide est acceptée : elle active le mode prudent
    let keywords = request
        .keywords
        .map(|k| k.into_keywords())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "No keywords provided"))?;

    let blocker = state.blocker.clone();
    let saved = run_blocking(state.command_timeout, "Keyword update", move || {
        blocker.update_keywords(keywords)
    })
    .await?;

    Ok(Json(
        CommandResponse::success("Keywords updated").with_keywords(saved),
    ))
}

/// Version, système et appareil surveillé
#[utoipa::path(
    get,
    path = "/api/info",
    responses(
        (status = 200, description = "Informations", body = InfoResponse)
    ),
    tag = "blocker"
)]
pub async fn blocker_info(State(state): State<BlockerState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        name: "CastGuard".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        os: cgutils::get_os_string(),
        server: state.server.clone(),
        device: state.blocker.device_info().clone(),
    })
}

pub fn create_api_router(state: BlockerState) -> Router {
    Router::new()
        .route("/start", post(start_blocker))
        .route("/stop", post(stop_blocker))
        .route("/status", get(blocker_status))
        .route("/update_keywords", post(update_keywords))
        .route("/info", get(blocker_info))
        .with_state(state)
}

/// Trait d'extension pour cgserver::Server
#[async_trait]
pub trait BlockerExt {
    /// Enregistre l'API du bloqueur
    ///
    /// # Routes créées
    ///
    /// - `/api/start`, `/api/stop`, `/api/status`, `/api/update_keywords`,
    ///   `/api/info`
    /// - Swagger: `/swagger-ui/blocker`
    ///
    /// `command_timeout` borne chaque commande envoyée à l'appareil.
    async fn register_blocker(&mut self, blocker: Arc<Blocker>, command_timeout: Duration);
}

#[async_trait]
impl BlockerExt for Server {
    async fn register_blocker(&mut self, blocker: Arc<Blocker>, command_timeout: Duration) {
        let state = BlockerState::new(blocker, self.info(), command_timeout);
        self.add_openapi_at(create_api_router(state), ApiDoc::openapi(), "blocker", "/api")
            .await;
        info!("Blocker API registered under /api (docs: /swagger-ui/blocker)");
    }
}
