//! REST access to the running configuration.
//!
//! Values are exchanged as JSON and stored as YAML; paths use dotted keys
//! such as `blocker.poll_interval_ms`.

use crate::Config;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use serde_yaml::Value;
use std::sync::Arc;
use utoipa::ToSchema;

/// Valeur de configuration à un chemin donné
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConfigValue {
    /// Chemin de la clé (ex: "blocker.poll_interval_ms")
    pub path: String,
    /// Valeur au format JSON
    pub value: JsonValue,
}

/// Requête de mise à jour d'une valeur
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateConfigRequest {
    /// Chemin de la clé (ex: "blocker.mute_duration_secs")
    pub path: String,
    /// Nouvelle valeur au format JSON
    pub value: JsonValue,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateConfigResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug)]
pub enum ConfigApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ConfigApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ConfigApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ConfigApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ConfigApiError::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<anyhow::Error> for ConfigApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

fn split_path(path: &str) -> Result<Vec<&str>, ConfigApiError> {
    let parts: Vec<&str> = path.split('.').map(str::trim).collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(ConfigApiError::BadRequest(format!(
            "Invalid configuration path: '{}'",
            path
        )));
    }
    Ok(parts)
}

/// GET /api/config - Récupérer toute la configuration
#[utoipa::path(
    get,
    path = "/api/config",
    tag = "config",
    responses(
        (status = 200, description = "Configuration complète", body = serde_json::Value)
    )
)]
pub async fn get_full_config(
    State(config): State<Arc<Config>>,
) -> Result<Json<JsonValue>, ConfigApiError> {
    let value = config.get_value(&[])?;
    Ok(Json(yaml_to_json(&value)?))
}

/// GET /api/config/{path} - Récupérer une valeur
#[utoipa::path(
    get,
    path = "/api/config/{path}",
    tag = "config",
    params(
        ("path" = String, Path, description = "Chemin séparé par des points, ex: blocker.poll_interval_ms")
    ),
    responses(
        (status = 200, description = "Valeur de configuration", body = ConfigValue),
        (status = 404, description = "Chemin non trouvé")
    )
)]
pub async fn get_config_value(
    State(config): State<Arc<Config>>,
    Path(path): Path<String>,
) -> Result<Json<ConfigValue>, ConfigApiError> {
    let parts = split_path(&path)?;
    let value = config
        .get_value(&parts)
        .map_err(|e| ConfigApiError::NotFound(e.to_string()))?;

    Ok(Json(ConfigValue {
        path,
        value: yaml_to_json(&value)?,
    }))
}

/// POST /api/config - Mettre à jour une valeur
#[utoipa::path(
    post,
    path = "/api/config",
    tag = "config",
    request_body = UpdateConfigRequest,
    responses(
        (status = 200, description = "Configuration mise à jour", body = UpdateConfigResponse),
        (status = 400, description = "Chemin invalide")
    )
)]
pub async fn update_config_value(
    State(config): State<Arc<Config>>,
    Json(request): Json<UpdateConfigRequest>,
) -> Result<Json<UpdateConfigResponse>, ConfigApiError> {
    let parts = split_path(&request.path)?;
    let yaml_value = json_to_yaml(&request.value)?;
    config.set_value(&parts, yaml_value)?;

    tracing::info!(path = %request.path, "Configuration updated");
    Ok(Json(UpdateConfigResponse {
        success: true,
        message: format!("Configuration updated at path: {}", request.path),
    }))
}

fn yaml_to_json(yaml: &Value) -> anyhow::Result<JsonValue> {
    Ok(serde_json::to_value(yaml)?)
}

fn json_to_yaml(json: &JsonValue) -> anyhow::Result<Value> {
    Ok(serde_yaml::to_value(json)?)
}

/// Router de l'API de configuration, à monter sous `/api/config`
pub fn create_router(config: Arc<Config>) -> Router {
    Router::new()
        .route("/", get(get_full_config).post(update_config_value))
        .route("/{path}", get(get_config_value))
        .with_state(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    fn router(dir: &tempfile::TempDir) -> Router {
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        create_router(Arc::new(config))
    }

    #[tokio::test]
    async fn test_get_single_value() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(&dir)
            .oneshot(
                Request::get("/blocker.mute_duration_secs")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: ConfigValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(value.value, serde_json::json!(600));
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(&dir)
            .oneshot(Request::get("/nope.none").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_value() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(&dir);
        let body = serde_json::json!({ "path": "blocker.poll_interval_ms", "value": 1000 });
        let response = app
            .clone()
            .oneshot(
                Request::post("/")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let reloaded = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(reloaded.get_poll_interval_ms(), 1000);
    }
}
