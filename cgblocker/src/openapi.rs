//! Documentation OpenAPI et DTOs de l'API du bloqueur
//!
//! Les réponses des commandes suivent la forme `{"status": "success" | "error",
//! "message": "..."}`.

use cgcast::{DeviceInfo, PlayerState};
use cgserver::ServerInfo;
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};

use crate::controller::BlockerStatus;
use crate::keywords::{normalize_keywords, parse_keyword_list};
use crate::monitor::MonitorSnapshot;

/// Mots-clés fournis soit en texte séparé par des virgules, soit en liste
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum KeywordsInput {
    Text(String),
    List(Vec<String>),
}

impl KeywordsInput {
    /// Liste normalisée (minuscules, sans entrée vide)
    pub fn into_keywords(self) -> Vec<String> {
        match self {
            KeywordsInput::Text(text) => parse_keyword_list(&text),
            KeywordsInput::List(list) => normalize_keywords(list),
        }
    }
}

/// Corps de `/api/start` et `/api/update_keywords`
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct KeywordsRequest {
    #[serde(default)]
    pub keywords: Option<KeywordsInput>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Réponse d'une commande
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommandResponse {
    pub status: ResponseStatus,
    pub message: String,
    /// Liste enregistrée (uniquement pour `/api/update_keywords`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

impl CommandResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
            keywords: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: message.into(),
            keywords: None,
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = Some(keywords);
        self
    }
}

/// Informations sur l'application et l'appareil surveillé
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InfoResponse {
    pub name: String,
    pub version: String,
    pub os: String,
    pub server: ServerInfo,
    pub device: DeviceInfo,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "CastGuard Blocker API",
        version = "1.0.0",
        description = r#"
# API du bloqueur CastGuard

Surveille un appareil Chromecast et coupe le son (après une pause) lorsque
l'application ou le titre en cours contient un mot-clé interdit.

- `POST /api/start` : démarre la surveillance, avec éventuellement une nouvelle liste
- `POST /api/stop` : arrête la surveillance et rend le son
- `GET /api/status` : état courant
- `POST /api/update_keywords` : remplace la liste des mots-clés
- `GET /api/info` : version, OS et appareil

Une liste vide active le mode prudent : tout contenu est bloqué.
"#
    ),
    paths(
        crate::server_ext::start_blocker,
        crate::server_ext::stop_blocker,
        crate::server_ext::blocker_status,
        crate::server_ext::update_keywords,
        crate::server_ext::blocker_info,
    ),
    components(schemas(
        KeywordsInput,
        KeywordsRequest,
        ResponseStatus,
        CommandResponse,
        InfoResponse,
        BlockerStatus,
        MonitorSnapshot,
        DeviceInfo,
        PlayerState,
        ServerInfo,
    )),
    tags(
        (name = "blocker", description = "Pilotage du bloqueur de contenu")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_input_accepts_text_and_list() {
        let req: KeywordsRequest = serde_json::from_str(r#"{"keywords": "Creeper, steve"}"#).unwrap();
        assert_eq!(
            req.keywords.unwrap().into_keywords(),
            vec!["creeper", "steve"]
        );

        let req: KeywordsRequest =
            serde_json::from_str(r#"{"keywords": [" Zombie ", ""]}"#).unwrap();
        assert_eq!(req.keywords.unwrap().into_keywords(), vec!["zombie"]);

        let req: KeywordsRequest = serde_json::from_str("{}").unwrap();
        assert!(req.keywords.is_none());
    }

    #[test]
    fn test_command_response_shape() {
        let json = serde_json::to_value(CommandResponse::error("Blocker is not running")).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "Blocker is not running");
        assert!(json.get("keywords").is_none());
    }
}
