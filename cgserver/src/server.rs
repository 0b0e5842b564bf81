//! # Module Server - API de haut niveau pour Axum
//!
//! Enveloppe un `Router` Axum partagé auquel les différentes crates
//! ajoutent leurs routes avant le démarrage :
//!
//! - 📚 **API documentées** : `add_openapi()` / `add_openapi_at()` (Swagger UI)
//! - ⚛️ **Pages embarquées** : `add_spa()` pour le panneau de contrôle
//! - 🔀 **Redirections** : `add_redirect()`
//! - 🎯 **Handlers avec état** : `add_handler_with_state()` (SSE des logs)
//! - ⚡ **Arrêt gracieux** sur Ctrl+C, port de repli si le port principal est pris

use crate::logs::{LogState, LoggingOptions, LogsApiDoc, create_logs_router, init_logging};
use crate::logs::{log_dump, log_sse};
use anyhow::{Context, Result};
use axum::Router;
use axum::handler::Handler;
use axum::response::Redirect;
use axum::routing::get;
use axum_embed::ServeEmbed;
use cgconfig::get_config;
use rust_embed::RustEmbed;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::{signal, sync::RwLock, task::JoinHandle};
use tracing::{error, info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Info serveur sérialisable
#[derive(Clone, Debug, Serialize, utoipa::ToSchema)]
pub struct ServerInfo {
    pub name: String,
    pub base_url: String,
    pub http_port: u16,
}

/// Serveur principal
pub struct Server {
    name: String,
    base_url: String,
    http_port: u16,
    fallback_port: Option<u16>,
    router: Arc<RwLock<Router>>,
    join_handle: Option<JoinHandle<()>>,
    log_state: Option<LogState>,
}

impl Server {
    /// Crée une nouvelle instance de serveur
    ///
    /// # Arguments
    ///
    /// * `name` - Nom du serveur (pour les logs)
    /// * `base_url` - Hôte annoncé (ex: "192.168.1.10")
    /// * `http_port` - Port HTTP à écouter
    ///
    /// ```rust
    /// # use cgserver::Server;
    /// let server = Server::new("CastGuard", "localhost", 8080);
    /// assert_eq!(server.info().http_port, 8080);
    /// ```
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            http_port,
            fallback_port: None,
            router: Arc::new(RwLock::new(Router::new())),
            join_handle: None,
            log_state: None,
        }
    }

    /// Serveur construit à partir de la configuration globale
    pub fn new_configured() -> Self {
        ServerBuilder::new_configured().build()
    }

    /// Port essayé si le port principal ne peut pas être ouvert
    pub fn with_fallback_port(mut self, port: u16) -> Self {
        self.fallback_port = Some(port);
        self
    }

    async fn mount(&self, path: &str, route: Router) {
        let mut r = self.router.write().await;
        *r = if path == "/" {
            std::mem::take(&mut *r).merge(route)
        } else {
            std::mem::take(&mut *r).nest(path, route)
        };
    }

    /// Ajoute un handler GET avec état
    pub async fn add_handler_with_state<H, T, S>(&mut self, path: &str, handler: H, state: S)
    where
        H: Handler<T, S> + Clone + 'static,
        T: 'static,
        S: Clone + Send + Sync + 'static,
    {
        let route = Router::new().route("/", get(handler)).with_state(state);
        self.mount(path, route).await;
    }

    /// Ajoute une Single Page Application embarquée
    ///
    /// Les chemins inconnus sous `path` renvoient `index.html`.
    ///
    /// ```rust,no_run
    /// # use cgserver::Server;
    /// # use rust_embed::RustEmbed;
    /// #[derive(RustEmbed, Clone)]
    /// #[folder = "panel"]
    /// # #[allow_missing = true]
    /// struct Panel;
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// # let mut server = Server::new("Test", "localhost", 3000);
    /// server.add_spa::<Panel>("/panel").await;
    /// # }
    /// ```
    pub async fn add_spa<E>(&mut self, path: &str)
    where
        E: RustEmbed + Clone + Send + Sync + 'static,
    {
        let serve = ServeEmbed::<E>::with_parameters(
            Some("index.html".to_string()),
            axum_embed::FallbackBehavior::Ok,
            Some("index.html".to_string()),
        );

        self.mount(path, Router::new().fallback_service(serve)).await;
    }

    /// Ajoute une redirection temporaire (307) de `from` vers `to`
    pub async fn add_redirect(&mut self, from: &str, to: &str) {
        let target = to.to_string();
        let route = Router::new().route(
            "/",
            get(move || async move { Redirect::temporary(&target) }),
        );
        self.mount(from, route).await;
    }

    /// Ajoute une API documentée sous `/api/{name}`
    ///
    /// - les routes de `api_router` sont servies sous `/api/{name}` ;
    /// - Swagger UI est disponible sur `/swagger-ui/{name}` ;
    /// - la spécification JSON sur `/api-docs/{name}.json`.
    pub async fn add_openapi(
        &mut self,
        api_router: Router,
        openapi: utoipa::openapi::OpenApi,
        name: &str,
    ) {
        let base_path = format!("/api/{}", name);
        self.add_openapi_at(api_router, openapi, name, &base_path)
            .await;
    }

    /// Comme [`Server::add_openapi`], mais monte les routes sous `base_path`
    pub async fn add_openapi_at(
        &mut self,
        api_router: Router,
        openapi: utoipa::openapi::OpenApi,
        name: &str,
        base_path: &str,
    ) {
        let swagger = SwaggerUi::new(format!("/swagger-ui/{}", name))
            .url(format!("/api-docs/{}.json", name), openapi);

        let nested_router = Router::new().nest(base_path, api_router);

        let mut r = self.router.write().await;
        *r = std::mem::take(&mut *r).merge(nested_router).merge(swagger);
    }

    /// Copie du router courant (utile aux tests avec `tower::ServiceExt`)
    pub async fn router(&self) -> Router {
        self.router.read().await.clone()
    }

    async fn bind(&self) -> Result<TcpListener> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.http_port));
        match TcpListener::bind(addr).await {
            Ok(listener) => Ok(listener),
            Err(e) => match self.fallback_port {
                Some(port) if port != self.http_port => {
                    warn!(
                        "Cannot bind port {} ({}), falling back to port {}",
                        self.http_port, e, port
                    );
                    TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port)))
                        .await
                        .with_context(|| format!("Cannot bind fallback port {}", port))
                }
                _ => Err(e).with_context(|| format!("Cannot bind port {}", self.http_port)),
            },
        }
    }

    /// Démarre le serveur HTTP
    ///
    /// Ouvre le port configuré (ou le port de repli), puis sert le router
    /// dans une tâche de fond jusqu'à Ctrl+C.
    pub async fn start(&mut self) -> Result<()> {
        let listener = self.bind().await?;
        self.http_port = listener.local_addr()?.port();

        info!(
            "Server {} running at http://{}:{}",
            self.name, self.base_url, self.http_port
        );

        let router = self.router.read().await.clone();
        self.join_handle = Some(tokio::spawn(async move {
            let shutdown = async {
                if let Err(e) = signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
                info!("Ctrl+C reçu, arrêt gracieux");
            };

            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("HTTP server error: {}", e);
            }
        }));

        Ok(())
    }

    /// Attend la fin du serveur (après Ctrl+C)
    pub async fn wait(&mut self) {
        if let Some(h) = self.join_handle.take() {
            let _ = h.await;
        }
    }

    /// Récupère les infos du serveur
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            name: self.name.clone(),
            base_url: self.base_url.clone(),
            http_port: self.http_port,
        }
    }

    pub fn log_state(&self) -> Option<&LogState> {
        self.log_state.as_ref()
    }

    /// Initialise le logging et enregistre ses routes
    ///
    /// `/log-sse`, `/log-dump` et l'API `/api/logs/log_setup`.
    pub async fn init_logging(&mut self, options: LoggingOptions) {
        let log_state = init_logging(options);
        self.register_log_routes(log_state).await;
    }

    /// Enregistre les routes de logs pour un état déjà initialisé
    pub async fn register_log_routes(&mut self, log_state: LogState) {
        self.add_handler_with_state("/log-sse", log_sse, log_state.clone())
            .await;
        self.add_handler_with_state("/log-dump", log_dump, log_state.clone())
            .await;
        self.add_openapi(
            create_logs_router(log_state.clone()),
            LogsApiDoc::openapi(),
            "logs",
        )
        .await;

        self.log_state = Some(log_state);
    }
}

/// Builder pattern
pub struct ServerBuilder {
    name: String,
    base_url: String,
    http_port: u16,
    fallback_port: Option<u16>,
}

impl ServerBuilder {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            http_port,
            fallback_port: None,
        }
    }

    pub fn new_configured() -> Self {
        let config = get_config();
        Self {
            name: "CastGuard".to_string(),
            base_url: config.get_base_url(),
            http_port: config.get_http_port(),
            fallback_port: Some(config.get_fallback_http_port()),
        }
    }

    pub fn http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    pub fn fallback_port(mut self, port: Option<u16>) -> Self {
        self.fallback_port = port;
        self
    }

    /// Construit le serveur
    ///
    /// ```rust
    /// # use cgserver::ServerBuilder;
    /// let server = ServerBuilder::new("CastGuard", "localhost", 8080)
    ///     .fallback_port(Some(8081))
    ///     .build();
    /// ```
    pub fn build(self) -> Server {
        let server = Server::new(self.name, self.base_url, self.http_port);
        match self.fallback_port {
            Some(port) => server.with_fallback_port(port),
            None => server,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_redirect_root() {
        let mut server = Server::new("Test", "localhost", 0);
        server.add_redirect("/", "/panel").await;

        let response = server
            .router()
            .await
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "/panel");
    }

    #[tokio::test]
    async fn test_fallback_port_is_used_when_busy() {
        let busy = TcpListener::bind("0.0.0.0:0").await.unwrap();
        let busy_port = busy.local_addr().unwrap().port();

        let probe = TcpListener::bind("0.0.0.0:0").await.unwrap();
        let free_port = probe.local_addr().unwrap().port();
        drop(probe);

        let server = Server::new("Test", "localhost", busy_port).with_fallback_port(free_port);
        let listener = server.bind().await.unwrap();
        assert_eq!(listener.local_addr().unwrap().port(), free_port);
    }

    #[tokio::test]
    async fn test_bind_error_without_fallback() {
        let busy = TcpListener::bind("0.0.0.0:0").await.unwrap();
        let busy_port = busy.local_addr().unwrap().port();

        let server = Server::new("Test", "localhost", busy_port);
        assert!(server.bind().await.is_err());
    }
}
