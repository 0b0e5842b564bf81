//! # cgpanel - Panneau de contrôle web de CastGuard
//!
//! Une page HTML autonome (`panel/index.html`), embarquée dans le binaire
//! avec `RustEmbed`. Elle affiche l'état du bloqueur, permet de le démarrer ou
//! de l'arrêter et d'éditer la liste des mots-clés via l'API JSON `/api/*`.
//!
//! ```rust,no_run
//! use cgpanel::{Panel, PanelExt};
//! use cgserver::Server;
//!
//! # async fn example() {
//! let mut server = Server::new("CastGuard", "localhost", 8080);
//! server.add_panel_with_redirect::<Panel>("/panel").await;
//! # }
//! ```

use rust_embed::RustEmbed;

/// Fichiers du panneau, servis depuis la mémoire du binaire
#[derive(RustEmbed, Clone)]
#[folder = "panel"]
pub struct Panel;

/// Normalise un point de montage : `" panel/ "` devient `"/panel"`, `"/"`
/// reste tel quel.
pub fn normalize_mount_path(path: &str) -> String {
    let trimmed = path.trim();

    if trimmed.is_empty() || trimmed == "/" {
        "/".to_string()
    } else {
        format!("/{}", trimmed.trim_matches('/'))
    }
}

/// Ajoute le panneau à un serveur HTTP sans que celui-ci dépende de
/// `cgpanel`.
#[cfg(feature = "cgserver")]
#[async_trait::async_trait]
pub trait PanelExt {
    /// Monte le panneau sous `path`
    async fn add_panel<P>(&mut self, path: &str)
    where
        P: RustEmbed + Clone + Send + Sync + 'static;

    /// Monte le panneau sous `path` et redirige `/` vers lui
    async fn add_panel_with_redirect<P>(&mut self, path: &str)
    where
        P: RustEmbed + Clone + Send + Sync + 'static;
}

#[cfg(feature = "cgserver")]
#[async_trait::async_trait]
impl PanelExt for cgserver::Server {
    async fn add_panel<P>(&mut self, path: &str)
    where
        P: RustEmbed + Clone + Send + Sync + 'static,
    {
        self.add_spa::<P>(&normalize_mount_path(path)).await;
    }

    async fn add_panel_with_redirect<P>(&mut self, path: &str)
    where
        P: RustEmbed + Clone + Send + Sync + 'static,
    {
        let mount_path = normalize_mount_path(path);
        self.add_spa::<P>(&mount_path).await;
        if mount_path != "/" {
            self.add_redirect("/", &mount_path).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_mount_path() {
        assert_eq!(normalize_mount_path("panel"), "/panel");
        assert_eq!(normalize_mount_path(" /panel/ "), "/panel");
        assert_eq!(normalize_mount_path(""), "/");
        assert_eq!(normalize_mount_path("/"), "/");
    }

    #[test]
    fn test_index_is_embedded() {
        let index = Panel::get("index.html").expect("index.html embedded");
        let html = std::str::from_utf8(&index.data).unwrap();
        assert!(html.contains("/api/status"));
    }

    #[cfg(feature = "cgserver")]
    #[tokio::test]
    async fn test_root_redirects_to_panel() {
        use axum::{body::Body, http::Request};
        use tower::ServiceExt;

        let mut server = cgserver::Server::new("CastGuard", "localhost", 0);
        server.add_panel_with_redirect::<Panel>("/panel").await;
        let router = server.router().await;

        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 307);
        assert_eq!(response.headers()["location"], "/panel");
    }
}
