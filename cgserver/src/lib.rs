//! # cgserver - Serveur web haut niveau basé sur Axum
//!
//! Cette crate fournit le serveur HTTP de CastGuard :
//!
//! - [`server`] : le [`Server`] et son builder (API documentées, page
//!   embarquée, redirections, arrêt gracieux)
//! - [`logs`] : logs `tracing` capturés dans un buffer circulaire, servis en
//!   SSE (`/log-sse`) et en JSON (`/log-dump`)
//!
//! Les autres crates étendent le serveur via des traits d'extension
//! (`BlockerExt`, `PanelExt`, ...).
//!
//! ## Exemple
//!
//! ```rust,no_run
//! use cgserver::{ServerBuilder, logs::LoggingOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut server = ServerBuilder::new("CastGuard", "localhost", 8080).build();
//!     server.init_logging(LoggingOptions::default()).await;
//!     server.start().await?;
//!     server.wait().await;
//!     Ok(())
//! }
//! ```

pub mod logs;
pub mod server;

pub use logs::{LogState, LoggingOptions, SseLayer, init_logging, log_dump, log_sse};
pub use server::{Server, ServerBuilder, ServerInfo};
