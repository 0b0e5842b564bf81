//! # cgblocker - Blocage de contenu sur Chromecast
//!
//! Surveille l'application et le titre diffusés par un appareil Cast ; quand
//! un mot-clé interdit apparaît, le média est mis en pause et le son coupé
//! pour une durée fixe.
//!
//! - [`matcher`] : recherche des mots-clés (insensible à la casse)
//! - [`keywords`] : liste persistée `{"keywords": [...]}`
//! - [`detector`] : règles de blocage appliquées à une observation
//! - [`mute_timer`] : fenêtre de mute
//! - [`monitor`] : boucle de surveillance
//! - [`controller`] : [`Blocker`], démarrage et arrêt du thread de surveillance
//! - `server_ext` (feature `server`) : API JSON sous `/api`

pub mod controller;
pub mod detector;
pub mod errors;
pub mod keywords;
pub mod matcher;
pub mod monitor;
pub mod mute_timer;

// Appareil simulé pour les tests (feature `testing`)
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Extension cgserver (optionnelle)
#[cfg(feature = "server")]
pub mod openapi;
#[cfg(feature = "server")]
pub mod server_ext;

#[cfg(feature = "server")]
pub use server_ext::BlockerExt;

pub use controller::{Blocker, BlockerStatus};
pub use detector::{BlockReason, Detection, Detector, Observation};
pub use errors::BlockerError;
pub use keywords::{DEFAULT_KEYWORDS, KeywordStore, parse_keyword_list};
pub use matcher::{is_blocked_text, match_keyword};
pub use monitor::{Monitor, MonitorSettings, MonitorSnapshot};
pub use mute_timer::MuteTimer;
