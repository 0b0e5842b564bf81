//! # cgcast - Accès aux appareils Chromecast
//!
//! - [`discovery`] : découverte mDNS (`_googlecast._tcp.local`)
//! - [`chromecast`] : [`ChromecastDevice`], client du protocole Cast via `rust_cast`
//! - [`capabilities`] : traits implémentés par les appareils (statut, mute,
//!   pause, connexion)
//! - [`model`] : types échangés avec le reste de l'application

pub mod capabilities;
pub mod chromecast;
pub mod discovery;
pub mod errors;
pub mod model;

pub use capabilities::{
    CastControl, ConnectionControl, DeviceStatus, TransportControl, VolumeControl,
};
pub use chromecast::ChromecastDevice;
pub use discovery::{discover_devices, find_device, select_device};
pub use errors::{CastError, CastResult};
pub use model::{
    DEFAULT_CAST_PORT, DeviceInfo, DeviceSelector, MediaStatus, PlayerState, ReceiverStatus,
};
