use serde::{Deserialize, Serialize};

use crate::errors::{CastError, CastResult};

/// Default Cast protocol port.
pub const DEFAULT_CAST_PORT: u16 = 8009;

const LOCATION_SCHEME: &str = "chromecast://";

/// Identity and address of a cast device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DeviceInfo {
    pub id: String,
    pub friendly_name: String,
    pub model_name: String,
    pub manufacturer: String,
    pub host: String,
    pub port: u16,
}

impl DeviceInfo {
    /// Device addressed by hand, without discovery metadata.
    pub fn manual(host: &str, port: u16) -> Self {
        Self {
            id: format!("chromecast-{}-{}", host, port),
            friendly_name: host.to_string(),
            model_name: "Chromecast".to_string(),
            manufacturer: "Google Inc.".to_string(),
            host: host.to_string(),
            port,
        }
    }

    /// `chromecast://host:port`
    pub fn location(&self) -> String {
        build_location(&self.host, self.port)
    }

    pub fn from_location(location: &str) -> CastResult<Self> {
        let host = extract_host_from_location(location)
            .ok_or_else(|| CastError::InvalidLocation(location.to_string()))?;
        let port = extract_port_from_location(location).unwrap_or(DEFAULT_CAST_PORT);
        Ok(Self::manual(&host, port))
    }
}

/// How the device to monitor is chosen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceSelector {
    /// Case-insensitive friendly name; `None` takes the first device found.
    pub friendly_name: Option<String>,
    /// Skips discovery entirely when set.
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl DeviceSelector {
    pub fn matches(&self, device: &DeviceInfo) -> bool {
        match &self.friendly_name {
            Some(name) => device.friendly_name.eq_ignore_ascii_case(name.trim()),
            None => true,
        }
    }
}

/// Player state as reported by the media channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "UPPERCASE")]
pub enum PlayerState {
    Idle,
    Playing,
    Buffering,
    Paused,
}

impl PlayerState {
    /// Content is (about to be) audible.
    pub fn is_active(&self) -> bool {
        matches!(self, PlayerState::Playing | PlayerState::Buffering)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerState::Idle => "IDLE",
            PlayerState::Playing => "PLAYING",
            PlayerState::Buffering => "BUFFERING",
            PlayerState::Paused => "PAUSED",
        }
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver-level status: running application and volume.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ReceiverStatus {
    pub app_id: Option<String>,
    pub display_name: Option<String>,
    pub status_text: Option<String>,
    pub volume_level: Option<f32>,
    pub volume_muted: Option<bool>,
    pub is_stand_by: bool,
}

impl ReceiverStatus {
    pub fn has_application(&self) -> bool {
        self.app_id.is_some()
    }

    pub fn is_muted(&self) -> bool {
        self.volume_muted.unwrap_or(false)
    }
}

/// First media session of the running application.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MediaStatus {
    pub title: Option<String>,
    pub player_state: PlayerState,
    pub media_session_id: i32,
}

pub fn build_location(host: &str, port: u16) -> String {
    format!("{}{}:{}", LOCATION_SCHEME, host, port)
}

/// Extracts the host from a `chromecast://host:port` location.
pub fn extract_host_from_location(location: &str) -> Option<String> {
    let stripped = location.strip_prefix(LOCATION_SCHEME)?;
    let host = stripped.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Extracts the port from a `chromecast://host:port` location.
pub fn extract_port_from_location(location: &str) -> Option<u16> {
    let stripped = location.strip_prefix(LOCATION_SCHEME)?;
    stripped.split(':').nth(1)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_host_from_location() {
        assert_eq!(
            extract_host_from_location("chromecast://192.168.1.100:8009"),
            Some("192.168.1.100".to_string())
        );
        assert_eq!(extract_host_from_location("http://192.168.1.100:8009"), None);
        assert_eq!(extract_host_from_location("chromecast://"), None);
    }

    #[test]
    fn test_extract_port_from_location() {
        assert_eq!(
            extract_port_from_location("chromecast://192.168.1.100:8009"),
            Some(8009)
        );
        assert_eq!(extract_port_from_location("chromecast://192.168.1.100"), None);
    }

    #[test]
    fn test_location_round_trip_defaults_port() {
        let info = DeviceInfo::from_location("chromecast://10.0.0.5").unwrap();
        assert_eq!(info.port, DEFAULT_CAST_PORT);
        assert_eq!(info.location(), "chromecast://10.0.0.5:8009");
        assert!(DeviceInfo::from_location("10.0.0.5").is_err());
    }

    #[test]
    fn test_selector_matches_case_insensitively() {
        let device = DeviceInfo {
            friendly_name: "Living Room TV".to_string(),
            ..DeviceInfo::manual("10.0.0.5", 8009)
        };
        let by_name = DeviceSelector {
            friendly_name: Some("living room tv".to_string()),
            ..Default::default()
        };
        let other = DeviceSelector {
            friendly_name: Some("Kitchen".to_string()),
            ..Default::default()
        };

        assert!(DeviceSelector::default().matches(&device));
        assert!(by_name.matches(&device));
        assert!(!other.matches(&device));
    }

    #[test]
    fn test_active_player_states() {
        assert!(PlayerState::Playing.is_active());
        assert!(PlayerState::Buffering.is_active());
        assert!(!PlayerState::Paused.is_active());
        assert!(!PlayerState::Idle.is_active());
    }
}
