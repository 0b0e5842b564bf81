//! Chromecast backend built on the rust_cast library.
//!
//! `CastDevice` borrows its host and is not `Send`, so a fresh connection is
//! opened for every operation; only the address and the session identifiers
//! needed by `pause` are kept between calls.

use std::sync::{Arc, Mutex, MutexGuard};

use rust_cast::CastDevice;
use rust_cast::channels::media::{Metadata, PlayerState as CastPlayerState, StatusEntry};
use tracing::debug;

use crate::capabilities::{ConnectionControl, DeviceStatus, TransportControl, VolumeControl};
use crate::errors::{CastError, CastResult};
use crate::model::{DeviceInfo, MediaStatus, PlayerState, ReceiverStatus};

/// Receiver platform destination, always present.
const DEFAULT_DESTINATION_ID: &str = "receiver-0";

#[derive(Debug, Default)]
struct SessionCache {
    /// Transport id of the running application (e.g. "web-5").
    transport_id: Option<String>,
    media_session_id: Option<i32>,
}

/// A Chromecast reachable at a known address.
#[derive(Clone, Debug)]
pub struct ChromecastDevice {
    info: DeviceInfo,
    session: Arc<Mutex<SessionCache>>,
}

impl ChromecastDevice {
    pub fn new(info: DeviceInfo) -> Self {
        debug!(
            "Creating ChromecastDevice for {} at {}:{}",
            info.friendly_name, info.host, info.port
        );
        Self {
            info,
            session: Arc::new(Mutex::new(SessionCache::default())),
        }
    }

    /// Builds a device from a `chromecast://host:port` location.
    pub fn from_location(location: &str) -> CastResult<Self> {
        Ok(Self::new(DeviceInfo::from_location(location)?))
    }

    fn session(&self) -> CastResult<MutexGuard<'_, SessionCache>> {
        self.session.lock().map_err(|_| CastError::Lock)
    }

    fn forget_session(&self) -> CastResult<()> {
        let mut session = self.session()?;
        session.transport_id = None;
        session.media_session_id = None;
        Ok(())
    }

    /// Opens a TLS connection and the virtual connection to the receiver.
    ///
    /// Chromecasts present self-signed certificates, host verification is
    /// therefore disabled.
    fn connect(&self) -> CastResult<CastDevice<'_>> {
        debug!("Connecting to Chromecast at {}:{}", self.info.host, self.info.port);

        let device =
            CastDevice::connect_without_host_verification(self.info.host.as_str(), self.info.port)
                .map_err(|e| CastError::connection(&self.info.host, self.info.port, e))?;

        device
            .connection
            .connect(DEFAULT_DESTINATION_ID.to_string())
            .map_err(|e| CastError::connection(&self.info.host, self.info.port, e))?;

        Ok(device)
    }

    /// Reads the first media entry of the running application and refreshes
    /// the cached session identifiers.
    fn read_media(&self, device: &CastDevice<'_>) -> CastResult<Option<(String, StatusEntry)>> {
        let status = device
            .receiver
            .get_status()
            .map_err(|e| CastError::protocol("receiver status", e))?;

        let Some(app) = status.applications.into_iter().next() else {
            self.forget_session()?;
            return Ok(None);
        };

        let transport_id = app.transport_id;
        device
            .connection
            .connect(transport_id.clone())
            .map_err(|e| CastError::protocol("media connection", e))?;

        let media = device
            .media
            .get_status(transport_id.clone(), None)
            .map_err(|e| CastError::protocol("media status", e))?;

        let entry = media.entries.into_iter().next();

        let mut session = self.session()?;
        session.transport_id = Some(transport_id.clone());
        session.media_session_id = entry.as_ref().map(|e| e.media_session_id);
        drop(session);

        Ok(entry.map(|e| (transport_id, e)))
    }
}

/// Title of a media entry, whatever the metadata flavour.
pub fn title_from_metadata(metadata: &Metadata) -> Option<String> {
    let title = match metadata {
        Metadata::Generic(m) => m.title.clone(),
        Metadata::Movie(m) => m.title.clone(),
        Metadata::TvShow(m) => m.episode_title.clone().or_else(|| m.series_title.clone()),
        Metadata::MusicTrack(m) => m.title.clone(),
        Metadata::Photo(m) => m.title.clone(),
    };

    title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn player_state(state: &CastPlayerState) -> PlayerState {
    match state {
        CastPlayerState::Idle => PlayerState::Idle,
        CastPlayerState::Playing => PlayerState::Playing,
        CastPlayerState::Buffering => PlayerState::Buffering,
        CastPlayerState::Paused => PlayerState::Paused,
    }
}

impl DeviceStatus for ChromecastDevice {
    fn receiver_status(&self) -> CastResult<ReceiverStatus> {
        let device = self.connect()?;
        let status = device
            .receiver
            .get_status()
            .map_err(|e| CastError::protocol("receiver status", e))?;

        let app = status.applications.first();
        let non_empty = |s: &String| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };

        Ok(ReceiverStatus {
            app_id: app.and_then(|a| non_empty(&a.app_id)),
            display_name: app.and_then(|a| non_empty(&a.display_name)),
            status_text: app.and_then(|a| non_empty(&a.status_text)),
            volume_level: status.volume.level,
            volume_muted: status.volume.muted,
            is_stand_by: status.is_stand_by,
        })
    }

    fn media_status(&self) -> CastResult<Option<MediaStatus>> {
        let device = self.connect()?;

        Ok(self.read_media(&device)?.map(|(_, entry)| MediaStatus {
            title: entry
                .media
                .as_ref()
                .and_then(|m| m.metadata.as_ref())
                .and_then(title_from_metadata),
            player_state: player_state(&entry.player_state),
            media_session_id: entry.media_session_id,
        }))
    }
}

impl VolumeControl for ChromecastDevice {
    fn set_muted(&self, muted: bool) -> CastResult<()> {
        debug!("ChromecastDevice: set_muted({})", muted);

        let device = self.connect()?;
        // Volume implements From<bool> as a mute-only change
        device
            .receiver
            .set_volume(muted)
            .map_err(|e| CastError::protocol("set mute", e))?;

        Ok(())
    }
}

impl TransportControl for ChromecastDevice {
    fn pause(&self) -> CastResult<()> {
        debug!("ChromecastDevice: pause()");

        let device = self.connect()?;

        let cached = {
            let session = self.session()?;
            session.transport_id.clone().zip(session.media_session_id)
        };

        let (transport_id, media_session_id) = match cached {
            Some((transport_id, media_session_id)) => {
                device
                    .connection
                    .connect(transport_id.clone())
                    .map_err(|e| CastError::protocol("media connection", e))?;
                (transport_id, media_session_id)
            }
            None => match self.read_media(&device)? {
                Some((transport_id, entry)) => (transport_id, entry.media_session_id),
                None => return Err(CastError::NoMediaSession),
            },
        };

        if let Err(e) = device.media.pause(transport_id, media_session_id) {
            // ids may be stale, the next call will look them up again
            self.forget_session()?;
            return Err(CastError::protocol("pause", e));
        }

        Ok(())
    }
}

impl ConnectionControl for ChromecastDevice {
    fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    fn check_connection(&self) -> CastResult<()> {
        let device = self.connect()?;
        device
            .heartbeat
            .ping()
            .map_err(|e| CastError::protocol("heartbeat", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_cast::channels::media::MusicTrackMediaMetadata;

    #[test]
    fn test_title_from_music_track() {
        let metadata = Metadata::MusicTrack(MusicTrackMediaMetadata {
            title: Some("  Creeper Rap  ".to_string()),
            ..Default::default()
        });
        assert_eq!(title_from_metadata(&metadata), Some("Creeper Rap".to_string()));
    }

    #[test]
    fn test_blank_title_is_none() {
        let metadata = Metadata::MusicTrack(MusicTrackMediaMetadata {
            title: Some("   ".to_string()),
            ..Default::default()
        });
        assert_eq!(title_from_metadata(&metadata), None);
    }

    #[test]
    fn test_player_state_mapping() {
        assert_eq!(player_state(&CastPlayerState::Buffering), PlayerState::Buffering);
        assert_eq!(player_state(&CastPlayerState::Idle), PlayerState::Idle);
    }

    #[test]
    fn test_from_location() {
        let device = ChromecastDevice::from_location("chromecast://192.168.1.20:8009").unwrap();
        assert_eq!(device.device_info().host, "192.168.1.20");
        assert!(ChromecastDevice::from_location("http://nope").is_err());
    }
}
