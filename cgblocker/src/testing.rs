//! Scripted in-memory device for tests.
//!
//! Records every command it receives and answers status requests from a
//! state the test can change between polls.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cgcast::{
    CastError, CastResult, ConnectionControl, DeviceInfo, DeviceStatus, MediaStatus, PlayerState,
    ReceiverStatus, TransportControl, VolumeControl,
};

#[derive(Clone, Debug)]
pub struct MockState {
    pub receiver: ReceiverStatus,
    pub media: Option<MediaStatus>,
    pub receiver_error: bool,
    pub media_error: bool,
    pub connection_ok: bool,
    pub mute_calls: usize,
    pub unmute_calls: usize,
    pub pause_calls: usize,
    pub connection_checks: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            receiver: ReceiverStatus {
                volume_level: Some(0.5),
                volume_muted: Some(false),
                ..Default::default()
            },
            media: None,
            receiver_error: false,
            media_error: false,
            connection_ok: true,
            mute_calls: 0,
            unmute_calls: 0,
            pause_calls: 0,
            connection_checks: 0,
        }
    }
}

pub struct MockDevice {
    info: DeviceInfo,
    state: Mutex<MockState>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Idle device, volume at 50%, not muted.
    pub fn new() -> Self {
        Self {
            info: DeviceInfo {
                friendly_name: "Mock TV".to_string(),
                ..DeviceInfo::manual("127.0.0.1", 8009)
            },
            state: Mutex::new(MockState::default()),
        }
    }

    /// Device with `app` running and playing `title`.
    pub fn playing(app_id: &str, display_name: &str, title: Option<&str>) -> Self {
        let device = Self::new();
        device.set_playing(app_id, display_name, title);
        device
    }

    pub fn set_playing(&self, app_id: &str, display_name: &str, title: Option<&str>) {
        self.update(|s| {
            s.receiver.app_id = Some(app_id.to_string());
            s.receiver.display_name = Some(display_name.to_string());
            s.media = Some(MediaStatus {
                title: title.map(str::to_string),
                player_state: PlayerState::Playing,
                media_session_id: 1,
            });
        });
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update(&self, f: impl FnOnce(&mut MockState)) {
        f(&mut self.lock());
    }

    pub fn state(&self) -> MockState {
        self.lock().clone()
    }
}

impl DeviceStatus for MockDevice {
    fn receiver_status(&self) -> CastResult<ReceiverStatus> {
        let state = self.lock();
        if state.receiver_error {
            return Err(CastError::connection(
                &self.info.host,
                self.info.port,
                "scripted failure",
            ));
        }
        Ok(state.receiver.clone())
    }

    fn media_status(&self) -> CastResult<Option<MediaStatus>> {
        let state = self.lock();
        if state.media_error {
            return Err(CastError::protocol("media status", "scripted failure"));
        }
        Ok(state.media.clone())
    }
}

impl VolumeControl for MockDevice {
    fn set_muted(&self, muted: bool) -> CastResult<()> {
        let mut state = self.lock();
        if muted {
            state.mute_calls += 1;
        } else {
            state.unmute_calls += 1;
        }
        state.receiver.volume_muted = Some(muted);
        Ok(())
    }
}

impl TransportControl for MockDevice {
    fn pause(&self) -> CastResult<()> {
        let mut state = self.lock();
        state.pause_calls += 1;
        match state.media.as_mut() {
            Some(media) => {
                media.player_state = PlayerState::Paused;
                Ok(())
            }
            None => Err(CastError::NoMediaSession),
        }
    }
}

impl ConnectionControl for MockDevice {
    fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    fn check_connection(&self) -> CastResult<()> {
        let mut state = self.lock();
        state.connection_checks += 1;
        if state.connection_ok {
            Ok(())
        } else {
            Err(CastError::connection(
                &self.info.host,
                self.info.port,
                "scripted failure",
            ))
        }
    }

    fn reconnect_delay(&self) -> Duration {
        Duration::ZERO
    }
}
