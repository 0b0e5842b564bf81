//! Boucle de surveillance d'un appareil Cast.
//!
//! Un [`Monitor`] interroge l'appareil à intervalle régulier, évalue
//! l'observation avec le [`Detector`] et, si un contenu bloqué est détecté,
//! met le média en pause puis coupe le son pour la durée configurée.
//!
//! Tant que la fenêtre de mute est ouverte, le son n'est jamais recoupé, même
//! si l'appareil le rapporte comme audible.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use cgcast::{CastControl, MediaStatus, PlayerState, ReceiverStatus};
use cgconfig::Config;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::detector::{BlockReason, Detection, Detector, Observation};
use crate::keywords::KeywordStore;
use crate::mute_timer::MuteTimer;

/// Granularité du sommeil entre deux polls : l'arrêt est pris en compte au
/// plus tard après cette durée.
const STOP_POLL_SLICE: Duration = Duration::from_millis(250);

#[derive(Clone, Debug)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub reconnect_interval: Duration,
    pub volume_check_interval: Duration,
    pub mute_duration: Duration,
    pub detection_log_interval: Duration,
    pub pause_settle: Duration,
    pub recent_apps_capacity: usize,
    pub titleless_apps: Vec<String>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            reconnect_interval: Duration::from_secs(10),
            volume_check_interval: Duration::from_secs(5),
            mute_duration: crate::mute_timer::DEFAULT_MUTE_DURATION,
            detection_log_interval: Duration::from_secs(10),
            pause_settle: Duration::from_millis(500),
            recent_apps_capacity: 5,
            titleless_apps: vec!["YouTube".to_string(), "233637DE".to_string()],
        }
    }
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.get_poll_interval_ms()),
            reconnect_interval: Duration::from_secs(config.get_reconnect_interval_secs()),
            volume_check_interval: Duration::from_secs(config.get_volume_check_interval_secs()),
            mute_duration: Duration::from_secs(config.get_mute_duration_secs()),
            detection_log_interval: Duration::from_secs(
                config.get_detection_log_interval_secs(),
            ),
            pause_settle: Duration::from_millis(config.get_pause_settle_ms()),
            recent_apps_capacity: config.get_recent_apps_capacity(),
            titleless_apps: config.get_titleless_apps(),
        }
    }
}

/// Dernier état connu, publié après chaque poll.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
pub struct MonitorSnapshot {
    pub connected: bool,
    pub app_id: Option<String>,
    pub current_app: Option<String>,
    pub current_title: Option<String>,
    pub player_state: Option<PlayerState>,
    pub volume_level: Option<f32>,
    /// Son coupé par le bloqueur (fenêtre de mute ouverte)
    pub muted: bool,
    pub muted_since: Option<DateTime<Utc>>,
    pub mute_remaining_secs: Option<u64>,
    pub cautious_mode: bool,
    pub last_reason: Option<String>,
    pub recent_apps: Vec<String>,
    pub last_poll: Option<DateTime<Utc>>,
}

pub type SharedSnapshot = Arc<RwLock<MonitorSnapshot>>;

pub struct Monitor {
    device: Arc<dyn CastControl>,
    keywords: KeywordStore,
    detector: Detector,
    settings: MonitorSettings,
    mute_timer: MuteTimer,
    muted_since: Option<DateTime<Utc>>,
    /// Etat de mute rapporté par l'appareil, resynchronisé à chaque
    /// vérification périodique du volume.
    device_muted: bool,
    last_app_id: Option<String>,
    last_title: Option<String>,
    recent_apps: VecDeque<String>,
    last_reason: Option<BlockReason>,
    last_reconnect: Instant,
    last_volume_check: Instant,
    last_detection_log: Option<Instant>,
    snapshot: SharedSnapshot,
}

fn elapsed_beyond(now: Instant, since: Instant, interval: Duration) -> bool {
    now.saturating_duration_since(since) > interval
}

impl Monitor {
    pub fn new(
        device: Arc<dyn CastControl>,
        keywords: KeywordStore,
        settings: MonitorSettings,
        snapshot: SharedSnapshot,
    ) -> Self {
        let now = Instant::now();
        Self {
            device,
            keywords,
            detector: Detector::new(settings.titleless_apps.iter()),
            mute_timer: MuteTimer::new(settings.mute_duration),
            settings,
            muted_since: None,
            device_muted: false,
            last_app_id: None,
            last_title: None,
            recent_apps: VecDeque::new(),
            last_reason: None,
            last_reconnect: now,
            last_volume_check: now,
            last_detection_log: None,
            snapshot,
        }
    }

    /// `true` tant que la fenêtre de mute ouverte par le bloqueur court.
    pub fn is_muting(&self) -> bool {
        self.mute_timer.is_active()
    }

    pub fn recent_apps(&self) -> impl Iterator<Item = &str> {
        self.recent_apps.iter().map(String::as_str)
    }

    /// Un cycle de surveillance.
    ///
    /// Retourne `None` si le statut du récepteur n'a pas pu être lu.
    pub fn tick(&mut self, now: Instant) -> Option<Detection> {
        let keywords = self.keywords.snapshot();
        let cautious = keywords.is_empty();
        if cautious {
            debug!("Running in cautious mode, every content is blocked");
        }

        let log_due = self.last_detection_log.is_none_or(|last| {
            elapsed_beyond(now, last, self.settings.detection_log_interval)
        });

        if elapsed_beyond(now, self.last_reconnect, self.settings.reconnect_interval) {
            debug!("Periodic connection check");
            if let Err(e) = self.device.reconnect() {
                warn!("Failed to reconnect: {}", e);
            }
            self.last_reconnect = now;
        }

        if self.mute_timer.is_expired(now) {
            self.release_mute();
        }

        let receiver = match self.device.receiver_status() {
            Ok(receiver) => receiver,
            Err(e) => {
                error!("Error getting receiver status: {}", e);
                if let Err(e) = self.device.reconnect() {
                    warn!("Failed to reconnect: {}", e);
                }
                self.last_reconnect = now;
                self.publish(now, None, None, cautious, false);
                return None;
            }
        };
        self.track_app(&receiver);

        let media = match self.device.media_status() {
            Ok(media) => media,
            Err(e) => {
                if log_due {
                    debug!("Media status unavailable: {}", e);
                }
                None
            }
        };
        self.track_title(media.as_ref());

        let volume_check =
            elapsed_beyond(now, self.last_volume_check, self.settings.volume_check_interval);
        if volume_check {
            self.last_volume_check = now;
            self.device_muted = receiver.is_muted();
            if log_due {
                info!(
                    "Periodic check: volume={:?}, muted={}",
                    receiver.volume_level, self.device_muted
                );
            }
        }

        let observation = Observation {
            receiver: &receiver,
            media: media.as_ref(),
            titleless_app_seen: self.titleless_app_seen(&receiver),
            volume_check,
        };
        let detection = self.detector.evaluate(&observation, &keywords);

        if log_due {
            self.last_detection_log = Some(now);
            match &detection.reason {
                Some(reason) => warn!("Content blocked: {}", reason),
                None => info!("No content to block detected"),
            }
        }

        if let Some(reason) = &detection.reason {
            if !self.mute_timer.is_active() && !self.device_muted {
                self.block(reason, media.as_ref(), now);
            }
            self.last_reason = Some(reason.clone());
        }

        self.publish(now, Some(&receiver), media.as_ref(), cautious, true);
        Some(detection)
    }

    /// Interroge l'appareil jusqu'à ce que `stop_flag` passe à `true`.
    pub fn run(&mut self, stop_flag: &AtomicBool) {
        info!(
            "Monitoring {} ({}:{})",
            self.device.device_info().friendly_name,
            self.device.device_info().host,
            self.device.device_info().port
        );
        while !stop_flag.load(Ordering::SeqCst) {
            self.tick(Instant::now());
            sleep_unless_stopped(self.settings.poll_interval, stop_flag);
        }
        info!("Monitoring stopped");
    }

    fn release_mute(&mut self) {
        info!(
            "Mute window of {:.1} minutes is over, unmuting",
            self.mute_timer.duration().as_secs_f64() / 60.0
        );
        match self.device.set_muted(false) {
            Ok(()) => {
                self.mute_timer.cancel();
                self.muted_since = None;
                self.device_muted = false;
                info!("Unmuted");
            }
            Err(e) => warn!("Failed to unmute: {}", e),
        }
    }

    fn block(&mut self, reason: &BlockReason, media: Option<&MediaStatus>, now: Instant) {
        warn!("Muting device: {}", reason);

        if media.is_some_and(|m| m.player_state.is_active()) {
            match self.device.pause() {
                Ok(()) => {
                    info!("Media paused");
                    if !self.settings.pause_settle.is_zero() {
                        thread::sleep(self.settings.pause_settle);
                    }
                }
                Err(e) => warn!("Failed to pause: {}", e),
            }
        }

        match self.device.set_muted(true) {
            Ok(()) => {
                self.mute_timer.start(now);
                self.muted_since = Some(Utc::now());
                self.device_muted = true;
                info!(
                    "Muted for {:.1} minutes",
                    self.mute_timer.duration().as_secs_f64() / 60.0
                );
            }
            // Le timer n'est pas démarré : nouvelle tentative au prochain poll.
            Err(e) => error!("Failed to mute: {}", e),
        }
    }

    fn track_app(&mut self, receiver: &ReceiverStatus) {
        if let Some(app_id) = &receiver.app_id {
            self.remember_app(app_id);
        }
        if receiver.app_id != self.last_app_id {
            match &receiver.app_id {
                Some(app_id) => info!(
                    "App changed to {} ({})",
                    receiver.display_name.as_deref().unwrap_or("Unknown"),
                    app_id
                ),
                None => info!("No app running"),
            }
            self.last_app_id = receiver.app_id.clone();
        }
    }

    fn remember_app(&mut self, app_id: &str) {
        if let Some(pos) = self.recent_apps.iter().position(|a| a == app_id) {
            self.recent_apps.remove(pos);
        }
        self.recent_apps.push_back(app_id.to_string());
        while self.recent_apps.len() > self.settings.recent_apps_capacity {
            self.recent_apps.pop_front();
        }
    }

    fn track_title(&mut self, media: Option<&MediaStatus>) {
        let Some(title) = media.and_then(|m| m.title.as_deref()) else {
            return;
        };
        if self.last_title.as_deref() != Some(title) {
            info!("Media title: {}", title);
            self.last_title = Some(title.to_string());
        }
    }

    fn titleless_app_seen(&self, receiver: &ReceiverStatus) -> bool {
        let current = [receiver.app_id.as_deref(), receiver.display_name.as_deref()];
        current
            .into_iter()
            .flatten()
            .chain(self.recent_apps())
            .any(|name| self.detector.is_titleless_app(name))
    }

    fn publish(
        &self,
        now: Instant,
        receiver: Option<&ReceiverStatus>,
        media: Option<&MediaStatus>,
        cautious: bool,
        connected: bool,
    ) {
        let snapshot = MonitorSnapshot {
            connected,
            app_id: receiver.and_then(|r| r.app_id.clone()),
            current_app: receiver.and_then(|r| r.display_name.clone()),
            current_title: media.and_then(|m| m.title.clone()),
            player_state: media.map(|m| m.player_state),
            volume_level: receiver.and_then(|r| r.volume_level),
            muted: self.mute_timer.is_active(),
            muted_since: self.muted_since,
            mute_remaining_secs: self.mute_timer.remaining(now).map(|d| d.as_secs()),
            cautious_mode: cautious,
            last_reason: self.last_reason.as_ref().map(ToString::to_string),
            recent_apps: self.recent_apps.iter().cloned().collect(),
            last_poll: Some(Utc::now()),
        };
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

fn sleep_unless_stopped(total: Duration, stop_flag: &AtomicBool) {
    let deadline = Instant::now() + total;
    loop {
        if stop_flag.load(Ordering::SeqCst) {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        thread::sleep(remaining.min(STOP_POLL_SLICE));
    }
}
