//! Pilotage du bloqueur : démarrage et arrêt du thread de surveillance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use cgcast::{CastControl, DeviceInfo};
use cgconfig::Config;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::errors::BlockerError;
use crate::keywords::KeywordStore;
use crate::monitor::{Monitor, MonitorSettings, MonitorSnapshot, SharedSnapshot};

const MONITOR_THREAD_NAME: &str = "castguard-monitor";

struct RunHandle {
    stop_flag: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl RunHandle {
    fn is_alive(&self) -> bool {
        !self.thread.is_finished() && !self.stop_flag.load(Ordering::SeqCst)
    }

    fn join(self) {
        if self.thread.join().is_err() {
            error!("Monitor thread panicked");
        }
    }
}

/// État exposé par `/api/status`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
pub struct BlockerStatus {
    pub running: bool,
    pub keywords: Vec<String>,
    pub cautious_mode: bool,
    pub device: DeviceInfo,
    pub monitor: MonitorSnapshot,
}

pub struct Blocker {
    device: Arc<dyn CastControl>,
    keywords: KeywordStore,
    settings: MonitorSettings,
    snapshot: SharedSnapshot,
    run: Mutex<Option<RunHandle>>,
}

impl Blocker {
    pub fn new(
        device: Arc<dyn CastControl>,
        keywords: KeywordStore,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            device,
            keywords,
            settings,
            snapshot: SharedSnapshot::default(),
            run: Mutex::new(None),
        }
    }

    /// Bloqueur configuré depuis `config` (fichier de mots-clés, intervalles).
    pub fn from_config(device: Arc<dyn CastControl>, config: &Config) -> Self {
        Self::new(
            device,
            KeywordStore::load(config.get_keywords_file()),
            MonitorSettings::from_config(config),
        )
    }

    fn run_slot(&self) -> MutexGuard<'_, Option<RunHandle>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn device_info(&self) -> &DeviceInfo {
        self.device.device_info()
    }

    pub fn keywords(&self) -> Vec<String> {
        self.keywords.snapshot()
    }

    pub fn update_keywords<I, S>(&self, keywords: I) -> Result<Vec<String>, BlockerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.keywords.replace(keywords)
    }

    pub fn is_running(&self) -> bool {
        self.run_slot().as_ref().is_some_and(RunHandle::is_alive)
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> BlockerStatus {
        let keywords = self.keywords();
        BlockerStatus {
            running: self.is_running(),
            cautious_mode: keywords.is_empty(),
            keywords,
            device: self.device_info().clone(),
            monitor: self.snapshot(),
        }
    }

    fn new_monitor(&self) -> Monitor {
        Monitor::new(
            self.device.clone(),
            self.keywords.clone(),
            self.settings.clone(),
            self.snapshot.clone(),
        )
    }

    fn reset_snapshot(&self) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) =
            MonitorSnapshot::default();
    }

    /// Attend la fin d'un thread de surveillance déjà arrêté.
    ///
    /// Sans effet si la surveillance tourne ou si aucun thread n'a été lancé.
    /// Appelé avant [`Blocker::start`] pour que celui-ci n'ait rien à attendre.
    pub fn reap_stopped(&self) {
        let previous = {
            let mut slot = self.run_slot();
            if slot.as_ref().is_some_and(RunHandle::is_alive) {
                return;
            }
            slot.take()
        };
        if let Some(previous) = previous {
            debug!("Waiting for the previous monitor thread to finish");
            previous.join();
        }
    }

    /// Lance la surveillance dans un thread dédié.
    ///
    /// Si `keywords` est fourni, la liste est remplacée avant le démarrage ;
    /// un échec de sauvegarde est journalisé et n'empêche pas le démarrage.
    pub fn start(&self, keywords: Option<Vec<String>>) -> Result<(), BlockerError> {
        let mut slot = self.run_slot();
        if slot.as_ref().is_some_and(RunHandle::is_alive) {
            return Err(BlockerError::AlreadyRunning);
        }
        if let Some(previous) = slot.take() {
            debug!("Waiting for the previous monitor thread to finish");
            previous.join();
        }

        if let Some(keywords) = keywords {
            if let Err(e) = self.keywords.replace(keywords) {
                warn!("Starting with unsaved keywords: {}", e);
            }
        }

        self.reset_snapshot();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag = stop_flag.clone();
        let mut monitor = self.new_monitor();

        let thread = thread::Builder::new()
            .name(MONITOR_THREAD_NAME.to_string())
            .spawn(move || monitor.run(&flag))?;

        *slot = Some(RunHandle { stop_flag, thread });
        info!(
            "Blocker started on {} with {} keyword(s)",
            self.device_info().friendly_name,
            self.keywords.snapshot().len()
        );
        Ok(())
    }

    /// Demande l'arrêt de la surveillance et rend le son.
    ///
    /// Ne bloque pas : le thread termine son cycle en cours et s'arrête.
    pub fn stop(&self) -> Result<(), BlockerError> {
        let slot = self.run_slot();
        let Some(handle) = slot.as_ref().filter(|h| h.is_alive()) else {
            return Err(BlockerError::NotRunning);
        };
        handle.stop_flag.store(true, Ordering::SeqCst);
        drop(slot);

        self.unmute();
        info!("Blocker stopped");
        Ok(())
    }

    /// Arrête la surveillance si besoin et attend la fin du thread.
    pub fn shutdown(&self) {
        let handle = self.run_slot().take();
        if let Some(handle) = handle {
            let was_alive = handle.is_alive();
            handle.stop_flag.store(true, Ordering::SeqCst);
            handle.join();
            if was_alive {
                self.unmute();
                info!("Blocker shut down");
            }
        }
    }

    /// Surveille dans le thread courant jusqu'à ce que `stop_flag` passe à
    /// `true`, puis rend le son.
    pub fn run_foreground(&self, stop_flag: &AtomicBool) -> Result<(), BlockerError> {
        if self.is_running() {
            return Err(BlockerError::AlreadyRunning);
        }
        self.reset_snapshot();
        self.new_monitor().run(stop_flag);
        self.unmute();
        Ok(())
    }

    fn unmute(&self) {
        if let Err(e) = self.device.set_muted(false) {
            warn!("Failed to unmute on stop: {}", e);
        }
    }
}

impl Drop for Blocker {
    fn drop(&mut self) {
        if let Some(handle) = self.run_slot().as_ref() {
            handle.stop_flag.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDevice;
    use std::time::Duration;
    use tempfile::TempDir;

    fn blocker(dir: &TempDir, device: Arc<MockDevice>) -> Blocker {
        let settings = MonitorSettings {
            poll_interval: Duration::from_millis(10),
            pause_settle: Duration::ZERO,
            ..Default::default()
        };
        Blocker::new(
            device,
            KeywordStore::load(dir.path().join("blocker_config.json")),
            settings,
        )
    }

    #[test]
    fn test_start_stop_cycle() {
        let dir = TempDir::new().unwrap();
        let device = Arc::new(MockDevice::new());
        let blocker = blocker(&dir, device.clone());

        assert!(!blocker.is_running());
        blocker.start(None).unwrap();
        assert!(blocker.is_running());
        assert!(matches!(blocker.start(None), Err(BlockerError::AlreadyRunning)));

        blocker.stop().unwrap();
        assert!(!blocker.is_running());
        assert!(matches!(blocker.stop(), Err(BlockerError::NotRunning)));
        assert_eq!(device.state().unmute_calls, 1);

        // Redémarrage possible après un arrêt
        blocker.start(None).unwrap();
        assert!(blocker.is_running());
        blocker.shutdown();
        assert!(!blocker.is_running());
    }

    #[test]
    fn test_start_with_keywords_replaces_list() {
        let dir = TempDir::new().unwrap();
        let blocker = blocker(&dir, Arc::new(MockDevice::new()));

        blocker
            .start(Some(vec!["Creeper".to_string(), " ".to_string()]))
            .unwrap();
        assert_eq!(blocker.keywords(), vec!["creeper"]);
        assert!(dir.path().join("blocker_config.json").exists());
        blocker.shutdown();
    }

    #[test]
    fn test_start_survives_unwritable_keyword_file() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("blocker_config.json")).unwrap();
        let blocker = blocker(&dir, Arc::new(MockDevice::new()));

        blocker.start(Some(vec!["bluey".to_string()])).unwrap();
        assert!(blocker.is_running());
        assert_eq!(blocker.keywords(), vec!["bluey"]);
        blocker.shutdown();
    }

    #[test]
    fn test_reap_stopped_leaves_running_thread_alone() {
        let dir = TempDir::new().unwrap();
        let blocker = blocker(&dir, Arc::new(MockDevice::new()));

        blocker.reap_stopped();
        blocker.start(None).unwrap();
        blocker.reap_stopped();
        assert!(blocker.is_running());

        blocker.stop().unwrap();
        blocker.reap_stopped();
        assert!(blocker.run_slot().is_none());
        blocker.start(None).unwrap();
        assert!(blocker.is_running());
        blocker.shutdown();
    }

    #[test]
    fn test_monitor_mutes_blocked_content() {
        let dir = TempDir::new().unwrap();
        let device = Arc::new(MockDevice::playing("CC1AD845", "Receiver", Some("Minecraft")));
        let blocker = blocker(&dir, device.clone());

        blocker.start(None).unwrap();
        for _ in 0..100 {
            if device.state().mute_calls > 0 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        blocker.shutdown();

        let state = device.state();
        assert_eq!(state.mute_calls, 1);
        assert_eq!(state.pause_calls, 1);
        assert_eq!(state.unmute_calls, 1);
    }

    #[test]
    fn test_status_reports_cautious_mode() {
        let dir = TempDir::new().unwrap();
        let blocker = blocker(&dir, Arc::new(MockDevice::new()));

        let status = blocker.status();
        assert!(!status.running);
        assert!(!status.cautious_mode);
        assert_eq!(status.device.friendly_name, "Mock TV");

        blocker.update_keywords(Vec::<String>::new()).unwrap();
        let status = blocker.status();
        assert!(status.cautious_mode);
        assert!(status.keywords.is_empty());
    }

    #[test]
    fn test_run_foreground_returns_when_flag_is_set() {
        let dir = TempDir::new().unwrap();
        let device = Arc::new(MockDevice::new());
        let blocker = blocker(&dir, device.clone());
        let flag = AtomicBool::new(true);

        blocker.run_foreground(&flag).unwrap();
        assert_eq!(device.state().unmute_calls, 1);
    }
}
