//! Capacités d'un appareil de diffusion, indépendamment du transport.
//!
//! Le moniteur ne connaît que ces traits : l'implémentation réelle est
//! [`crate::ChromecastDevice`], les tests utilisent un appareil simulé.

use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::errors::CastResult;
use crate::model::{DeviceInfo, MediaStatus, ReceiverStatus};

/// Lecture de l'état du récepteur et de la session média.
pub trait DeviceStatus {
    /// Application en cours et volume.
    fn receiver_status(&self) -> CastResult<ReceiverStatus>;

    /// Première session média de l'application en cours.
    ///
    /// `Ok(None)` quand aucune application ou aucune session n'est active.
    fn media_status(&self) -> CastResult<Option<MediaStatus>>;
}

/// Contrôle du mute.
pub trait VolumeControl {
    fn set_muted(&self, muted: bool) -> CastResult<()>;
}

/// Contrôle du transport (seule la pause est nécessaire).
pub trait TransportControl {
    fn pause(&self) -> CastResult<()>;
}

/// Santé de la connexion.
pub trait ConnectionControl {
    fn device_info(&self) -> &DeviceInfo;

    /// Ouvre une connexion et envoie un ping.
    fn check_connection(&self) -> CastResult<()>;

    /// Délai avant la seconde tentative de [`ConnectionControl::reconnect`].
    fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(1)
    }

    /// Vérifie la connexion ; en cas d'échec, attend puis réessaie une fois.
    fn reconnect(&self) -> CastResult<()> {
        if self.check_connection().is_ok() {
            return Ok(());
        }

        warn!(
            "Lost connection to {}, retrying",
            self.device_info().friendly_name
        );
        thread::sleep(self.reconnect_delay());

        match self.check_connection() {
            Ok(()) => {
                info!("Reconnected to {}", self.device_info().friendly_name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Tout ce dont le moniteur a besoin, partageable entre threads.
pub trait CastControl:
    DeviceStatus + VolumeControl + TransportControl + ConnectionControl + Send + Sync
{
}

impl<T> CastControl for T where
    T: DeviceStatus + VolumeControl + TransportControl + ConnectionControl + Send + Sync
{
}
