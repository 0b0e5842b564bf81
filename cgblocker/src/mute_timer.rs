//! Timed mute window.
//!
//! Started when the monitor mutes the device; once expired the monitor
//! unmutes and cancels it.

use std::time::{Duration, Instant};

/// Default time a blocked device stays muted.
pub const DEFAULT_MUTE_DURATION: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct MuteTimer {
    duration: Duration,
    /// When the mute was applied (None if not muted by us).
    started_at: Option<Instant>,
}

impl Default for MuteTimer {
    fn default() -> Self {
        Self::new(DEFAULT_MUTE_DURATION)
    }
}

impl MuteTimer {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            started_at: None,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Starts (or restarts) the window at `now`.
    pub fn start(&mut self, now: Instant) {
        self.started_at = Some(now);
    }

    pub fn cancel(&mut self) {
        self.started_at = None;
    }

    pub fn is_active(&self) -> bool {
        self.started_at.is_some()
    }

    /// True once strictly more than the duration has elapsed.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.started_at
            .map(|start| now.saturating_duration_since(start) > self.duration)
            .unwrap_or(false)
    }

    /// Time left before expiry, `None` when inactive.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.started_at.map(|start| {
            self.duration
                .saturating_sub(now.saturating_duration_since(start))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_timer_is_inactive() {
        let timer = MuteTimer::default();
        let now = Instant::now();
        assert!(!timer.is_active());
        assert!(!timer.is_expired(now));
        assert_eq!(timer.remaining(now), None);
        assert_eq!(timer.duration(), Duration::from_secs(600));
    }

    #[test]
    fn test_expiry() {
        let mut timer = MuteTimer::new(Duration::from_secs(60));
        let t0 = Instant::now();
        timer.start(t0);

        assert!(timer.is_active());
        assert!(!timer.is_expired(t0 + Duration::from_secs(30)));
        assert!(!timer.is_expired(t0 + Duration::from_secs(60)));
        assert!(timer.is_expired(t0 + Duration::from_secs(61)));
    }

    #[test]
    fn test_remaining_never_negative() {
        let mut timer = MuteTimer::new(Duration::from_secs(10));
        let t0 = Instant::now();
        timer.start(t0);

        assert_eq!(
            timer.remaining(t0 + Duration::from_secs(4)),
            Some(Duration::from_secs(6))
        );
        assert_eq!(
            timer.remaining(t0 + Duration::from_secs(100)),
            Some(Duration::ZERO)
        );
        // a clock reading before the start counts as no time elapsed
        assert_eq!(timer.remaining(t0), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_cancel() {
        let mut timer = MuteTimer::default();
        let t0 = Instant::now();
        timer.start(t0);
        timer.cancel();

        assert!(!timer.is_active());
        assert!(!timer.is_expired(t0 + Duration::from_secs(3600)));
    }
}
