//! Decides, from one observation of the device, whether content is blocked.
//!
//! Rules are evaluated in order and a later rule replaces the reason given by
//! an earlier one:
//!
//! 1. cautious mode iff the keyword list is empty;
//! 2. the app display name matches a keyword (any app in cautious mode);
//! 3. the media title matches a keyword (any title in cautious mode);
//! 4. something is playing and either cautious mode is on or the title is
//!    missing while a title-less app is running or was seen recently;
//! 5. on a periodic volume check in cautious mode, an app is running with
//!    audible volume.

use std::fmt;

use cgcast::{MediaStatus, ReceiverStatus};

use crate::matcher::match_keyword;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockReason {
    AppName { app: String, keyword: String },
    Title { title: String, keyword: String },
    CautiousMode,
    UnknownContent,
    PeriodicCautiousCheck,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::AppName { app, keyword } => {
                write!(f, "App name: {} (keyword '{}')", app, keyword)
            }
            BlockReason::Title { title, keyword } => {
                write!(f, "Title: {} (keyword '{}')", title, keyword)
            }
            BlockReason::CautiousMode => f.write_str("Cautious mode - blocking all content"),
            BlockReason::UnknownContent => {
                f.write_str("Cautious approach - blocking unknown content")
            }
            BlockReason::PeriodicCautiousCheck => {
                f.write_str("Periodic cautious check for active media")
            }
        }
    }
}

/// What the monitor saw during one poll.
#[derive(Clone, Copy, Debug)]
pub struct Observation<'a> {
    pub receiver: &'a ReceiverStatus,
    pub media: Option<&'a MediaStatus>,
    /// A title-less app is running or is among the recent apps.
    pub titleless_app_seen: bool,
    /// The periodic volume check is due on this poll.
    pub volume_check: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Detection {
    pub cautious: bool,
    pub reason: Option<BlockReason>,
}

impl Detection {
    pub fn is_blocked(&self) -> bool {
        self.reason.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct Detector {
    /// Lower-cased app ids or display names that may play without a title.
    titleless_apps: Vec<String>,
}

impl Default for Detector {
    fn default() -> Self {
        Self::new(["YouTube", "233637DE"])
    }
}

impl Detector {
    pub fn new<I, S>(titleless_apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            titleless_apps: titleless_apps
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// True if `name` (an app id or display name) is a title-less app.
    pub fn is_titleless_app(&self, name: &str) -> bool {
        let name = name.trim().to_lowercase();
        self.titleless_apps.iter().any(|app| *app == name)
    }

    pub fn evaluate(&self, observation: &Observation<'_>, keywords: &[String]) -> Detection {
        let cautious = keywords.is_empty();
        let receiver = observation.receiver;
        let mut reason = None;

        if let Some(app) = receiver.display_name.as_deref() {
            if cautious {
                reason = Some(BlockReason::CautiousMode);
            } else if let Some(keyword) = match_keyword(app, keywords) {
                reason = Some(BlockReason::AppName {
                    app: app.to_string(),
                    keyword: keyword.to_string(),
                });
            }
        }

        let title = observation
            .media
            .and_then(|m| m.title.as_deref())
            .filter(|t| !t.trim().is_empty());

        if let Some(title) = title {
            if cautious {
                reason = Some(BlockReason::CautiousMode);
            } else if let Some(keyword) = match_keyword(title, keywords) {
                reason = Some(BlockReason::Title {
                    title: title.to_string(),
                    keyword: keyword.to_string(),
                });
            }
        }

        if let Some(media) = observation.media {
            let unknown = title.is_none() && observation.titleless_app_seen;
            if media.player_state.is_active() && (cautious || unknown) {
                reason = Some(BlockReason::UnknownContent);
            }
        }

        if observation.volume_check
            && cautious
            && receiver.volume_level.unwrap_or(0.0) > 0.0
            && !receiver.is_muted()
            && receiver.has_application()
        {
            reason = Some(BlockReason::PeriodicCautiousCheck);
        }

        Detection { cautious, reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgcast::PlayerState;

    fn keywords() -> Vec<String> {
        vec!["minecraft".to_string(), "creeper".to_string()]
    }

    fn receiver(app: &str) -> ReceiverStatus {
        ReceiverStatus {
            app_id: Some("233637DE".to_string()),
            display_name: Some(app.to_string()),
            status_text: None,
            volume_level: Some(0.5),
            volume_muted: Some(false),
            is_stand_by: false,
        }
    }

    fn media(title: Option<&str>, state: PlayerState) -> MediaStatus {
        MediaStatus {
            title: title.map(str::to_string),
            player_state: state,
            media_session_id: 1,
        }
    }

    fn observe<'a>(receiver: &'a ReceiverStatus, media: Option<&'a MediaStatus>) -> Observation<'a> {
        Observation {
            receiver,
            media,
            titleless_app_seen: false,
            volume_check: false,
        }
    }

    #[test]
    fn test_clean_content_is_not_blocked() {
        let r = receiver("YouTube");
        let m = media(Some("Bluey full episode"), PlayerState::Playing);
        let detection = Detector::default().evaluate(&observe(&r, Some(&m)), &keywords());
        assert!(!detection.is_blocked());
        assert!(!detection.cautious);
    }

    #[test]
    fn test_app_name_match() {
        let r = receiver("Minecraft Videos");
        let detection = Detector::default().evaluate(&observe(&r, None), &keywords());
        assert_eq!(
            detection.reason,
            Some(BlockReason::AppName {
                app: "Minecraft Videos".to_string(),
                keyword: "minecraft".to_string()
            })
        );
    }

    #[test]
    fn test_title_match_overrides_app_reason() {
        let r = receiver("Minecraft TV");
        let m = media(Some("CREEPER encounter"), PlayerState::Paused);
        let detection = Detector::default().evaluate(&observe(&r, Some(&m)), &keywords());
        assert!(matches!(detection.reason, Some(BlockReason::Title { ref keyword, .. }) if keyword == "creeper"));
    }

    #[test]
    fn test_cautious_mode_iff_no_keywords() {
        let r = receiver("Netflix");
        let detector = Detector::default();

        let detection = detector.evaluate(&observe(&r, None), &[]);
        assert!(detection.cautious);
        assert_eq!(detection.reason, Some(BlockReason::CautiousMode));

        let detection = detector.evaluate(&observe(&r, None), &keywords());
        assert!(!detection.cautious);
        assert_eq!(detection.reason, None);
    }

    #[test]
    fn test_cautious_mode_blocks_any_title() {
        let r = ReceiverStatus::default();
        let m = media(Some("Anything"), PlayerState::Paused);
        let detection = Detector::default().evaluate(&observe(&r, Some(&m)), &[]);
        assert_eq!(detection.reason, Some(BlockReason::CautiousMode));
    }

    #[test]
    fn test_titleless_app_playing_is_unknown_content() {
        let r = receiver("YouTube");
        let m = media(None, PlayerState::Buffering);
        let mut observation = observe(&r, Some(&m));
        observation.titleless_app_seen = true;

        let detection = Detector::default().evaluate(&observation, &keywords());
        assert_eq!(detection.reason, Some(BlockReason::UnknownContent));
    }

    #[test]
    fn test_missing_title_without_titleless_app_is_allowed() {
        let r = receiver("Spotify");
        let m = media(None, PlayerState::Playing);
        let detection = Detector::default().evaluate(&observe(&r, Some(&m)), &keywords());
        assert!(!detection.is_blocked());
    }

    #[test]
    fn test_paused_titleless_content_is_allowed() {
        let r = receiver("YouTube");
        let m = media(None, PlayerState::Paused);
        let mut observation = observe(&r, Some(&m));
        observation.titleless_app_seen = true;

        let detection = Detector::default().evaluate(&observation, &keywords());
        assert!(!detection.is_blocked());
    }

    #[test]
    fn test_periodic_cautious_check() {
        let r = ReceiverStatus {
            display_name: None,
            ..receiver("")
        };
        let mut observation = observe(&r, None);
        observation.volume_check = true;

        let detection = Detector::default().evaluate(&observation, &[]);
        assert_eq!(detection.reason, Some(BlockReason::PeriodicCautiousCheck));

        // muted devices are left alone
        let muted = ReceiverStatus {
            volume_muted: Some(true),
            ..r.clone()
        };
        let mut observation = observe(&muted, None);
        observation.volume_check = true;
        assert_eq!(Detector::default().evaluate(&observation, &[]).reason, None);
    }

    #[test]
    fn test_titleless_app_lookup() {
        let detector = Detector::new(["YouTube", " 233637de "]);
        assert!(detector.is_titleless_app("youtube"));
        assert!(detector.is_titleless_app("233637DE"));
        assert!(!detector.is_titleless_app("CC1AD845"));
    }
}
