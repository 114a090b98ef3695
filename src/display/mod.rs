pub mod monitor;

use serde::Serialize;
use tracing::warn;

/// The platform's default display. Never a valid overlay target.
pub const PRIMARY_DISPLAY_ID: u32 = 0;

/// What the enumeration query said on one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Connected(u32),
    Disconnected,
    /// Output that is neither blank nor a display id.
    Invalid(String),
}

/// Published display state. `connected == false` implies `display_id == None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DisplayState {
    pub connected: bool,
    pub display_id: Option<u32>,
    pub last_error: Option<String>,
}

impl DisplayState {
    pub fn connected(display_id: u32) -> Self {
        Self {
            connected: true,
            display_id: Some(display_id),
            last_error: None,
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    fn from_observation(observation: &Observation) -> Self {
        match observation {
            Observation::Connected(id) => Self::connected(*id),
            Observation::Disconnected => Self::disconnected(),
            Observation::Invalid(raw) => Self {
                connected: false,
                display_id: None,
                last_error: Some(format!("Error: Invalid ID ({raw})")),
            },
        }
    }

    /// Equality under the publication policy: connectivity and id only.
    fn same_target(&self, other: &DisplayState) -> bool {
        self.connected == other.connected && self.display_id == other.display_id
    }

    /// Whether `self` must replace `published`: the target changed, or a
    /// clean reading clears a published error.
    fn supersedes(&self, published: &DisplayState) -> bool {
        !published.same_target(self) || (published.last_error.is_some() && self.last_error.is_none())
    }
}

/// Parse the enumeration output. `None` (channel failure) counts as blank.
///
/// Accepts either a bare id (`2`) or the raw dumpsys field (`mDisplayId=2`).
pub fn parse_enumeration(output: Option<&str>) -> Observation {
    let Some(line) = output
        .into_iter()
        .flat_map(str::lines)
        .map(str::trim)
        .find(|l| !l.is_empty())
    else {
        return Observation::Disconnected;
    };
    let value = line.strip_prefix("mDisplayId=").unwrap_or(line).trim();
    match value.parse::<u32>() {
        Ok(PRIMARY_DISPLAY_ID) => Observation::Disconnected,
        Ok(id) => Observation::Connected(id),
        Err(_) => Observation::Invalid(value.to_string()),
    }
}

/// Debounces observations into published state changes.
///
/// A change is published when connectivity flips, or when the display stays
/// connected under a different id. A clean reading after a published error
/// is republished so the error doesn't linger. The very first observation is
/// always published so consumers leave their "detecting" phase.
#[derive(Debug, Default)]
pub struct DisplayTracker {
    published: Option<DisplayState>,
}

impl DisplayTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, observation: &Observation) -> Option<DisplayState> {
        if let Observation::Invalid(raw) = observation {
            warn!(raw = %raw, "display enumeration returned an invalid id, treating as disconnected");
        }
        let next = DisplayState::from_observation(observation);
        match &self.published {
            Some(prev) if !next.supersedes(prev) => None,
            _ => {
                self.published = Some(next.clone());
                Some(next)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dumpsys_field() {
        assert_eq!(parse_enumeration(Some("mDisplayId=2\n")), Observation::Connected(2));
    }

    #[test]
    fn parses_bare_id() {
        assert_eq!(parse_enumeration(Some("  7 \n")), Observation::Connected(7));
    }

    #[test]
    fn blank_or_failed_is_disconnected() {
        assert_eq!(parse_enumeration(Some("")), Observation::Disconnected);
        assert_eq!(parse_enumeration(Some(" \n\n")), Observation::Disconnected);
        assert_eq!(parse_enumeration(None), Observation::Disconnected);
    }

    #[test]
    fn primary_display_is_disconnected() {
        assert_eq!(parse_enumeration(Some("0")), Observation::Disconnected);
    }

    #[test]
    fn corrupted_id_is_invalid() {
        assert_eq!(
            parse_enumeration(Some("mDisplayId=abc")),
            Observation::Invalid("abc".to_string())
        );
    }

    #[test]
    fn invalid_publishes_as_disconnected_with_error() {
        let mut tracker = DisplayTracker::new();
        tracker.observe(&Observation::Connected(2));
        let state = tracker
            .observe(&Observation::Invalid("abc".to_string()))
            .unwrap();
        assert!(!state.connected);
        assert_eq!(state.display_id, None);
        assert!(state.last_error.unwrap().contains("abc"));
    }

    #[test]
    fn repeats_are_suppressed() {
        let mut tracker = DisplayTracker::new();
        assert_eq!(
            tracker.observe(&Observation::Disconnected),
            Some(DisplayState::disconnected())
        );
        assert_eq!(tracker.observe(&Observation::Disconnected), None);
        assert_eq!(
            tracker.observe(&Observation::Connected(2)),
            Some(DisplayState::connected(2))
        );
        assert_eq!(tracker.observe(&Observation::Connected(2)), None);
        assert_eq!(
            tracker.observe(&Observation::Connected(3)),
            Some(DisplayState::connected(3))
        );
        // Invalid after disconnect is the same target: not republished.
        tracker.observe(&Observation::Disconnected);
        assert_eq!(tracker.observe(&Observation::Invalid("x".into())), None);
    }

    #[test]
    fn clean_reading_clears_published_error() {
        let mut tracker = DisplayTracker::new();
        tracker.observe(&Observation::Connected(2));
        assert!(tracker.observe(&Observation::Invalid("abc".into())).is_some());
        assert_eq!(
            tracker.observe(&Observation::Disconnected),
            Some(DisplayState::disconnected())
        );
        assert_eq!(tracker.observe(&Observation::Disconnected), None);
    }

    #[test]
    fn publishes_iff_target_changes() {
        let sequence = [
            Observation::Connected(1),
            Observation::Connected(1),
            Observation::Disconnected,
            Observation::Invalid("?".into()),
            Observation::Connected(4),
            Observation::Invalid("?".into()),
            Observation::Disconnected,
            Observation::Connected(5),
            Observation::Connected(5),
            Observation::Disconnected,
            Observation::Disconnected,
        ];
        let mut tracker = DisplayTracker::new();
        let mut last: Option<DisplayState> = None;
        for obs in &sequence {
            let candidate = DisplayState::from_observation(obs);
            let expect_publish = last.as_ref().is_none_or(|l| candidate.supersedes(l));
            let published = tracker.observe(obs);
            assert_eq!(published.is_some(), expect_publish, "at {obs:?}");
            if let Some(p) = published {
                assert!(p.connected || p.display_id.is_none());
                last = Some(p);
            }
        }
    }
}
