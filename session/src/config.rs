//! Session tuning knobs.

use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

/// Smallest and largest supported session sizes.
pub const MIN_PEERS: usize = 2;
pub const MAX_PEERS: usize = 4;

/// Session configuration shared by every peer.
///
/// Countdowns are expressed in ticks so that they never depend on wall-clock
/// frame timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of peers the session waits for before it starts.
    pub expected_peers: usize,
    /// Fixed simulation rate.
    pub tick_hz: u32,
    /// Build phase fallback countdown.
    pub build_countdown_ticks: u32,
    /// Per-round cap on the move phase.
    pub move_cap_ticks: u32,
    /// How long the scoreboard is shown between rounds.
    pub scoreboard_ticks: u32,
    /// Total score that ends the session in victory.
    pub win_score: u32,
    /// Cadence of authoritative body resyncs from owners.
    pub resync_interval_ticks: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expected_peers: 2,
            tick_hz: 60,
            build_countdown_ticks: 60 * 60,
            move_cap_ticks: 90 * 60,
            scoreboard_ticks: 5 * 60,
            win_score: 15,
            resync_interval_ticks: 6,
        }
    }
}

impl SessionConfig {
    /// Creates a config suitable for testing with short countdowns.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            expected_peers: 2,
            tick_hz: 60,
            build_countdown_ticks: 30,
            move_cap_ticks: 120,
            scoreboard_ticks: 5,
            win_score: 15,
            resync_interval_ticks: 2,
        }
    }

    /// Fixed step handed to the physics collaborator.
    #[must_use]
    pub fn tick_seconds(&self) -> f32 {
        1.0 / self.tick_hz.max(1) as f32
    }

    /// Rejects configurations the phase machine cannot run.
    pub fn validate(&self) -> SessionResult<()> {
        let reason = if !(MIN_PEERS..=MAX_PEERS).contains(&self.expected_peers) {
            "expected_peers must be between 2 and 4"
        } else if self.tick_hz == 0 {
            "tick_hz must be positive"
        } else if self.build_countdown_ticks == 0
            || self.move_cap_ticks == 0
            || self.scoreboard_ticks == 0
        {
            "countdowns must be at least one tick"
        } else if self.resync_interval_ticks == 0 {
            "resync_interval_ticks must be positive"
        } else if self.win_score == 0 {
            "win_score must be positive"
        } else {
            return Ok(());
        };
        Err(SessionError::InvalidConfig { reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SessionConfig::default();
        config.validate().unwrap();
        assert_eq!(config.expected_peers, 2);
        assert_eq!(config.win_score, 15);
    }

    #[test]
    fn testing_config_has_shorter_countdowns() {
        let test = SessionConfig::for_testing();
        let default = SessionConfig::default();
        test.validate().unwrap();
        assert!(test.build_countdown_ticks < default.build_countdown_ticks);
        assert!(test.scoreboard_ticks < default.scoreboard_ticks);
    }

    #[test]
    fn validate_rejects_bad_peer_counts() {
        for expected_peers in [0, 1, 5] {
            let config = SessionConfig {
                expected_peers,
                ..SessionConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(SessionError::InvalidConfig { .. })
            ));
        }
    }

    #[test]
    fn validate_rejects_zero_countdown() {
        let config = SessionConfig {
            move_cap_ticks: 0,
            ..SessionConfig::for_testing()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "expected_peers": 3, "win_score": 9 }"#).unwrap();
        assert_eq!(config.expected_peers, 3);
        assert_eq!(config.win_score, 9);
        assert_eq!(config.tick_hz, SessionConfig::default().tick_hz);
    }

    #[test]
    fn tick_seconds_matches_rate() {
        let config = SessionConfig::default();
        assert!((config.tick_seconds() - 1.0 / 60.0).abs() < f32::EPSILON);
    }
}
