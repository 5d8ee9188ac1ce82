//! Engine-wide timing and sizing.

use std::time::Duration;

use quizlive_store::env_parse;

/// Process-wide settings for every room actor.
///
/// Per-room choices (player cap, question time limit, ...) live in
/// [`RoomSettings`](quizlive_protocol::RoomSettings) instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Length of the pre-game countdown, in seconds.
    pub countdown_secs: u32,

    /// Pause between a question timing out and its results.
    pub timeout_grace: Duration,

    /// How long results stay on screen before moving on.
    pub results_display: Duration,

    /// Length of the "get ready" interstitial, in seconds.
    pub get_ready_secs: u32,

    /// Rows included in leaderboard broadcasts.
    pub leaderboard_top_n: usize,

    /// Close a question as soon as every connected player has answered.
    pub end_early: bool,

    /// Capacity of each room's command channel.
    pub channel_size: usize,

    /// How long a finished room stays addressable before its actor stops.
    pub finished_linger: Duration,

    /// Attempts at finding an unused room code before giving up.
    pub code_attempts: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 3,
            timeout_grace: Duration::from_secs(2),
            results_display: Duration::from_secs(5),
            get_ready_secs: 3,
            leaderboard_top_n: 10,
            end_early: true,
            channel_size: 64,
            finished_linger: Duration::from_secs(30),
            code_attempts: 16,
        }
    }
}

impl EngineConfig {
    /// Reads `QUIZLIVE_*` overrides, keeping the default for anything
    /// unset or unparsable.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            countdown_secs: env_parse("QUIZLIVE_COUNTDOWN_SECS", d.countdown_secs),
            timeout_grace: Duration::from_millis(env_parse(
                "QUIZLIVE_TIMEOUT_GRACE_MS",
                d.timeout_grace.as_millis() as u64,
            )),
            results_display: Duration::from_millis(env_parse(
                "QUIZLIVE_RESULTS_DISPLAY_MS",
                d.results_display.as_millis() as u64,
            )),
            get_ready_secs: env_parse("QUIZLIVE_GET_READY_SECS", d.get_ready_secs),
            leaderboard_top_n: env_parse("QUIZLIVE_LEADERBOARD_TOP_N", d.leaderboard_top_n),
            end_early: env_parse("QUIZLIVE_END_EARLY", d.end_early),
            channel_size: env_parse("QUIZLIVE_ROOM_CHANNEL_SIZE", d.channel_size).max(1),
            finished_linger: Duration::from_secs(env_parse(
                "QUIZLIVE_FINISHED_LINGER_SECS",
                d.finished_linger.as_secs(),
            )),
            code_attempts: env_parse("QUIZLIVE_CODE_ATTEMPTS", d.code_attempts).max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let config = EngineConfig::default();
        assert_eq!(config.countdown_secs, 3);
        assert_eq!(config.timeout_grace, Duration::from_secs(2));
        assert_eq!(config.results_display, Duration::from_secs(5));
        assert_eq!(config.get_ready_secs, 3);
        assert_eq!(config.leaderboard_top_n, 10);
        assert!(config.end_early);
    }
}
