//! Room lifecycle, per-room settings, and the read models sent to clients.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{PlayerId, QuestionId, RoomCode};
use quizlive_scoring::{Rewards, ScoreBreakdown};

// ---------------------------------------------------------------------------
// RoomSettings
// ---------------------------------------------------------------------------

/// Host-chosen configuration for one room.
///
/// Every field has a default, so `{}` is a valid settings object on the
/// wire and hosts only send what they want to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomSettings {
    /// Maximum number of *connected* players.
    pub max_players: usize,

    /// Whether brand-new players may join after the game has started.
    pub late_join_allowed: bool,

    /// Default time limit for questions that don't declare their own.
    pub question_time_limit_secs: u32,

    /// Whether players see the running leaderboard between answers.
    pub show_leaderboard: bool,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            max_players: 50,
            late_join_allowed: true,
            question_time_limit_secs: 20,
            show_leaderboard: true,
        }
    }
}

/// Who may join a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Anyone with the code.
    #[default]
    Open,
    /// Only the pre-provisioned roster.
    Closed,
}

// ---------------------------------------------------------------------------
// RoomStatus
// ---------------------------------------------------------------------------

/// The lifecycle state of a room.
///
/// ```text
/// Lobby → Starting → Active → Finished
///            ↕          ↕
///          Paused ←─────┘
/// ```
///
/// - **Lobby**: accepting joins, players toggling ready.
/// - **Starting**: questions loaded, pre-game countdown running.
/// - **Active**: the question loop is running.
/// - **Paused**: the host dropped mid-game; nothing ticks until the host
///   resumes. The room remembers which state it paused from.
/// - **Finished**: final results are out. Terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Lobby,
    Starting,
    Active,
    Paused,
    Finished,
}

impl RoomStatus {
    /// Returns `true` once the game has left the lobby and hasn't ended.
    pub fn is_in_game(self) -> bool {
        matches!(self, Self::Starting | Self::Active | Self::Paused)
    }

    /// Returns `true` if `target` is a legal next state.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Lobby, Self::Starting)
                | (Self::Starting, Self::Active)
                | (Self::Starting, Self::Paused)
                | (Self::Paused, Self::Starting)
                | (Self::Active, Self::Paused)
                | (Self::Paused, Self::Active)
                | (Self::Starting, Self::Finished)
                | (Self::Active, Self::Finished)
        )
    }
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lobby => write!(f, "lobby"),
            Self::Starting => write!(f, "starting"),
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// What other participants see about a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub display_name: String,
    pub avatar: String,
    pub connected: bool,
    pub ready: bool,
}

/// One row of the running leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub rank: u32,
    pub player_id: PlayerId,
    pub display_name: String,
    pub score: u64,
    pub streak: u32,
    pub correct: u32,
    pub answered: u32,
}

/// Aggregate answer statistics for the question just closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerStats {
    pub answered: u32,
    pub correct: u32,
    /// Players who were eligible to answer.
    pub participants: u32,
    /// `correct / answered` as a whole percentage.
    pub accuracy_pct: u32,
    /// How many times each option (or normalized answer) was submitted.
    pub distribution: BTreeMap<String, u32>,
}

/// The private reply to a player's accepted answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: QuestionId,
    pub correct: bool,
    pub breakdown: ScoreBreakdown,
    pub total_score: u64,
    pub streak: u32,
    pub rank: u32,
}

/// A player's line in the final results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalStanding {
    pub rank: u32,
    pub player_id: PlayerId,
    pub display_name: String,
    pub score: u64,
    /// `correct / answered`, in `0.0..=1.0`.
    pub accuracy: f64,
    pub max_streak: u32,
    pub rewards: Rewards,
}

/// Public, unauthenticated summary used by the join screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub code: RoomCode,
    pub title: String,
    pub host_name: String,
    pub status: RoomStatus,
    pub player_count: usize,
    pub used_avatars: Vec<String>,
}

/// Full room state for the host dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomStateView {
    pub summary: RoomSummary,
    pub settings: RoomSettings,
    pub access_mode: AccessMode,
    pub players: Vec<PlayerView>,
    pub current_index: usize,
    pub total_questions: usize,
    pub leaderboard: Vec<LeaderboardRow>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_status_forward_path_is_legal() {
        assert!(RoomStatus::Lobby.can_transition_to(RoomStatus::Starting));
        assert!(RoomStatus::Starting.can_transition_to(RoomStatus::Active));
        assert!(RoomStatus::Active.can_transition_to(RoomStatus::Finished));
    }

    #[test]
    fn test_room_status_pause_round_trip_is_legal() {
        assert!(RoomStatus::Active.can_transition_to(RoomStatus::Paused));
        assert!(RoomStatus::Paused.can_transition_to(RoomStatus::Active));
    }

    #[test]
    fn test_room_status_skips_are_illegal() {
        assert!(!RoomStatus::Lobby.can_transition_to(RoomStatus::Active));
        assert!(!RoomStatus::Finished.can_transition_to(RoomStatus::Lobby));
        assert!(!RoomStatus::Lobby.can_transition_to(RoomStatus::Paused));
        assert!(!RoomStatus::Finished.can_transition_to(RoomStatus::Active));
    }

    #[test]
    fn test_room_status_is_in_game() {
        assert!(!RoomStatus::Lobby.is_in_game());
        assert!(RoomStatus::Starting.is_in_game());
        assert!(RoomStatus::Active.is_in_game());
        assert!(RoomStatus::Paused.is_in_game());
        assert!(!RoomStatus::Finished.is_in_game());
    }

    #[test]
    fn test_room_status_display() {
        assert_eq!(RoomStatus::Lobby.to_string(), "lobby");
        assert_eq!(RoomStatus::Paused.to_string(), "paused");
    }

    #[test]
    fn test_room_settings_default() {
        let settings = RoomSettings::default();
        assert_eq!(settings.max_players, 50);
        assert!(settings.late_join_allowed);
        assert_eq!(settings.question_time_limit_secs, 20);
        assert!(settings.show_leaderboard);
    }

    #[test]
    fn test_room_settings_partial_json_uses_defaults() {
        let settings: RoomSettings =
            serde_json::from_str(r#"{"max_players": 4}"#).unwrap();
        assert_eq!(settings.max_players, 4);
        assert!(settings.late_join_allowed);
    }

    #[test]
    fn test_access_mode_default_is_open() {
        assert_eq!(AccessMode::default(), AccessMode::Open);
    }
}
