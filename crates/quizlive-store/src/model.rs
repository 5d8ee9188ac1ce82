//! The session aggregate and the rows written to history.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use quizlive_protocol::{
    AccessMode, AnswerPayload, LeaderboardRow, PlayerId, PlayerView,
    Question, QuestionId, QuestionSetId, RoomCode, RoomSettings,
    RoomStateView, RoomStatus, RoomSummary, RosterId, UserId,
};
use quizlive_scoring::{Rewards, ScoreBreakdown};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Canonical form used to compare display names: trimmed, internal
/// whitespace collapsed to one space, lowercased.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ---------------------------------------------------------------------------
// Room and players
// ---------------------------------------------------------------------------

/// Who created the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub user_id: Option<UserId>,
    pub display_name: String,
}

/// Room-level facts, fixed at creation except for `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub code: RoomCode,
    pub question_set_id: QuestionSetId,
    pub title: String,
    pub host: HostInfo,
    pub access_mode: AccessMode,
    #[serde(default)]
    pub roster_id: Option<RosterId>,
    pub status: RoomStatus,
    /// The status to return to when a paused room resumes.
    #[serde(default)]
    pub paused_from: Option<RoomStatus>,
    pub settings: RoomSettings,
    pub created_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub user_id: Option<UserId>,
    pub display_name: String,
    pub avatar: String,
    pub connected: bool,
    pub ready: bool,
    pub joined_at_ms: u64,
    /// Pre-provisioned from a closed roster and not yet claimed.
    pub placeholder: bool,
}

impl Player {
    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id,
            display_name: self.display_name.clone(),
            avatar: self.avatar.clone(),
            connected: self.connected,
            ready: self.ready,
        }
    }

    pub fn normalized_name(&self) -> String {
        normalize_name(&self.display_name)
    }
}

/// A player's running totals for the current game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub player_id: PlayerId,
    pub display_name: String,
    pub score: u64,
    pub streak: u32,
    pub max_streak: u32,
    pub correct: u32,
    pub answered: u32,
    pub rank: u32,
}

impl LeaderboardEntry {
    /// A zeroed entry.
    pub fn new(player_id: PlayerId, display_name: impl Into<String>) -> Self {
        Self {
            player_id,
            display_name: display_name.into(),
            score: 0,
            streak: 0,
            max_streak: 0,
            correct: 0,
            answered: 0,
            rank: 0,
        }
    }

    /// Applies one scored answer.
    pub fn record(&mut self, correct: bool, points: u32) {
        self.answered += 1;
        self.score += u64::from(points);
        if correct {
            self.correct += 1;
            self.streak += 1;
            self.max_streak = self.max_streak.max(self.streak);
        } else {
            self.streak = 0;
        }
    }

    pub fn accuracy(&self) -> f64 {
        quizlive_scoring::accuracy(self.correct, self.answered)
    }

    pub fn row(&self) -> LeaderboardRow {
        LeaderboardRow {
            rank: self.rank,
            player_id: self.player_id,
            display_name: self.display_name.clone(),
            score: self.score,
            streak: self.streak,
            correct: self.correct,
            answered: self.answered,
        }
    }
}

// ---------------------------------------------------------------------------
// History rows
// ---------------------------------------------------------------------------

/// One accepted answer. Appended to history, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSubmission {
    pub room: RoomCode,
    pub player_id: PlayerId,
    pub user_id: Option<UserId>,
    pub question_id: QuestionId,
    pub answer: AnswerPayload,
    pub elapsed_ms: u64,
    pub correct: bool,
    pub breakdown: ScoreBreakdown,
    pub submitted_at_ms: u64,
}

/// Running totals for one (room, player). Upserted after every accepted
/// answer; the last write is the reconciliation record for the score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerTotals {
    pub room: RoomCode,
    pub player_id: PlayerId,
    pub user_id: Option<UserId>,
    pub score: u64,
    pub correct: u32,
    pub answered: u32,
    pub streak: u32,
    pub max_streak: u32,
    pub updated_at_ms: u64,
}

/// A player's final result. Written once, when the game finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameResult {
    pub room: RoomCode,
    pub player_id: PlayerId,
    pub user_id: Option<UserId>,
    pub display_name: String,
    pub rank: u32,
    pub score: u64,
    pub accuracy: f64,
    pub max_streak: u32,
    pub rewards: Rewards,
    pub finished_at_ms: u64,
}

// ---------------------------------------------------------------------------
// SessionAggregate
// ---------------------------------------------------------------------------

/// Everything a room knows, as one serializable value.
///
/// Owned by the room actor and mirrored to the cache after every mutation.
/// Live timers are not part of it; a rehydrated in-game room comes back
/// paused and restarts its timers when the host resumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAggregate {
    pub room: RoomRecord,
    pub players: BTreeMap<PlayerId, Player>,
    pub next_player_id: u64,
    pub questions: Vec<Question>,
    pub current_index: usize,
    pub question_started_at_ms: Option<u64>,
    pub accepting_answers: bool,
    /// Players who have answered the current question.
    pub answered: BTreeSet<PlayerId>,
    /// Correct answers to the current question.
    pub correct_count: u32,
    /// Per-option submission counts for the current question.
    pub tally: BTreeMap<String, u32>,
    /// Kept ranked: sorted by score, `rank` is 1-based position.
    pub leaderboard: Vec<LeaderboardEntry>,
}

impl SessionAggregate {
    pub fn new(room: RoomRecord) -> Self {
        Self {
            room,
            players: BTreeMap::new(),
            next_player_id: 1,
            questions: Vec::new(),
            current_index: 0,
            question_started_at_ms: None,
            accepting_answers: false,
            answered: BTreeSet::new(),
            correct_count: 0,
            tally: BTreeMap::new(),
            leaderboard: Vec::new(),
        }
    }

    pub fn code(&self) -> &RoomCode {
        &self.room.code
    }

    pub fn status(&self) -> RoomStatus {
        self.room.status
    }

    /// Hands out the next per-room player id.
    pub fn allocate_player_id(&mut self) -> PlayerId {
        let id = PlayerId(self.next_player_id);
        self.next_player_id += 1;
        id
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn connected_count(&self) -> usize {
        self.players.values().filter(|p| p.connected).count()
    }

    pub fn connected_ids(&self) -> Vec<PlayerId> {
        self.players
            .values()
            .filter(|p| p.connected)
            .map(|p| p.id)
            .collect()
    }

    pub fn player_views(&self) -> Vec<PlayerView> {
        self.players.values().map(Player::view).collect()
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    /// The time limit that applies to `question` in this room.
    pub fn time_limit_secs(&self, question: &Question) -> u32 {
        question
            .time_limit_secs
            .unwrap_or(self.room.settings.question_time_limit_secs)
    }

    pub fn entry(&self, id: PlayerId) -> Option<&LeaderboardEntry> {
        self.leaderboard.iter().find(|e| e.player_id == id)
    }

    /// The player's leaderboard entry, inserted with zero score if the
    /// player joined after the game started.
    pub fn entry_mut_or_insert(&mut self, id: PlayerId) -> &mut LeaderboardEntry {
        let position = match self.leaderboard.iter().position(|e| e.player_id == id) {
            Some(position) => position,
            None => {
                let name = self
                    .players
                    .get(&id)
                    .map(|p| p.display_name.clone())
                    .unwrap_or_default();
                self.leaderboard.push(LeaderboardEntry::new(id, name));
                self.leaderboard.len() - 1
            }
        };
        &mut self.leaderboard[position]
    }

    /// Re-sorts by score (descending, stable) and renumbers ranks.
    pub fn rerank(&mut self) {
        self.leaderboard.sort_by(|a, b| b.score.cmp(&a.score));
        for (i, entry) in self.leaderboard.iter_mut().enumerate() {
            entry.rank = i as u32 + 1;
        }
    }

    /// The first `n` leaderboard rows.
    pub fn top_rows(&self, n: usize) -> Vec<LeaderboardRow> {
        self.leaderboard.iter().take(n).map(LeaderboardEntry::row).collect()
    }

    /// Clears per-question bookkeeping before a new question opens.
    pub fn reset_question_state(&mut self) {
        self.answered.clear();
        self.correct_count = 0;
        self.tally.clear();
        self.question_started_at_ms = None;
        self.accepting_answers = false;
    }

    pub fn summary(&self) -> RoomSummary {
        let mut used_avatars: Vec<String> = self
            .players
            .values()
            .filter(|p| p.connected && !p.avatar.is_empty())
            .map(|p| p.avatar.clone())
            .collect();
        used_avatars.sort();
        used_avatars.dedup();
        RoomSummary {
            code: self.room.code.clone(),
            title: self.room.title.clone(),
            host_name: self.room.host.display_name.clone(),
            status: self.room.status,
            player_count: self.connected_count(),
            used_avatars,
        }
    }

    pub fn state_view(&self) -> RoomStateView {
        RoomStateView {
            summary: self.summary(),
            settings: self.room.settings.clone(),
            access_mode: self.room.access_mode,
            players: self.player_views(),
            current_index: self.current_index,
            total_questions: self.questions.len(),
            leaderboard: self.leaderboard.iter().map(LeaderboardEntry::row).collect(),
        }
    }

    /// Totals row for history, if the player has a leaderboard entry.
    pub fn totals_for(&self, id: PlayerId) -> Option<PlayerTotals> {
        let entry = self.entry(id)?;
        Some(PlayerTotals {
            room: self.room.code.clone(),
            player_id: id,
            user_id: self.players.get(&id).and_then(|p| p.user_id.clone()),
            score: entry.score,
            correct: entry.correct,
            answered: entry.answered,
            streak: entry.streak,
            max_streak: entry.max_streak,
            updated_at_ms: now_ms(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_room() -> RoomRecord {
        RoomRecord {
            code: RoomCode::parse("ABC234").unwrap(),
            question_set_id: QuestionSetId("geo".into()),
            title: "Geography".into(),
            host: HostInfo {
                user_id: Some(UserId("quizmaster".into())),
                display_name: "Ms. Frizzle".into(),
            },
            access_mode: AccessMode::Open,
            roster_id: None,
            status: RoomStatus::Lobby,
            paused_from: None,
            settings: RoomSettings::default(),
            created_at_ms: 0,
        }
    }

    fn add_player(agg: &mut SessionAggregate, name: &str, connected: bool) -> PlayerId {
        let id = agg.allocate_player_id();
        agg.players.insert(
            id,
            Player {
                id,
                user_id: None,
                display_name: name.into(),
                avatar: format!("{name}-fox"),
                connected,
                ready: false,
                joined_at_ms: 0,
                placeholder: false,
            },
        );
        id
    }

    // =====================================================================
    // normalize_name
    // =====================================================================

    #[test]
    fn test_normalize_name_trims_collapses_and_folds_case() {
        assert_eq!(normalize_name("  Ada   LOVELACE "), "ada lovelace");
        assert_eq!(normalize_name("ada\tlovelace"), "ada lovelace");
    }

    // =====================================================================
    // LeaderboardEntry
    // =====================================================================

    #[test]
    fn test_entry_record_correct_extends_streak() {
        let mut entry = LeaderboardEntry::new(PlayerId(1), "Ada");
        entry.record(true, 1500);
        entry.record(true, 1650);
        assert_eq!(entry.score, 3150);
        assert_eq!(entry.streak, 2);
        assert_eq!(entry.max_streak, 2);
        assert_eq!(entry.correct, 2);
        assert_eq!(entry.answered, 2);
    }

    #[test]
    fn test_entry_record_incorrect_resets_streak_keeps_max() {
        let mut entry = LeaderboardEntry::new(PlayerId(1), "Ada");
        entry.record(true, 1000);
        entry.record(true, 1100);
        entry.record(false, 0);
        assert_eq!(entry.streak, 0);
        assert_eq!(entry.max_streak, 2);
        assert_eq!(entry.score, 2100);
        assert_eq!(entry.answered, 3);
    }

    // =====================================================================
    // SessionAggregate
    // =====================================================================

    #[test]
    fn test_allocate_player_id_is_monotonic() {
        let mut agg = SessionAggregate::new(sample_room());
        assert_eq!(agg.allocate_player_id(), PlayerId(1));
        assert_eq!(agg.allocate_player_id(), PlayerId(2));
    }

    #[test]
    fn test_connected_count_ignores_disconnected() {
        let mut agg = SessionAggregate::new(sample_room());
        add_player(&mut agg, "Ada", true);
        add_player(&mut agg, "Bob", false);
        assert_eq!(agg.connected_count(), 1);
        assert_eq!(agg.summary().player_count, 1);
    }

    #[test]
    fn test_entry_mut_or_insert_adds_late_joiner_with_zero_score() {
        let mut agg = SessionAggregate::new(sample_room());
        let id = add_player(&mut agg, "Late", true);
        let entry = agg.entry_mut_or_insert(id);
        assert_eq!(entry.score, 0);
        assert_eq!(entry.display_name, "Late");
        assert_eq!(agg.leaderboard.len(), 1);
        agg.entry_mut_or_insert(id);
        assert_eq!(agg.leaderboard.len(), 1);
    }

    #[test]
    fn test_rerank_sorts_by_score_and_numbers_positions() {
        let mut agg = SessionAggregate::new(sample_room());
        let a = add_player(&mut agg, "Ada", true);
        let b = add_player(&mut agg, "Bob", true);
        agg.entry_mut_or_insert(a).record(true, 1000);
        agg.entry_mut_or_insert(b).record(true, 1400);
        agg.rerank();

        assert_eq!(agg.leaderboard[0].player_id, b);
        assert_eq!(agg.leaderboard[0].rank, 1);
        assert_eq!(agg.leaderboard[1].player_id, a);
        assert_eq!(agg.leaderboard[1].rank, 2);
    }

    #[test]
    fn test_time_limit_falls_back_to_room_setting() {
        let agg = SessionAggregate::new(sample_room());
        let question: Question = serde_json::from_value(serde_json::json!({
            "id": 1, "position": 0, "prompt": "?", "kind": "free_text",
            "correct": {"kind": "text", "value": "x"}
        }))
        .unwrap();
        assert_eq!(agg.time_limit_secs(&question), 20);

        let timed = Question {
            time_limit_secs: Some(45),
            ..question
        };
        assert_eq!(agg.time_limit_secs(&timed), 45);
    }

    #[test]
    fn test_summary_lists_distinct_connected_avatars() {
        let mut agg = SessionAggregate::new(sample_room());
        add_player(&mut agg, "Ada", true);
        add_player(&mut agg, "Bob", false);
        assert_eq!(agg.summary().used_avatars, vec!["Ada-fox".to_string()]);
    }

    #[test]
    fn test_aggregate_survives_json_round_trip() {
        let mut agg = SessionAggregate::new(sample_room());
        let id = add_player(&mut agg, "Ada", true);
        agg.answered.insert(id);
        agg.entry_mut_or_insert(id).record(true, 1200);

        let json = serde_json::to_string(&agg).unwrap();
        let back: SessionAggregate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, agg);
    }
}
