//! The quiz loop as plain functions over a [`SessionAggregate`].
//!
//! Nothing here touches timers or channels. The room actor decides *when*
//! each step runs; these functions decide *what* it does to the aggregate
//! and which events come out. That keeps the rules testable without a
//! runtime.

use std::cmp::Ordering;
use std::time::Duration;

use quizlive_protocol::{
    AnswerPayload, AnswerStats, FinalStanding, PlayerId, Question, QuestionId,
    QuestionResult, RoomStatus, ServerEvent,
};
use quizlive_scoring::{rewards_for, score_answer};
use quizlive_store::{
    AnswerSubmission, GameResult, LeaderboardEntry, PlayerTotals, SessionAggregate,
};

use crate::answer::{check_shape, is_correct};
use crate::RoomError;

/// Loads the question list and resets the game bookkeeping.
///
/// Every connected player starts on the leaderboard with zero points;
/// players who join later are added on their first answer.
pub fn initialize(agg: &mut SessionAggregate, questions: Vec<Question>) {
    agg.questions = questions;
    agg.current_index = 0;
    agg.reset_question_state();
    agg.leaderboard = agg
        .players
        .values()
        .filter(|p| p.connected)
        .map(|p| LeaderboardEntry::new(p.id, p.display_name.clone()))
        .collect();
    agg.rerank();
}

/// Opens the current question for answers.
///
/// Returns the `question_new` event and the time limit in seconds, or
/// `None` when every question has been asked.
pub fn open_question(agg: &mut SessionAggregate, now_ms: u64) -> Option<(ServerEvent, u32)> {
    agg.reset_question_state();
    let opened = question_event(agg)?;
    agg.question_started_at_ms = Some(now_ms);
    agg.accepting_answers = true;
    Some(opened)
}

/// The `question_new` event for the current question, without touching
/// any state. Used to catch up late joiners and rehydrated rooms.
pub fn question_event(agg: &SessionAggregate) -> Option<(ServerEvent, u32)> {
    let question = agg.current_question()?;
    let limit = agg.time_limit_secs(question);
    let event = ServerEvent::QuestionNew {
        index: agg.current_index,
        total: agg.questions.len(),
        question: question.to_public(limit),
    };
    Some((event, limit))
}

/// Stops taking answers. Returns `false` if intake was already closed.
pub fn close_intake(agg: &mut SessionAggregate) -> bool {
    std::mem::replace(&mut agg.accepting_answers, false)
}

/// Everything produced by one accepted answer.
#[derive(Debug, Clone)]
pub struct AcceptedAnswer {
    /// Private reply for the player who answered.
    pub result: QuestionResult,
    /// Broadcast to the room.
    pub leaderboard: ServerEvent,
    pub submission: AnswerSubmission,
    pub totals: PlayerTotals,
}

/// Validates, grades, and scores an answer.
///
/// # Errors
/// In order of checking: [`RoomError::PlayerNotFound`],
/// [`RoomError::InvalidState`] while paused, [`RoomError::NoActiveQuestion`],
/// [`RoomError::QuestionMismatch`], [`RoomError::TimingViolation`],
/// [`RoomError::AlreadyAnswered`], [`RoomError::InvalidPayload`].
/// A rejected answer leaves the aggregate untouched.
pub fn submit_answer(
    agg: &mut SessionAggregate,
    player_id: PlayerId,
    question_id: QuestionId,
    answer: AnswerPayload,
    elapsed_ms: u64,
    top_n: usize,
    now_ms: u64,
) -> Result<AcceptedAnswer, RoomError> {
    if agg.player(player_id).is_none() {
        return Err(RoomError::PlayerNotFound(player_id));
    }
    if agg.status() == RoomStatus::Paused {
        return Err(RoomError::InvalidState("the game is paused".into()));
    }
    let question = match agg.current_question() {
        Some(q) if agg.status() == RoomStatus::Active && agg.question_started_at_ms.is_some() => q,
        _ => return Err(RoomError::NoActiveQuestion),
    };
    if question.id != question_id {
        return Err(RoomError::QuestionMismatch { got: question_id });
    }
    let limit_secs = agg.time_limit_secs(question);
    let limit = Duration::from_secs(u64::from(limit_secs));
    let elapsed = Duration::from_millis(elapsed_ms);
    if !agg.accepting_answers {
        return Err(RoomError::TimingViolation("answers are closed".into()));
    }
    if elapsed >= limit {
        return Err(RoomError::TimingViolation(format!(
            "answered after {elapsed_ms} ms, limit is {limit_secs} s"
        )));
    }
    if agg.answered.contains(&player_id) {
        return Err(RoomError::AlreadyAnswered(player_id, question_id));
    }
    check_shape(question.kind, &answer)?;

    let correct = is_correct(question, &answer);
    let tally_keys = answer.tally_keys(correct, question.options.len());
    let show_leaderboard = agg.room.settings.show_leaderboard;

    let entry = agg.entry_mut_or_insert(player_id);
    let streak_after = if correct { entry.streak + 1 } else { 0 };
    let breakdown = score_answer(correct, elapsed, limit, streak_after);
    entry.record(correct, breakdown.total);

    agg.answered.insert(player_id);
    if correct {
        agg.correct_count += 1;
    }
    for key in tally_keys {
        *agg.tally.entry(key).or_insert(0) += 1;
    }
    agg.rerank();

    let entry = agg
        .entry(player_id)
        .cloned()
        .unwrap_or_else(|| LeaderboardEntry::new(player_id, String::new()));
    let result = QuestionResult {
        question_id,
        correct,
        breakdown,
        total_score: entry.score,
        streak: entry.streak,
        rank: entry.rank,
    };
    let leaderboard = ServerEvent::LeaderboardUpdated {
        question_id,
        answered: agg.answered.len(),
        total: agg.connected_count(),
        top: if show_leaderboard {
            agg.top_rows(top_n)
        } else {
            Vec::new()
        },
    };
    let submission = AnswerSubmission {
        room: agg.code().clone(),
        player_id,
        user_id: agg.player(player_id).and_then(|p| p.user_id.clone()),
        question_id,
        answer,
        elapsed_ms,
        correct,
        breakdown,
        submitted_at_ms: now_ms,
    };
    let totals = PlayerTotals {
        room: agg.code().clone(),
        player_id,
        user_id: submission.user_id.clone(),
        score: entry.score,
        correct: entry.correct,
        answered: entry.answered,
        streak: entry.streak,
        max_streak: entry.max_streak,
        updated_at_ms: now_ms,
    };

    Ok(AcceptedAnswer {
        result,
        leaderboard,
        submission,
        totals,
    })
}

/// Whether every connected player has answered the current question.
pub fn all_answered(agg: &SessionAggregate) -> bool {
    let connected = agg.connected_ids();
    !connected.is_empty() && connected.iter().all(|id| agg.answered.contains(id))
}

/// The `question_results` event for the current question.
pub fn question_results(agg: &SessionAggregate, top_n: usize) -> Option<ServerEvent> {
    let question = agg.current_question()?;
    let answered = agg.answered.len() as u32;
    let accuracy_pct = if answered == 0 {
        0
    } else {
        (f64::from(agg.correct_count) * 100.0 / f64::from(answered)).round() as u32
    };
    let stats = AnswerStats {
        answered,
        correct: agg.correct_count,
        participants: agg.connected_count() as u32,
        accuracy_pct,
        distribution: agg.tally.clone(),
    };
    let leaderboard = if agg.room.settings.show_leaderboard {
        agg.top_rows(top_n)
    } else {
        Vec::new()
    };
    Some(ServerEvent::QuestionResults {
        question_id: question.id,
        correct_answer: question.correct.clone(),
        explanation: question.explanation.clone(),
        stats,
        leaderboard,
    })
}

/// Moves to the next question. Returns `true` if there is one.
pub fn advance(agg: &mut SessionAggregate) -> bool {
    agg.reset_question_state();
    agg.current_index += 1;
    agg.current_index < agg.questions.len()
}

/// Orders entries for the final standings: score, accuracy, current
/// streak and max streak (all descending), then player id.
pub fn final_order(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| b.accuracy().total_cmp(&a.accuracy()))
        .then_with(|| b.streak.cmp(&a.streak))
        .then_with(|| b.max_streak.cmp(&a.max_streak))
        .then_with(|| a.player_id.cmp(&b.player_id))
}

/// Ends the game: final ranking, rewards, one [`GameResult`] per player.
///
/// Connected players who never answered still get a (zero) result.
pub fn finish(agg: &mut SessionAggregate, now_ms: u64) -> (ServerEvent, Vec<GameResult>) {
    agg.reset_question_state();
    for id in agg.connected_ids() {
        agg.entry_mut_or_insert(id);
    }
    agg.leaderboard.sort_by(final_order);
    for (i, entry) in agg.leaderboard.iter_mut().enumerate() {
        entry.rank = i as u32 + 1;
    }
    agg.room.status = RoomStatus::Finished;
    agg.room.paused_from = None;

    let mut standings = Vec::with_capacity(agg.leaderboard.len());
    let mut results = Vec::with_capacity(agg.leaderboard.len());
    for entry in &agg.leaderboard {
        let rewards = rewards_for(entry.rank, entry.score);
        let accuracy = entry.accuracy();
        standings.push(FinalStanding {
            rank: entry.rank,
            player_id: entry.player_id,
            display_name: entry.display_name.clone(),
            score: entry.score,
            accuracy,
            max_streak: entry.max_streak,
            rewards,
        });
        results.push(GameResult {
            room: agg.room.code.clone(),
            player_id: entry.player_id,
            user_id: agg.player(entry.player_id).and_then(|p| p.user_id.clone()),
            display_name: entry.display_name.clone(),
            rank: entry.rank,
            score: entry.score,
            accuracy,
            max_streak: entry.max_streak,
            rewards,
            finished_at_ms: now_ms,
        });
    }

    (ServerEvent::GameFinished { standings }, results)
}
