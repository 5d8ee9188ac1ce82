//! Per-answer points: base + speed bonus, scaled by the streak combo.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Points awarded for any correct answer before bonuses.
pub const BASE_POINTS: u32 = 1000;

/// Bonus for an instant answer. Decays linearly to 0 at the time limit.
pub const MAX_SPEED_BONUS: u32 = 500;

/// Extra multiplier per consecutive correct answer after the first.
pub const COMBO_STEP: f64 = 0.1;

/// Upper bound on the combo multiplier.
pub const MAX_COMBO_MULTIPLIER: f64 = 2.0;

/// How a single answer's points were computed.
///
/// Sent back to the player who answered and written to the answer history,
/// so the numbers on screen can always be reconciled with the log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Base points (0 for an incorrect answer).
    pub base: u32,
    /// Speed bonus in `0..=MAX_SPEED_BONUS` (0 for an incorrect answer).
    pub speed_bonus: u32,
    /// Combo multiplier applied to `base + speed_bonus`.
    pub multiplier: f64,
    /// Final points credited to the player.
    pub total: u32,
}

impl ScoreBreakdown {
    /// The breakdown for an incorrect answer.
    pub fn zero() -> Self {
        Self {
            base: 0,
            speed_bonus: 0,
            multiplier: 1.0,
            total: 0,
        }
    }
}

/// Linear speed bonus: `round(500 * (1 - elapsed/limit))`, clamped to
/// `[0, 500]`.
///
/// A zero `limit` yields no bonus rather than dividing by zero.
pub fn speed_bonus(elapsed: Duration, limit: Duration) -> u32 {
    if limit.is_zero() || elapsed >= limit {
        return 0;
    }
    let ratio = elapsed.as_secs_f64() / limit.as_secs_f64();
    let max = f64::from(MAX_SPEED_BONUS);
    (max * (1.0 - ratio)).round().clamp(0.0, max) as u32
}

/// Combo multiplier for a streak that already includes the current answer.
///
/// ```text
/// streak:     0/1   2     3     ...   11+
/// multiplier: 1.0   1.1   1.2   ...   2.0
/// ```
pub fn combo_multiplier(streak: u32) -> f64 {
    if streak <= 1 {
        return 1.0;
    }
    (1.0 + f64::from(streak - 1) * COMBO_STEP).min(MAX_COMBO_MULTIPLIER)
}

/// Scores one answer.
///
/// `streak_after` is the player's streak *after* this answer is counted,
/// so the second correct answer in a row is scored with a streak of 2.
pub fn score_answer(
    correct: bool,
    elapsed: Duration,
    limit: Duration,
    streak_after: u32,
) -> ScoreBreakdown {
    if !correct {
        return ScoreBreakdown::zero();
    }
    let bonus = speed_bonus(elapsed, limit);
    let multiplier = combo_multiplier(streak_after);
    let total = (f64::from(BASE_POINTS + bonus) * multiplier).round() as u32;
    ScoreBreakdown {
        base: BASE_POINTS,
        speed_bonus: bonus,
        multiplier,
        total,
    }
}

/// Fraction of answered questions that were correct, in `0.0..=1.0`.
pub fn accuracy(correct: u32, answered: u32) -> f64 {
    if answered == 0 {
        0.0
    } else {
        f64::from(correct) / f64::from(answered)
    }
}
