//! Scoring engine for Quizlive.
//!
//! Everything in this crate is a pure function: no I/O, no clocks, no
//! shared state. The gameplay engine hands in what it observed (was the
//! answer correct, how long did it take, what is the streak now) and gets
//! back a deterministic number of points.
//!
//! - [`score_answer`]: points for a single answer ([`ScoreBreakdown`])
//! - [`speed_bonus`] / [`combo_multiplier`]: the two components
//! - [`rewards_for`]: end-of-game grants by final rank and score

mod points;
mod rewards;

pub use points::{
    accuracy, combo_multiplier, score_answer, speed_bonus, ScoreBreakdown,
    BASE_POINTS, COMBO_STEP, MAX_COMBO_MULTIPLIER, MAX_SPEED_BONUS,
};
pub use rewards::{rewards_for, Rewards};
