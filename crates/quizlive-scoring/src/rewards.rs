//! End-of-game reward grants.
//!
//! The exact numbers are a game-design knob. What the rest of the system
//! relies on is the shape: 1st > 2nd > 3rd > 4th–10th > everyone else at
//! the same score, and a higher score never earns less at the same rank.

use serde::{Deserialize, Serialize};

/// Currency-style grants handed out when a game finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rewards {
    pub xp: u32,
    pub coins: u32,
    pub trophies: u32,
}

impl Rewards {
    const fn new(xp: u32, coins: u32, trophies: u32) -> Self {
        Self { xp, coins, trophies }
    }

    fn plus(self, other: Rewards) -> Rewards {
        Rewards {
            xp: self.xp + other.xp,
            coins: self.coins + other.coins,
            trophies: self.trophies + other.trophies,
        }
    }
}

const PODIUM: [Rewards; 3] = [
    Rewards::new(500, 100, 3),
    Rewards::new(350, 75, 2),
    Rewards::new(250, 50, 1),
];
const TOP_TEN: Rewards = Rewards::new(120, 25, 0);
const PARTICIPATION: Rewards = Rewards::new(50, 10, 0);

/// Score thresholds, highest first. Only the first matching tier applies.
const SCORE_BONUSES: [(u64, Rewards); 3] = [
    (10_000, Rewards::new(200, 40, 0)),
    (5_000, Rewards::new(100, 20, 0)),
    (2_000, Rewards::new(40, 10, 0)),
];

/// Rewards for a final `rank` (1-based) and final `score`.
pub fn rewards_for(rank: u32, score: u64) -> Rewards {
    let by_rank = match rank {
        1..=3 => PODIUM[(rank - 1) as usize],
        4..=10 => TOP_TEN,
        _ => PARTICIPATION,
    };
    let by_score = SCORE_BONUSES
        .iter()
        .find(|(threshold, _)| score >= *threshold)
        .map(|(_, bonus)| *bonus)
        .unwrap_or_default();
    by_rank.plus(by_score)
}
