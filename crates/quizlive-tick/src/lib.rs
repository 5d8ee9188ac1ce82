//! Timers for Quizlive room actors.
//!
//! A quiz room needs two kinds of clock:
//!
//! - a [`Countdown`] that ticks once per second and reports how many
//!   seconds are left (the pre-game countdown, the per-question timer);
//! - an [`Alarm`] that fires once after a fixed delay (timeout grace,
//!   results display, the get-ready interstitial, the finished linger).
//!
//! Both are plain fields of the actor, never shared and never serialized.
//! Starting a countdown or setting an alarm replaces whatever was running,
//! so a room can never have two question timers at once.
//!
//! # Integration
//!
//! Both sit inside the room actor's `tokio::select!` loop. Their wait
//! futures pend forever while idle or paused, so `select!` simply keeps
//! serving the other branches:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         tick = countdown.wait_for_tick() => { /* timer_tick */ }
//!         phase = alarm.wait() => { /* advance the game */ }
//!     }
//! }
//! ```
//!
//! The wait futures are cancel-safe: no state changes until the deadline
//! has actually passed, so losing a `select!` race never drops a tick.

mod alarm;
mod countdown;

pub use alarm::Alarm;
pub use countdown::{Countdown, CountdownTick};
