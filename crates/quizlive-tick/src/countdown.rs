//! One-second countdown with pause/resume.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace};

/// A tick reported by [`Countdown::wait_for_tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownTick<T> {
    /// The tag the countdown was started with.
    pub tag: T,
    /// Seconds left after this tick. `0` means the countdown just ended.
    pub remaining: u32,
}

impl<T> CountdownTick<T> {
    /// Whether this is the final tick.
    pub fn is_last(&self) -> bool {
        self.remaining == 0
    }
}

#[derive(Debug)]
struct Running<T> {
    tag: T,
    remaining: u32,
    next_tick: Instant,
    /// Time left until `next_tick`, captured when paused.
    frozen: Option<Duration>,
}

/// A cancellable countdown that ticks every `interval` (one second in
/// production) until it reaches zero.
///
/// The tag identifies what is being counted down, so a tick that belongs to
/// a countdown that has since been replaced can never be confused with the
/// current one.
#[derive(Debug)]
pub struct Countdown<T> {
    interval: Duration,
    running: Option<Running<T>>,
}

impl<T: Clone + std::fmt::Debug> Default for Countdown<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + std::fmt::Debug> Countdown<T> {
    /// A 1 Hz countdown.
    pub fn new() -> Self {
        Self::with_interval(Duration::from_secs(1))
    }

    /// A countdown with a custom tick interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            running: None,
        }
    }

    /// Starts counting down from `seconds`, replacing any running countdown.
    ///
    /// The first tick fires one interval from now and reports
    /// `seconds - 1`. Starting from zero fires a single final tick
    /// immediately.
    pub fn start(&mut self, tag: T, seconds: u32) {
        if let Some(old) = &self.running {
            debug!(old = ?old.tag, new = ?tag, "countdown replaced");
        }
        let next_tick = if seconds == 0 {
            Instant::now()
        } else {
            Instant::now() + self.interval
        };
        self.running = Some(Running {
            tag,
            remaining: seconds,
            next_tick,
            frozen: None,
        });
    }

    /// Stops the countdown. Returns the tag it was running with.
    pub fn cancel(&mut self) -> Option<T> {
        self.running.take().map(|r| r.tag)
    }

    /// Freezes the countdown. Idempotent.
    pub fn pause(&mut self) {
        if let Some(running) = &mut self.running
            && running.frozen.is_none()
        {
            let left = running.next_tick.saturating_duration_since(Instant::now());
            running.frozen = Some(left);
            debug!(tag = ?running.tag, remaining = running.remaining, "countdown paused");
        }
    }

    /// Continues a paused countdown from exactly where it froze.
    pub fn resume(&mut self) {
        if let Some(running) = &mut self.running
            && let Some(left) = running.frozen.take()
        {
            running.next_tick = Instant::now() + left;
            debug!(tag = ?running.tag, remaining = running.remaining, "countdown resumed");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.running.as_ref().is_some_and(|r| r.frozen.is_some())
    }

    /// Whole seconds left, or `None` when idle.
    pub fn remaining(&self) -> Option<u32> {
        self.running.as_ref().map(|r| r.remaining)
    }

    pub fn tag(&self) -> Option<&T> {
        self.running.as_ref().map(|r| &r.tag)
    }

    /// Waits for the next tick.
    ///
    /// Pends forever while idle or paused. After the final tick
    /// (`remaining == 0`) the countdown is idle again.
    pub async fn wait_for_tick(&mut self) -> CountdownTick<T> {
        let next = match &self.running {
            Some(running) if running.frozen.is_none() => running.next_tick,
            _ => std::future::pending().await,
        };

        time::sleep_until(next).await;

        let interval = self.interval;
        let Some(running) = self.running.as_mut() else {
            return std::future::pending().await;
        };
        running.remaining = running.remaining.saturating_sub(1);
        running.next_tick = next + interval;
        let tick = CountdownTick {
            tag: running.tag.clone(),
            remaining: running.remaining,
        };
        trace!(tag = ?tick.tag, remaining = tick.remaining, "countdown tick");

        if tick.is_last() {
            self.running = None;
        }
        tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_countdown_is_idle() {
        let c: Countdown<u8> = Countdown::new();
        assert!(!c.is_running());
        assert!(!c.is_paused());
        assert_eq!(c.remaining(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_sets_remaining_and_tag() {
        let mut c = Countdown::new();
        c.start("question", 20);
        assert_eq!(c.remaining(), Some(20));
        assert_eq!(c.tag(), Some(&"question"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_tag_and_goes_idle() {
        let mut c = Countdown::new();
        c.start(7u64, 5);
        assert_eq!(c.cancel(), Some(7));
        assert!(!c.is_running());
        assert_eq!(c.cancel(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_on_idle_countdown_is_noop() {
        let mut c: Countdown<u8> = Countdown::new();
        c.pause();
        assert!(!c.is_paused());
    }
}
