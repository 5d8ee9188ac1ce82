//! One-shot phase alarm.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::debug;

#[derive(Debug)]
struct Armed<T> {
    tag: T,
    deadline: Instant,
    frozen: Option<Duration>,
}

/// Fires once, `after` a delay, with the tag it was set with.
///
/// Used for the pauses between game phases. Setting a new alarm replaces
/// the old one.
#[derive(Debug)]
pub struct Alarm<T> {
    armed: Option<Armed<T>>,
}

impl<T: std::fmt::Debug> Default for Alarm<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: std::fmt::Debug> Alarm<T> {
    pub fn new() -> Self {
        Self { armed: None }
    }

    /// Arms the alarm, replacing any pending one.
    pub fn set(&mut self, tag: T, after: Duration) {
        if let Some(old) = &self.armed {
            debug!(old = ?old.tag, new = ?tag, "alarm replaced");
        }
        self.armed = Some(Armed {
            tag,
            deadline: Instant::now() + after,
            frozen: None,
        });
    }

    /// Disarms the alarm. Returns the pending tag, if any.
    pub fn cancel(&mut self) -> Option<T> {
        self.armed.take().map(|a| a.tag)
    }

    /// Freezes the time left. Idempotent.
    pub fn pause(&mut self) {
        if let Some(armed) = &mut self.armed
            && armed.frozen.is_none()
        {
            armed.frozen = Some(armed.deadline.saturating_duration_since(Instant::now()));
            debug!(tag = ?armed.tag, "alarm paused");
        }
    }

    /// Re-arms a paused alarm with the time it had left.
    pub fn resume(&mut self) {
        if let Some(armed) = &mut self.armed
            && let Some(left) = armed.frozen.take()
        {
            armed.deadline = Instant::now() + left;
            debug!(tag = ?armed.tag, left_ms = left.as_millis() as u64, "alarm resumed");
        }
    }

    pub fn is_set(&self) -> bool {
        self.armed.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.armed.as_ref().is_some_and(|a| a.frozen.is_some())
    }

    pub fn tag(&self) -> Option<&T> {
        self.armed.as_ref().map(|a| &a.tag)
    }

    /// Waits for the alarm and disarms it. Pends forever while unset or
    /// paused.
    pub async fn wait(&mut self) -> T {
        let deadline = match &self.armed {
            Some(armed) if armed.frozen.is_none() => armed.deadline,
            _ => std::future::pending().await,
        };

        time::sleep_until(deadline).await;

        match self.armed.take() {
            Some(armed) => armed.tag,
            None => std::future::pending().await,
        }
    }
}
