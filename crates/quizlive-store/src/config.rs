//! Store configuration.

use std::time::Duration;

const DEFAULT_CACHE_TTL_SECS: u64 = 2 * 60 * 60;
const DEFAULT_CACHE_SWEEP_SECS: u64 = 60;
const DEFAULT_HISTORY_QUEUE_CAPACITY: usize = 4096;
const DEFAULT_HISTORY_RETRIES: usize = 3;
const DEFAULT_HISTORY_RETRY_BASE_MS: u64 = 50;

/// Tuning knobs for the cache mirror and the history writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// How long a mirrored aggregate survives without being re-saved.
    pub cache_ttl: Duration,
    /// How often expired cache entries are swept.
    pub cache_sweep_interval: Duration,
    /// Bounded channel capacity for the history queue.
    pub history_queue_capacity: usize,
    /// Attempts per history write before the row is dropped.
    pub history_retries: usize,
    /// Base delay for linear retry back-off, in milliseconds.
    pub history_retry_base_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            cache_sweep_interval: Duration::from_secs(DEFAULT_CACHE_SWEEP_SECS),
            history_queue_capacity: DEFAULT_HISTORY_QUEUE_CAPACITY,
            history_retries: DEFAULT_HISTORY_RETRIES,
            history_retry_base_ms: DEFAULT_HISTORY_RETRY_BASE_MS,
        }
    }
}

impl StoreConfig {
    /// Reads `QUIZLIVE_CACHE_TTL_SECS`, `QUIZLIVE_CACHE_SWEEP_SECS`,
    /// `QUIZLIVE_HISTORY_QUEUE_CAPACITY`,
    /// `QUIZLIVE_HISTORY_RETRIES` and `QUIZLIVE_HISTORY_RETRY_BASE_MS`,
    /// falling back to the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self {
            cache_ttl: Duration::from_secs(env_parse(
                "QUIZLIVE_CACHE_TTL_SECS",
                DEFAULT_CACHE_TTL_SECS,
            )),
            cache_sweep_interval: Duration::from_secs(
                env_parse("QUIZLIVE_CACHE_SWEEP_SECS", DEFAULT_CACHE_SWEEP_SECS).max(1),
            ),
            history_queue_capacity: env_parse(
                "QUIZLIVE_HISTORY_QUEUE_CAPACITY",
                DEFAULT_HISTORY_QUEUE_CAPACITY,
            )
            .max(1),
            history_retries: env_parse("QUIZLIVE_HISTORY_RETRIES", DEFAULT_HISTORY_RETRIES)
                .max(1),
            history_retry_base_ms: env_parse(
                "QUIZLIVE_HISTORY_RETRY_BASE_MS",
                DEFAULT_HISTORY_RETRY_BASE_MS,
            ),
        }
    }
}

/// Parses an environment variable, or returns `default` when it is unset
/// or doesn't parse.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
