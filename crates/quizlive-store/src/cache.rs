//! The shared session cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::StoreError;

/// A key-value store with per-entry expiry, shared by every process that
/// can host rooms.
///
/// Values are opaque strings (serialized aggregates). Implementations must
/// treat expired entries as absent.
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Returns the value, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes the value with a fresh expiry.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    /// Removes the value. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Whether a live value exists.
    async fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Drops expired entries and returns how many went. Backends that
    /// expire keys on their own keep the default no-op.
    async fn sweep_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// Spawns a task that calls [`SessionCache::sweep_expired`] every `every`.
///
/// Rooms that are never looked up again would otherwise leave their expired
/// entries behind. Abort the handle to stop sweeping.
pub fn spawn_cache_sweeper(cache: Arc<dyn SessionCache>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(every.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            match cache.sweep_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "swept expired cache entries"),
                Err(e) => warn!(error = %e, "cache sweep failed"),
            }
        }
    })
}

#[derive(Debug)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// In-process [`SessionCache`]. Share it with `Arc` between servers in the
/// same process to simulate a shared cache.
///
/// Expired entries are dropped on access and by [`purge_expired`](Self::purge_expired).
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    /// Number of entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SessionCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<usize, StoreError> {
        Ok(self.purge_expired())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_set_then_get_returns_value() {
        let cache = MemoryCache::new();
        cache.set("room:A", "v1".into(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("room:A").await.unwrap(), Some("v1".into()));
        assert!(cache.contains("room:A").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_ttl_returns_none_and_purges() {
        let cache = MemoryCache::new();
        cache.set("room:A", "v1".into(), Duration::from_secs(60)).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        assert_eq!(cache.get("room:A").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_refreshes_expiry() {
        let cache = MemoryCache::new();
        cache.set("k", "a".into(), Duration::from_secs(10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set("k", "b".into(), Duration::from_secs(10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get("k").await.unwrap(), Some("b".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_counts_removed() {
        let cache = MemoryCache::new();
        cache.set("old", "x".into(), Duration::from_secs(1)).await.unwrap();
        cache.set("new", "y".into(), Duration::from_secs(100)).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_entries_nobody_reads() {
        let cache = Arc::new(MemoryCache::new());
        cache.set("room:A", "x".into(), Duration::from_secs(5)).await.unwrap();
        let sweeper = spawn_cache_sweeper(cache.clone(), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(cache.is_empty());
        sweeper.abort();
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_ok() {
        let cache = MemoryCache::new();
        assert!(cache.delete("nope").await.is_ok());
    }
}
