//! The store handle given to every room.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use quizlive_protocol::{QuestionSetId, RoomCode, RosterId};

use crate::{
    AnswerSubmission, GameResult, HistoryRecord, HistoryStore, HistoryWriter,
    PlayerTotals, QuestionSet, QuestionSource, RosterMember, SessionAggregate,
    SessionCache, StoreConfig, StoreError,
};

/// Cache key for a room's aggregate.
pub fn cache_key(code: &RoomCode) -> String {
    format!("room:{code}")
}

/// Cache, history writer, and catalog, bundled for the room layer.
///
/// Constructed once at startup and shared with `Arc`.
pub struct SessionStore {
    cache: Arc<dyn SessionCache>,
    writer: HistoryWriter,
    catalog: Arc<dyn QuestionSource>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(
        cache: Arc<dyn SessionCache>,
        writer: HistoryWriter,
        catalog: Arc<dyn QuestionSource>,
        ttl: Duration,
    ) -> Self {
        Self {
            cache,
            writer,
            catalog,
            ttl,
        }
    }

    /// Spawns a [`HistoryWriter`] over `history` and bundles everything.
    ///
    /// Must be called inside a Tokio runtime. The writer stops once the
    /// store is dropped.
    pub fn spawn(
        cache: Arc<dyn SessionCache>,
        history: Arc<dyn HistoryStore>,
        catalog: Arc<dyn QuestionSource>,
        config: StoreConfig,
    ) -> Self {
        let (writer, _worker) = HistoryWriter::spawn(history, config);
        Self::new(cache, writer, catalog, config.cache_ttl)
    }

    /// Mirrors the aggregate to the cache with a fresh TTL.
    pub async fn save(&self, aggregate: &SessionAggregate) -> Result<(), StoreError> {
        let json = serde_json::to_string(aggregate)?;
        self.cache.set(&cache_key(aggregate.code()), json, self.ttl).await
    }

    /// Loads a mirrored aggregate, if the cache still has it.
    pub async fn load(&self, code: &RoomCode) -> Result<Option<SessionAggregate>, StoreError> {
        match self.cache.get(&cache_key(code)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn evict(&self, code: &RoomCode) -> Result<(), StoreError> {
        debug!(room = %code, "evicting cached aggregate");
        self.cache.delete(&cache_key(code)).await
    }

    /// Whether any process has a live room under `code`.
    ///
    /// A cache failure counts as "in use" so code generation never hands
    /// out a code it couldn't check.
    pub async fn code_in_use(&self, code: &RoomCode) -> bool {
        match self.cache.contains(&cache_key(code)).await {
            Ok(in_use) => in_use,
            Err(e) => {
                warn!(room = %code, error = %e, "cache lookup failed during code check");
                true
            }
        }
    }

    pub fn record_answer(&self, answer: AnswerSubmission) {
        self.writer.enqueue(HistoryRecord::Answer(answer));
    }

    pub fn record_totals(&self, totals: PlayerTotals) {
        self.writer.enqueue(HistoryRecord::Totals(totals));
    }

    pub fn record_result(&self, result: GameResult) {
        self.writer.enqueue(HistoryRecord::Result(result));
    }

    /// Waits for the history queue to drain.
    pub async fn flush_history(&self) -> Result<(), StoreError> {
        self.writer.flush().await
    }

    pub async fn question_set(&self, id: &QuestionSetId) -> Result<QuestionSet, StoreError> {
        self.catalog.question_set(id).await
    }

    pub async fn roster(&self, id: &RosterId) -> Result<Vec<RosterMember>, StoreError> {
        self.catalog.roster(id).await
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
