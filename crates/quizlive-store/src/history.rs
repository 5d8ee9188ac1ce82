//! Durable history sinks.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use quizlive_protocol::{PlayerId, RoomCode};

use crate::{AnswerSubmission, GameResult, PlayerTotals, StoreError};

/// Where answers, totals, and results end up.
///
/// Answer and result writes are appends. Totals are an upsert keyed by
/// (room, player), so replaying a write is harmless.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append_answer(&self, answer: &AnswerSubmission) -> Result<(), StoreError>;

    async fn upsert_totals(&self, totals: &PlayerTotals) -> Result<(), StoreError>;

    async fn append_result(&self, result: &GameResult) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// MemoryHistory
// ---------------------------------------------------------------------------

/// In-memory [`HistoryStore`] for tests and demos.
///
/// [`fail_next`](Self::fail_next) makes the next `n` writes fail, to
/// exercise the writer's retry path.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    answers: Mutex<Vec<AnswerSubmission>>,
    totals: DashMap<(RoomCode, PlayerId), PlayerTotals>,
    results: Mutex<Vec<GameResult>>,
    failures: AtomicUsize,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` writes return [`StoreError::Backend`].
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn answers(&self) -> Vec<AnswerSubmission> {
        self.answers.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn totals(&self, room: &RoomCode, player: PlayerId) -> Option<PlayerTotals> {
        self.totals
            .get(&(room.clone(), player))
            .map(|t| t.value().clone())
    }

    pub fn results(&self) -> Vec<GameResult> {
        self.results.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn injected_failure(&self) -> Result<(), StoreError> {
        let took = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            Err(StoreError::Backend("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("history lock poisoned".into())
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn append_answer(&self, answer: &AnswerSubmission) -> Result<(), StoreError> {
        self.injected_failure()?;
        self.answers.lock().map_err(poisoned)?.push(answer.clone());
        Ok(())
    }

    async fn upsert_totals(&self, totals: &PlayerTotals) -> Result<(), StoreError> {
        self.injected_failure()?;
        self.totals
            .insert((totals.room.clone(), totals.player_id), totals.clone());
        Ok(())
    }

    async fn append_result(&self, result: &GameResult) -> Result<(), StoreError> {
        self.injected_failure()?;
        self.results.lock().map_err(poisoned)?.push(result.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JsonlHistory
// ---------------------------------------------------------------------------

/// Append-only JSON-lines file.
///
/// Every write is one line tagged with its `record`:
///
/// ```json
/// {"record":"answer","room":"K7QX2M","player_id":3,...}
/// {"record":"totals","room":"K7QX2M","player_id":3,"score":2650,...}
/// ```
///
/// Totals are appended too; when reading the file back, the last `totals`
/// line for a (room, player) wins.
#[derive(Debug)]
pub struct JsonlHistory {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

#[derive(Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum Line<'a> {
    Answer(&'a AnswerSubmission),
    Totals(&'a PlayerTotals),
    Result(&'a GameResult),
}

impl JsonlHistory {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, line: Line<'_>) -> Result<(), StoreError> {
        let mut bytes = serde_json::to_vec(&line)?;
        bytes.push(b'\n');

        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for JsonlHistory {
    async fn append_answer(&self, answer: &AnswerSubmission) -> Result<(), StoreError> {
        self.append(Line::Answer(answer)).await
    }

    async fn upsert_totals(&self, totals: &PlayerTotals) -> Result<(), StoreError> {
        self.append(Line::Totals(totals)).await
    }

    async fn append_result(&self, result: &GameResult) -> Result<(), StoreError> {
        self.append(Line::Result(result)).await
    }
}
