//! Background history writer.
//!
//! Room actors must never wait on durable storage. They enqueue rows with
//! a non-blocking `try_send`; a single worker drains the queue and writes
//! each row with linear back-off retries. A row that still fails after the
//! last attempt is logged and dropped; the in-memory score stays as it is.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{AnswerSubmission, GameResult, HistoryStore, PlayerTotals, StoreConfig, StoreError};

/// One unit of work for the writer.
#[derive(Debug, Clone)]
pub enum HistoryRecord {
    Answer(AnswerSubmission),
    Totals(PlayerTotals),
    Result(GameResult),
}

impl HistoryRecord {
    fn kind(&self) -> &'static str {
        match self {
            Self::Answer(_) => "answer",
            Self::Totals(_) => "totals",
            Self::Result(_) => "result",
        }
    }
}

enum Job {
    Write(HistoryRecord),
    Flush(oneshot::Sender<()>),
}

/// Handle to the history worker. Cheap to clone.
#[derive(Debug, Clone)]
pub struct HistoryWriter {
    tx: mpsc::Sender<Job>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Write(record) => write!(f, "Write({})", record.kind()),
            Self::Flush(_) => write!(f, "Flush"),
        }
    }
}

impl HistoryWriter {
    /// Spawns the worker. It runs until every `HistoryWriter` clone is
    /// dropped, then finishes whatever is still queued.
    pub fn spawn(store: Arc<dyn HistoryStore>, config: StoreConfig) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Job>(config.history_queue_capacity.max(1));

        info!(
            queue_capacity = config.history_queue_capacity,
            retries = config.history_retries,
            retry_base_ms = config.history_retry_base_ms,
            "history writer configured"
        );

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match job {
                    Job::Write(record) => write_with_retry(store.as_ref(), &record, config).await,
                    Job::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            info!("history writer stopped");
        });

        (Self { tx }, handle)
    }

    /// Best-effort, non-blocking enqueue.
    ///
    /// Returns `false` (and logs) if the queue is full or the worker is
    /// gone; the caller carries on either way.
    pub fn enqueue(&self, record: HistoryRecord) -> bool {
        let kind = record.kind();
        match self.tx.try_send(Job::Write(record)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(kind, "history queue full; dropping record");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(kind, "history queue closed; dropping record");
                false
            }
        }
    }

    /// Waits until everything enqueued before this call has been written
    /// (or dropped after its retries).
    pub async fn flush(&self) -> Result<(), StoreError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Job::Flush(done_tx))
            .await
            .map_err(|_| StoreError::WriterClosed)?;
        done_rx.await.map_err(|_| StoreError::WriterClosed)
    }
}

async fn write_once(store: &dyn HistoryStore, record: &HistoryRecord) -> Result<(), StoreError> {
    match record {
        HistoryRecord::Answer(answer) => store.append_answer(answer).await,
        HistoryRecord::Totals(totals) => store.upsert_totals(totals).await,
        HistoryRecord::Result(result) => store.append_result(result).await,
    }
}

async fn write_with_retry(store: &dyn HistoryStore, record: &HistoryRecord, config: StoreConfig) {
    let attempts = config.history_retries.max(1);
    for attempt in 1..=attempts {
        match write_once(store, record).await {
            Ok(()) => return,
            Err(e) if attempt < attempts => {
                warn!(
                    error = %e,
                    attempt,
                    total = attempts,
                    kind = record.kind(),
                    "history write failed; retrying"
                );
                tokio::time::sleep(Duration::from_millis(
                    attempt as u64 * config.history_retry_base_ms,
                ))
                .await;
            }
            Err(e) => {
                warn!(
                    error = %e,
                    kind = record.kind(),
                    "history write failed after retries; dropping record"
                );
                return;
            }
        }
    }
}
