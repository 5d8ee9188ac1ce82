//! Error types for the store layer.

use quizlive_protocol::{QuestionSetId, RosterId};

/// Errors that can occur while reading or writing session state.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The aggregate or a history row couldn't be (de)serialized.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File-backed history failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The catalog has no such question set.
    #[error("question set not found: {0}")]
    QuestionSetNotFound(QuestionSetId),

    /// The catalog has no such roster.
    #[error("roster not found: {0}")]
    RosterNotFound(RosterId),

    /// A backend rejected the operation.
    #[error("backend error: {0}")]
    Backend(String),

    /// The history writer has shut down.
    #[error("history writer is closed")]
    WriterClosed,
}
