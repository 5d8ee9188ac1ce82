//! Error types for the room layer.

use quizlive_protocol::{ErrorKind, PlayerId, QuestionId, RoomCode, ServerEvent};
use quizlive_store::StoreError;

/// Errors that can occur during room operations.
///
/// Every variant maps onto a wire [`ErrorKind`] through [`RoomError::kind`].
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No room with this code, in memory or in the cache.
    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// The player id doesn't belong to this room.
    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),

    /// The answer is for a question other than the current one.
    #[error("question {got} is not the current question")]
    QuestionMismatch { got: QuestionId },

    #[error("no question is open")]
    NoActiveQuestion,

    /// The caller isn't the room's host.
    #[error("only the host can do that")]
    NotHost,

    #[error("room {0} is full")]
    RoomFull(RoomCode),

    /// The room isn't taking new players (game running without late join,
    /// finished, or a closed roster).
    #[error("room {0} is not accepting new players")]
    JoinWindowClosed(RoomCode),

    #[error("at least one connected player is required")]
    InsufficientPlayers,

    /// The room is in a state that doesn't allow this operation.
    #[error("invalid room state for this operation: {0}")]
    InvalidState(String),

    #[error("player {0} already answered question {1}")]
    AlreadyAnswered(PlayerId, QuestionId),

    /// Another connected player already uses this name.
    #[error("the name {0:?} is taken")]
    DuplicateName(String),

    /// The answer came in too late.
    #[error("timing violation: {0}")]
    TimingViolation(String),

    /// The request is malformed (wrong answer shape, empty name, ...).
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The room's command channel is closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("no free room code after {0} attempts")]
    CodeSpaceExhausted(usize),
}

impl RoomError {
    /// The wire error class for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_)
            | Self::PlayerNotFound(_)
            | Self::QuestionMismatch { .. }
            | Self::NoActiveQuestion => ErrorKind::NotFound,
            Self::NotHost => ErrorKind::Unauthorized,
            Self::RoomFull(_)
            | Self::JoinWindowClosed(_)
            | Self::InsufficientPlayers
            | Self::InvalidState(_) => ErrorKind::Forbidden,
            Self::AlreadyAnswered(..) | Self::DuplicateName(_) => ErrorKind::Conflict,
            Self::TimingViolation(_) => ErrorKind::TimingViolation,
            Self::InvalidPayload(_) => ErrorKind::InvalidPayload,
            Self::Store(StoreError::QuestionSetNotFound(_) | StoreError::RosterNotFound(_)) => {
                ErrorKind::NotFound
            }
            Self::Unavailable(_) | Self::Store(_) | Self::CodeSpaceExhausted(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// The `error` event sent back to the caller.
    pub fn to_event(&self) -> ServerEvent {
        ServerEvent::error(self.kind(), self.to_string())
    }
}
