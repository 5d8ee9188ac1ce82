//! Wire protocol for Quizlive.
//!
//! This crate defines the "language" that quiz clients and the server
//! speak, plus the quiz value types both sides need to agree on:
//!
//! - **Identity** ([`PlayerId`], [`UserId`], [`RoomCode`], ...): newtype ids
//! - **Quiz values** ([`Question`], [`AnswerPayload`], [`CorrectAnswer`]):
//!   what a question looks like and what an answer looks like
//! - **Rooms** ([`RoomStatus`], [`RoomSettings`], views): lifecycle and
//!   the read models sent to clients
//! - **Messages** ([`ClientCommand`], [`ServerEvent`], [`Envelope`]): what
//!   travels on the socket
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): bytes in, bytes out
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Room actor (commands/events)
//! ```

mod codec;
mod error;
mod quiz;
mod room;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::{ErrorKind, ProtocolError};
pub use quiz::{
    AnswerPayload, CorrectAnswer, PublicQuestion, Question, QuestionKind,
};
pub use room::{
    AccessMode, AnswerStats, FinalStanding, LeaderboardRow, PlayerView,
    QuestionResult, RoomStateView, RoomStatus, RoomSettings, RoomSummary,
};
pub use types::{
    ClientCommand, Envelope, Payload, PlayerId, QuestionId, QuestionSetId,
    RoomCode, RosterId, ServerEvent, UserId,
};

/// Re-exported so wire consumers don't need a direct scoring dependency.
pub use quizlive_scoring::{Rewards, ScoreBreakdown};
