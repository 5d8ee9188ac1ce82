//! # Quizlive
//!
//! Real-time quiz sessions over WebSocket.
//!
//! A host creates a room tied to a question set, players join with a short
//! room code, and the server drives a synchronized question → answer →
//! results loop, scoring answers by correctness, speed, and streak. Every
//! room runs as its own actor and mirrors its state to a shared cache, so a
//! room survives a process restart as long as the cache does.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use quizlive::prelude::*;
//!
//! # async fn run() -> Result<(), QuizliveError> {
//! let catalog = MemoryCatalog::new();
//! let server = QuizliveServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .catalog(Arc::new(catalog))
//!     .build(TrustedTokenAuth)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod auth;
mod config;
mod error;
mod handler;
mod server;

pub use auth::{AuthError, Authenticator, Identity, TrustedTokenAuth};
pub use config::ServerConfig;
pub use error::QuizliveError;
pub use server::{QuizliveServer, QuizliveServerBuilder, PROTOCOL_VERSION};

/// Everything a server binary or an integration test usually needs.
pub mod prelude {
    pub use crate::{
        AuthError, Authenticator, Identity, QuizliveError, QuizliveServer,
        QuizliveServerBuilder, ServerConfig, TrustedTokenAuth, PROTOCOL_VERSION,
    };
    pub use quizlive_protocol::{
        AccessMode, AnswerPayload, ClientCommand, Codec, CorrectAnswer, Envelope, ErrorKind,
        JsonCodec, Payload, PlayerId, Question, QuestionId, QuestionKind, QuestionSetId,
        RoomCode, RoomSettings, RoomStatus, RosterId, ServerEvent, UserId,
    };
    pub use quizlive_room::{EngineConfig, RoomError, RoomManager};
    pub use quizlive_scoring::{score_answer, Rewards, ScoreBreakdown};
    pub use quizlive_store::{
        JsonlHistory, MemoryCache, MemoryCatalog, MemoryHistory, QuestionSet, RosterMember,
        StoreConfig,
    };
}
