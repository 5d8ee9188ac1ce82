//! Unified error type for the Quizlive server.

use quizlive_protocol::ProtocolError;
use quizlive_room::RoomError;
use quizlive_store::StoreError;
use quizlive_transport::TransportError;

use crate::AuthError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum QuizliveError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, bad handshake).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The handshake token was rejected.
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A room operation failed.
    #[error(transparent)]
    Room(#[from] RoomError),
}
