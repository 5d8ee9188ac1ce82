//! Error types for the protocol layer.

use serde::{Deserialize, Serialize};

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, unknown
    /// command type, or a truncated frame.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A room code that can never exist (wrong length or alphabet).
    #[error("invalid room code: {0:?}")]
    InvalidRoomCode(String),

    /// The message decoded but breaks a protocol rule (for example a
    /// command that must come first arrived later).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

/// The stable error classes clients can switch on.
///
/// Every rejection the server sends carries one of these, next to an
/// HTTP-style numeric code and a human-readable message. The string form
/// (`"timing_violation"` etc.) is part of the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    Forbidden,
    Conflict,
    TimingViolation,
    InvalidPayload,
    Internal,
}

impl ErrorKind {
    /// HTTP-style status code sent alongside the kind.
    pub fn status_code(self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::Conflict => 409,
            Self::TimingViolation => 422,
            Self::InvalidPayload => 400,
            Self::Internal => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::Conflict => "conflict",
            Self::TimingViolation => "timing_violation",
            Self::InvalidPayload => "invalid_payload",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}
