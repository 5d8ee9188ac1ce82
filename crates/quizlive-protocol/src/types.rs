//! Identity types and the messages that travel on the socket.
//!
//! Every frame is an [`Envelope`]. Clients send [`ClientCommand`]s, the
//! server sends [`ServerEvent`]s. Both enums are internally tagged with a
//! snake_case `"type"` so a browser client can `switch (msg.type)`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    AccessMode, AnswerPayload, AnswerStats, CorrectAnswer, ErrorKind,
    FinalStanding, LeaderboardRow, PlayerView, ProtocolError, PublicQuestion,
    QuestionResult, RoomStateView, RoomStatus, RoomSettings, RoomSummary,
};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A player within one room. Assigned by the room, stable across
/// reconnects.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A stable account id issued by the identity provider. Anonymous players
/// don't have one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A question, unique within its question set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct QuestionId(pub u64);

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q-{}", self.0)
    }
}

/// Identifies a question set in the external catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionSetId(pub String);

impl fmt::Display for QuestionSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies a class roster in the external catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RosterId(pub String);

impl fmt::Display for RosterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The short code people type to join a room, e.g. `K7QX2M`.
///
/// Codes are case-insensitive on input and stored uppercase. Decoding
/// validates the code, so a `RoomCode` in hand is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Characters used for generated codes. No `0/O` or `1/I` lookalikes.
    pub const ALPHABET: &'static [u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

    /// Length of generated codes.
    pub const LEN: usize = 6;

    /// Normalizes and validates user input.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidRoomCode`] unless the trimmed input
    /// is 4–8 ASCII letters or digits.
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        let code = input.trim().to_ascii_uppercase();
        let valid = (4..=8).contains(&code.len())
            && code.bytes().all(|b| b.is_ascii_alphanumeric());
        if valid {
            Ok(Self(code))
        } else {
            Err(ProtocolError::InvalidRoomCode(input.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// ClientCommand: client → server
// ---------------------------------------------------------------------------

/// Everything a client can ask the server to do.
///
/// Player identity for in-room commands (`toggle_ready`, `submit_answer`,
/// `leave_room`) is implicit: the connection remembers which player it
/// joined as. Host commands (`start_game`, `close_room`) act on the room
/// the connection created or resumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// First frame on every connection. `token` is handed to the
    /// authenticator; anonymous players send none.
    Handshake {
        version: u32,
        #[serde(default)]
        token: Option<String>,
    },

    /// Keep-alive. Echoed back with the server clock.
    Heartbeat { client_time: u64 },

    /// Host: open a new room for a question set.
    CreateRoom {
        question_set_id: crate::QuestionSetId,
        #[serde(default)]
        settings: RoomSettings,
        #[serde(default)]
        access_mode: AccessMode,
        #[serde(default)]
        roster_id: Option<crate::RosterId>,
    },

    /// Player: join (or rejoin) a room by code.
    JoinRoom {
        code: RoomCode,
        display_name: String,
        #[serde(default)]
        avatar: String,
        /// Claims a specific pre-provisioned seat in a closed room.
        #[serde(default)]
        placeholder_id: Option<PlayerId>,
    },

    /// Player: flip the ready flag.
    ToggleReady,

    /// Host: leave the lobby and start the question loop.
    StartGame,

    /// Player: answer the current question.
    SubmitAnswer {
        question_id: QuestionId,
        answer: AnswerPayload,
        /// Milliseconds since the question appeared on the client.
        elapsed_ms: u64,
    },

    /// Player: leave the room (the seat is kept for reconnection).
    LeaveRoom,

    /// Host: end the room for everyone.
    CloseRoom,

    /// Host: reattach to a room and resume it if it was paused.
    ResumeGame { code: RoomCode },

    /// Anyone: public summary for a join screen.
    RoomSummary { code: RoomCode },

    /// Host: full room state.
    RoomState { code: RoomCode },
}

// ---------------------------------------------------------------------------
// ServerEvent: server → client
// ---------------------------------------------------------------------------

/// Everything the server tells clients.
///
/// Most variants are broadcast to the whole room; replies to a single
/// connection (`handshake_ack`, `joined`, `answer_accepted`, `error`, ...)
/// go only to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    HandshakeAck {
        user_id: Option<UserId>,
        server_time: u64,
    },
    HeartbeatAck {
        client_time: u64,
        server_time: u64,
    },
    RoomCreated {
        code: RoomCode,
        /// Pre-provisioned seats for closed rooms (empty for open rooms).
        placeholders: Vec<PlayerView>,
    },
    Joined {
        code: RoomCode,
        player: PlayerView,
        is_reconnect: bool,
        status: RoomStatus,
        players: Vec<PlayerView>,
    },
    PlayerJoined {
        player: PlayerView,
        is_reconnect: bool,
    },
    PlayerLeft {
        player_id: PlayerId,
    },
    PlayerDisconnected {
        player_id: PlayerId,
    },
    PlayerReady {
        player_id: PlayerId,
        ready: bool,
    },
    RoomUpdated {
        status: RoomStatus,
        connected_players: usize,
    },
    GameStarting {
        seconds: u32,
        total_questions: usize,
    },
    CountdownTick {
        remaining: u32,
    },
    GameStarted {
        total_questions: usize,
    },
    QuestionNew {
        index: usize,
        total: usize,
        question: PublicQuestion,
    },
    TimerTick {
        question_id: QuestionId,
        remaining: u32,
    },
    QuestionTimeout {
        question_id: QuestionId,
    },
    AnswerAccepted {
        result: QuestionResult,
    },
    LeaderboardUpdated {
        question_id: QuestionId,
        answered: usize,
        total: usize,
        top: Vec<LeaderboardRow>,
    },
    QuestionResults {
        question_id: QuestionId,
        correct_answer: CorrectAnswer,
        explanation: Option<String>,
        stats: AnswerStats,
        leaderboard: Vec<LeaderboardRow>,
    },
    GetReady {
        next_index: usize,
        seconds: u32,
    },
    GamePaused {
        reason: String,
    },
    GameResumed {
        status: RoomStatus,
    },
    GameFinished {
        standings: Vec<FinalStanding>,
    },
    RoomClosed {
        reason: String,
    },
    RoomSummary {
        summary: RoomSummary,
    },
    RoomState {
        state: RoomStateView,
    },
    Error {
        code: u16,
        kind: ErrorKind,
        message: String,
    },
}

impl ServerEvent {
    /// Builds an `error` event from a kind and message.
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            code: kind.status_code(),
            kind,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The content of a frame: a command (client → server) or an event
/// (server → client).
///
/// Adjacently tagged:
///   `{ "type": "command", "data": { "type": "toggle_ready" } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Command(ClientCommand),
    Event(ServerEvent),
}

/// The top-level frame. Every message on the wire is an Envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-direction sequence number, used by clients to spot gaps.
    pub seq: u64,

    /// Milliseconds since the sender's connection started.
    pub timestamp: u64,

    pub payload: Payload,
}

// =========================================================================
// Tests
// =========================================================================
