//! Rooms for Quizlive.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns the
//! room's [`SessionAggregate`](quizlive_store::SessionAggregate), its
//! subscribers, and its timers. The [`RoomManager`] creates rooms, routes
//! commands to them, and rebuilds them from the shared cache when a code
//! isn't held in this process.
//!
//! # Key types
//!
//! - [`RoomManager`]: create rooms, join, start, answer, pause, resume
//! - [`JoinRequest`]: who is joining and how
//! - [`EngineConfig`]: process-wide timings
//! - [`RoomError`]: every failure, mapped onto the wire taxonomy
//!
//! The quiz rules themselves live in [`gameplay`] and [`answer`] as plain
//! functions, so they can be tested without a runtime.

pub mod answer;
mod config;
mod error;
pub mod gameplay;
mod manager;
mod room;
mod roster;

pub use config::EngineConfig;
pub use error::RoomError;
pub use manager::{CreatedRoom, NewRoom, RoomManager};
pub use room::{ConnectionId, EventSender, JoinAccepted};
pub use roster::{resolve_join, JoinOutcome, JoinRequest, MAX_NAME_LEN};
