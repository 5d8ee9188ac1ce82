//! Session state and persistence for Quizlive.
//!
//! A live room keeps its [`SessionAggregate`] in the memory of its actor.
//! This crate is everything around that fast path:
//!
//! - **Model** ([`SessionAggregate`], [`Player`], [`LeaderboardEntry`], ...):
//!   the serializable unit of consistency for one room
//! - **Cache** ([`SessionCache`], [`MemoryCache`]): a TTL'd mirror of every
//!   aggregate, so a room can be rehydrated after its actor is gone
//! - **History** ([`HistoryStore`], [`HistoryWriter`]): append-only answer
//!   and result rows, written off the hot path with retries
//! - **Catalog** ([`QuestionSource`], [`MemoryCatalog`]): question sets and
//!   rosters owned by someone else
//! - **[`SessionStore`]**: the bundle a room actor is handed
//!
//! Backends are `Arc<dyn Trait>` so the server can swap a shared cache or a
//! database in without touching the room crate.

mod cache;
mod catalog;
mod config;
mod error;
mod history;
mod model;
mod session;
mod writer;

pub use cache::{spawn_cache_sweeper, MemoryCache, SessionCache};
pub use catalog::{MemoryCatalog, QuestionSet, QuestionSource, RosterMember};
pub use config::{env_parse, StoreConfig};
pub use error::StoreError;
pub use history::{HistoryStore, JsonlHistory, MemoryHistory};
pub use model::{
    now_ms, normalize_name, AnswerSubmission, GameResult, HostInfo,
    LeaderboardEntry, Player, PlayerTotals, RoomRecord, SessionAggregate,
};
pub use session::{cache_key, SessionStore};
pub use writer::{HistoryRecord, HistoryWriter};
