//! Room manager: creates rooms, finds (or rebuilds) their actors, and
//! routes commands to them.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use quizlive_protocol::{
    AccessMode, AnswerPayload, PlayerId, PlayerView, QuestionId, QuestionResult,
    QuestionSetId, RoomCode, RoomSettings, RoomStateView, RoomStatus, RoomSummary,
    RosterId, ServerEvent, UserId,
};
use quizlive_store::{now_ms, HostInfo, Player, RoomRecord, SessionAggregate, SessionStore};
use rand::Rng;
use tracing::{debug, info};

use crate::room::{spawn_room, RoomContext, RoomHandle};
use crate::roster::JoinRequest;
use crate::{ConnectionId, EngineConfig, EventSender, JoinAccepted, RoomError};

/// Everything needed to open a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoom {
    pub host: HostInfo,
    pub question_set_id: QuestionSetId,
    pub settings: RoomSettings,
    pub access_mode: AccessMode,
    /// Required for closed rooms; its members become placeholder seats.
    pub roster_id: Option<RosterId>,
}

/// A freshly created room.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedRoom {
    pub record: RoomRecord,
    pub placeholders: Vec<PlayerView>,
}

/// Creates rooms and routes commands to their actors.
///
/// Handles live in a [`DashMap`] keyed by room code, so commands for
/// different rooms never contend. A code that isn't held in memory is
/// looked up in the shared cache and its actor rebuilt; rooms that were
/// mid-game come back paused until the host resumes them.
///
/// Cheap to clone; clones share the same rooms.
#[derive(Clone)]
pub struct RoomManager {
    rooms: Arc<DashMap<RoomCode, RoomHandle>>,
    store: Arc<SessionStore>,
    config: EngineConfig,
}

impl RoomManager {
    pub fn new(store: Arc<SessionStore>, config: EngineConfig) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of room actors running in this process.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Whether this process currently runs an actor for `code`.
    pub fn contains(&self, code: &RoomCode) -> bool {
        self.rooms.contains_key(code)
    }

    /// Opens a new room in the lobby and attaches the host's connection.
    ///
    /// The host receives `room_created` before anyone can join.
    ///
    /// # Errors
    /// - [`RoomError::NotHost`] if the host is anonymous.
    /// - [`RoomError::InvalidPayload`] for a closed room without a roster.
    /// - [`RoomError::Store`] if the question set or roster is missing.
    /// - [`RoomError::CodeSpaceExhausted`] if no free code was found.
    pub async fn create_room(
        &self,
        new_room: NewRoom,
        conn: ConnectionId,
        sender: EventSender,
    ) -> Result<CreatedRoom, RoomError> {
        if new_room.host.user_id.is_none() {
            return Err(RoomError::NotHost);
        }
        let set = self.store.question_set(&new_room.question_set_id).await?;
        let members = match (new_room.access_mode, &new_room.roster_id) {
            (AccessMode::Closed, None) => {
                return Err(RoomError::InvalidPayload(
                    "a closed room needs a roster".into(),
                ));
            }
            (AccessMode::Closed, Some(roster_id)) => {
                let mut seen = HashSet::new();
                let mut members = self.store.roster(roster_id).await?;
                members.retain(|m| seen.insert(m.user_id.clone()));
                members
            }
            (AccessMode::Open, _) => Vec::new(),
        };

        for attempt in 1..=self.config.code_attempts {
            let Ok(code) = RoomCode::parse(&random_code()) else {
                continue;
            };
            if self.rooms.contains_key(&code) || self.store.code_in_use(&code).await {
                debug!(room = %code, attempt, "room code collision");
                continue;
            }

            let now = now_ms();
            let mut agg = SessionAggregate::new(RoomRecord {
                code: code.clone(),
                question_set_id: new_room.question_set_id.clone(),
                title: set.title.clone(),
                host: new_room.host.clone(),
                access_mode: new_room.access_mode,
                roster_id: new_room.roster_id.clone(),
                status: RoomStatus::Lobby,
                paused_from: None,
                settings: new_room.settings.clone(),
                created_at_ms: now,
            });
            for member in &members {
                let id = agg.allocate_player_id();
                agg.players.insert(
                    id,
                    Player {
                        id,
                        user_id: Some(member.user_id.clone()),
                        display_name: member.display_name.clone(),
                        avatar: member.avatar.clone(),
                        connected: false,
                        ready: false,
                        joined_at_ms: now,
                        placeholder: true,
                    },
                );
            }
            let record = agg.room.clone();
            let placeholders = agg.player_views();

            let spawned = match self.rooms.entry(code.clone()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    let _ = sender.send(ServerEvent::RoomCreated {
                        code: code.clone(),
                        placeholders: placeholders.clone(),
                    });
                    let host = Some((conn, sender.clone()));
                    slot.insert(spawn_room(agg, self.context(), host, false));
                    true
                }
            };
            if !spawned {
                continue;
            }

            info!(
                room = %code,
                question_set = %record.question_set_id,
                access = ?record.access_mode,
                placeholders = placeholders.len(),
                "room created"
            );
            return Ok(CreatedRoom {
                record,
                placeholders,
            });
        }

        Err(RoomError::CodeSpaceExhausted(self.config.code_attempts))
    }

    /// Puts a player into a room: a new seat, a reconnect, or a claimed
    /// placeholder. The caller's channel receives `joined` first.
    pub async fn join_room(
        &self,
        code: &RoomCode,
        request: JoinRequest,
        conn: ConnectionId,
        sender: EventSender,
    ) -> Result<JoinAccepted, RoomError> {
        self.handle(code).await?.join(request, conn, sender).await
    }

    /// Toggles a player's ready flag and returns the new value.
    pub async fn set_ready(&self, code: &RoomCode, player: PlayerId) -> Result<bool, RoomError> {
        self.handle(code).await?.toggle_ready(player).await
    }

    /// Marks a player as gone. Their seat and score are kept.
    pub async fn leave(&self, code: &RoomCode, player: PlayerId) -> Result<(), RoomError> {
        self.handle(code).await?.leave(player).await
    }

    /// Reports a dropped player socket. No-op for rooms not in memory.
    pub async fn disconnected(&self, code: &RoomCode, player: PlayerId, conn: ConnectionId) {
        if let Some(handle) = self.live_handle(code) {
            let _ = handle.disconnected(player, conn).await;
        }
    }

    /// Starts the game. Host only, from the lobby, with at least one
    /// connected player.
    pub async fn start(&self, code: &RoomCode, host: &UserId) -> Result<(), RoomError> {
        self.handle(code).await?.start(host.clone()).await
    }

    pub async fn submit_answer(
        &self,
        code: &RoomCode,
        player: PlayerId,
        question_id: QuestionId,
        answer: AnswerPayload,
        elapsed_ms: u64,
    ) -> Result<QuestionResult, RoomError> {
        self.handle(code)
            .await?
            .submit_answer(player, question_id, answer, elapsed_ms)
            .await
    }

    /// Closes the room for everyone. Host only.
    pub async fn close(&self, code: &RoomCode, host: &UserId) -> Result<(), RoomError> {
        let handle = self.handle(code).await?;
        handle.close(host.clone()).await?;
        let generation = handle.generation();
        self.rooms
            .remove_if(code, |_, h| h.generation() == generation);
        Ok(())
    }

    /// Public summary, no authentication needed.
    pub async fn summary(&self, code: &RoomCode) -> Result<RoomSummary, RoomError> {
        self.handle(code).await?.summary().await
    }

    /// Full room view. Host only.
    pub async fn state(&self, code: &RoomCode, host: &UserId) -> Result<RoomStateView, RoomError> {
        self.handle(code).await?.state(host.clone()).await
    }

    /// Reports a dropped host socket: a lobby is cancelled, a running game
    /// pauses.
    pub async fn host_disconnected(&self, code: &RoomCode, conn: ConnectionId) {
        if let Some(handle) = self.live_handle(code) {
            let _ = handle.host_disconnected(conn).await;
        }
    }

    /// Reattaches the host and resumes a paused game. Returns the status
    /// the room is in afterwards.
    pub async fn resume(
        &self,
        code: &RoomCode,
        host: &UserId,
        conn: ConnectionId,
        sender: EventSender,
    ) -> Result<RoomStatus, RoomError> {
        self.handle(code).await?.resume(host.clone(), conn, sender).await
    }

    fn context(&self) -> RoomContext {
        RoomContext {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            rooms: Arc::clone(&self.rooms),
        }
    }

    fn live_handle(&self, code: &RoomCode) -> Option<RoomHandle> {
        self.rooms
            .get(code)
            .map(|h| h.clone())
            .filter(|h| !h.is_closed())
    }

    /// The handle for `code`, rebuilding the actor from the cache if no
    /// actor runs here.
    async fn handle(&self, code: &RoomCode) -> Result<RoomHandle, RoomError> {
        if let Some(handle) = self.rooms.get(code).map(|h| h.clone()) {
            if !handle.is_closed() {
                return Ok(handle);
            }
            let generation = handle.generation();
            self.rooms
                .remove_if(code, |_, h| h.generation() == generation);
        }

        let mut agg = self
            .store
            .load(code)
            .await?
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;
        if agg.status() == RoomStatus::Finished {
            return Err(RoomError::NotFound(code.clone()));
        }

        // Sockets died with the actor that held them.
        for player in agg.players.values_mut() {
            player.connected = false;
            player.ready = false;
        }

        let status = agg.status();
        let timers_lost = status.is_in_game();
        if matches!(status, RoomStatus::Starting | RoomStatus::Active) {
            agg.room.paused_from = Some(status);
            agg.room.status = RoomStatus::Paused;
        }

        let handle = match self.rooms.entry(code.clone()) {
            Entry::Occupied(existing) => return Ok(existing.get().clone()),
            Entry::Vacant(slot) => {
                let handle = spawn_room(agg, self.context(), None, timers_lost);
                slot.insert(handle.clone());
                handle
            }
        };
        info!(room = %code, %status, "room rehydrated from cache");
        Ok(handle)
    }
}

impl std::fmt::Debug for RoomManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomManager")
            .field("rooms", &self.rooms.len())
            .field("config", &self.config)
            .finish()
    }
}

fn random_code() -> String {
    let mut rng = rand::rng();
    (0..RoomCode::LEN)
        .map(|_| {
            let i = rng.random_range(0..RoomCode::ALPHABET.len());
            char::from(RoomCode::ALPHABET[i])
        })
        .collect()
}
