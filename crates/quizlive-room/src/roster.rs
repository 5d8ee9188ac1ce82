//! Join resolution: who is this joining player?

use quizlive_protocol::{AccessMode, PlayerId, RoomStatus, UserId};
use quizlive_store::{normalize_name, Player, SessionAggregate};

use crate::RoomError;

/// Longest display name accepted, in characters.
pub const MAX_NAME_LEN: usize = 32;

/// A player's request to enter a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    /// Stable identity from the authenticator, `None` for anonymous players.
    pub user_id: Option<UserId>,
    pub display_name: String,
    pub avatar: String,
    /// A specific pre-provisioned seat to claim.
    pub placeholder_id: Option<PlayerId>,
}

impl JoinRequest {
    /// An anonymous join by name.
    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            user_id: None,
            display_name: display_name.into(),
            avatar: String::new(),
            placeholder_id: None,
        }
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = avatar.into();
        self
    }

    pub fn with_placeholder(mut self, id: PlayerId) -> Self {
        self.placeholder_id = Some(id);
        self
    }
}

/// How a join was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    pub player_id: PlayerId,
    /// `true` when an existing seat was taken back rather than a new one
    /// created or a placeholder claimed for the first time.
    pub is_reconnect: bool,
}

/// Resolves a join against the room, mutating the aggregate.
///
/// Resolution order:
/// 1. a seat the caller's user id has already claimed, even when a
///    placeholder id is given, so one identity never holds two live seats;
/// 2. an explicit placeholder id;
/// 3. an unclaimed placeholder provisioned for the caller's user id;
/// 4. a player with the same normalized display name (reconnect);
/// 5. a new player, if the room is open, not finished, in the lobby or
///    allowing late joins, and below its player cap.
pub fn resolve_join(
    agg: &mut SessionAggregate,
    request: &JoinRequest,
    now_ms: u64,
) -> Result<JoinOutcome, RoomError> {
    let name = request.display_name.trim();
    let normalized = normalize_name(name);
    if normalized.is_empty() {
        return Err(RoomError::InvalidPayload("display name is empty".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(RoomError::InvalidPayload(format!(
            "display name is longer than {MAX_NAME_LEN} characters"
        )));
    }

    let owned = request.user_id.as_ref().and_then(|user_id| {
        agg.players
            .values()
            .filter(|p| p.user_id.as_ref() == Some(user_id))
            .min_by_key(|p| (p.placeholder, p.id))
            .map(|p| (p.id, p.placeholder))
    });
    if let Some((seat, false)) = owned {
        return Ok(claim(agg, seat, request));
    }

    if let Some(seat) = request.placeholder_id {
        let player = agg.player(seat).ok_or(RoomError::PlayerNotFound(seat))?;
        if !may_take(player, request.user_id.as_ref()) {
            let held_by = player.display_name.clone();
            return Err(RoomError::DuplicateName(held_by));
        }
        return Ok(claim(agg, seat, request));
    }

    if let Some((seat, true)) = owned {
        return Ok(claim(agg, seat, request));
    }

    let by_name = agg
        .players
        .values()
        .find(|p| p.normalized_name() == normalized)
        .map(|p| (p.id, may_take(p, request.user_id.as_ref())));
    match by_name {
        Some((seat, true)) => return Ok(claim(agg, seat, request)),
        Some((_, false)) => return Err(RoomError::DuplicateName(name.to_string())),
        None => {}
    }

    let status = agg.status();
    let window_open = status != RoomStatus::Finished
        && (status == RoomStatus::Lobby || agg.room.settings.late_join_allowed)
        && agg.room.access_mode == AccessMode::Open;
    if !window_open {
        return Err(RoomError::JoinWindowClosed(agg.code().clone()));
    }
    if agg.connected_count() >= agg.room.settings.max_players {
        return Err(RoomError::RoomFull(agg.code().clone()));
    }

    let id = agg.allocate_player_id();
    agg.players.insert(
        id,
        Player {
            id,
            user_id: request.user_id.clone(),
            display_name: name.to_string(),
            avatar: request.avatar.clone(),
            connected: true,
            ready: false,
            joined_at_ms: now_ms,
            placeholder: false,
        },
    );
    Ok(JoinOutcome {
        player_id: id,
        is_reconnect: false,
    })
}

/// Whether a caller may take over an existing seat.
///
/// A seat held by a live connection can only be taken by its own identity.
/// A seat tied to a user id is never handed to a different user id.
fn may_take(player: &Player, caller: Option<&UserId>) -> bool {
    let same_identity = player.user_id.is_some() && player.user_id.as_ref() == caller;
    if same_identity {
        return true;
    }
    if player.connected {
        return false;
    }
    match (&player.user_id, caller) {
        (Some(owner), Some(caller)) => owner == caller,
        _ => true,
    }
}

fn claim(agg: &mut SessionAggregate, seat: PlayerId, request: &JoinRequest) -> JoinOutcome {
    let Some(player) = agg.player_mut(seat) else {
        return JoinOutcome {
            player_id: seat,
            is_reconnect: false,
        };
    };
    let first_claim = player.placeholder;
    player.connected = true;
    player.placeholder = false;
    if !request.avatar.is_empty() {
        player.avatar = request.avatar.clone();
    }
    if player.user_id.is_none() {
        player.user_id = request.user_id.clone();
    }
    JoinOutcome {
        player_id: seat,
        is_reconnect: !first_claim,
    }
}
