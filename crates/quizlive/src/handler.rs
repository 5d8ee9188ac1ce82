//! Per-connection handler: handshake, auth, and command routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Handshake → validate version → authenticate the token
//!   2. Send HandshakeAck
//!   3. Loop: receive commands → route to the room manager
//!
//! Everything the client receives after the ack goes through one event
//! channel drained by a writer task, so room broadcasts and direct replies
//! share a single sequence.

use std::sync::Arc;

use quizlive_protocol::{
    ClientCommand, Codec, Envelope, ErrorKind, Payload, PlayerId, ProtocolError, RoomCode,
    ServerEvent, UserId,
};
use quizlive_room::{ConnectionId, EventSender, JoinRequest, NewRoom, RoomError};
use quizlive_store::{now_ms, HostInfo};
use quizlive_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::server::{ServerState, PROTOCOL_VERSION};
use crate::{Authenticator, Identity, QuizliveError};

/// Which room, if any, this connection is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Binding {
    None,
    Host(RoomCode),
    Player { code: RoomCode, player: PlayerId },
}

/// Per-connection state for the command loop.
struct Session<'a, A: Authenticator, C: Codec> {
    state: &'a ServerState<A, C>,
    conn_id: ConnectionId,
    identity: Option<Identity>,
    events: EventSender,
    binding: Binding,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, C>>,
) -> Result<(), QuizliveError>
where
    A: Authenticator,
    C: Codec,
{
    let transport_id = conn.id();
    tracing::debug!(conn = %transport_id, "handling new connection");

    let identity = perform_handshake(&conn, &state).await?;
    tracing::info!(
        conn = %transport_id,
        user = identity.as_ref().map(|i| i.user_id.0.as_str()).unwrap_or("anonymous"),
        "connection ready"
    );

    let conn = Arc::new(conn);
    let (events, rx) = mpsc::unbounded_channel();
    let writer = spawn_writer(Arc::clone(&conn), Arc::clone(&state), rx);

    let mut session = Session {
        state: &*state,
        conn_id: ConnectionId(transport_id.into_inner()),
        identity,
        events,
        binding: Binding::None,
    };

    loop {
        let data =
            match tokio::time::timeout(state.config.idle_timeout, conn.recv()).await {
                Ok(Ok(Some(data))) => data,
                Ok(Ok(None)) => {
                    tracing::debug!(conn = %transport_id, "connection closed cleanly");
                    break;
                }
                Ok(Err(e)) => {
                    tracing::debug!(conn = %transport_id, error = %e, "recv error");
                    break;
                }
                Err(_) => {
                    tracing::info!(conn = %transport_id, "connection idle, dropping");
                    break;
                }
            };

        let envelope: Envelope = match state.codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(conn = %transport_id, error = %e, "failed to decode envelope");
                session.reply(ServerEvent::error(
                    ErrorKind::InvalidPayload,
                    format!("malformed message: {e}"),
                ));
                continue;
            }
        };

        match envelope.payload {
            Payload::Command(command) => session.dispatch(command).await,
            Payload::Event(_) => session.reply(ServerEvent::error(
                ErrorKind::InvalidPayload,
                "clients send commands, not events",
            )),
        }
    }

    session.detach().await;
    writer.abort();
    Ok(())
}

/// Receives the handshake, checks the version, authenticates the token if
/// one was sent, and acks.
///
/// No token means an anonymous connection.
async fn perform_handshake<A, C>(
    conn: &WebSocketConnection,
    state: &ServerState<A, C>,
) -> Result<Option<Identity>, QuizliveError>
where
    A: Authenticator,
    C: Codec,
{
    let data = match tokio::time::timeout(state.config.handshake_timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage(
                "connection closed before handshake".into(),
            )
            .into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    let envelope: Envelope = match state.codec.decode(&data) {
        Ok(env) => env,
        Err(e) => {
            send_direct(conn, &state.codec, invalid("expected handshake")).await?;
            return Err(e.into());
        }
    };

    let (version, token) = match envelope.payload {
        Payload::Command(ClientCommand::Handshake { version, token }) => (version, token),
        _ => {
            send_direct(conn, &state.codec, invalid("expected handshake")).await?;
            return Err(
                ProtocolError::InvalidMessage("first message must be a handshake".into()).into(),
            );
        }
    };

    if version != PROTOCOL_VERSION {
        let message = format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}");
        send_direct(conn, &state.codec, invalid(&message)).await?;
        return Err(ProtocolError::InvalidMessage(message).into());
    }

    let identity = match token.as_deref() {
        None => None,
        Some(token) => match state.auth.authenticate(token).await {
            Ok(identity) => Some(identity),
            Err(e) => {
                let event = ServerEvent::error(ErrorKind::Unauthorized, e.to_string());
                send_direct(conn, &state.codec, event).await?;
                return Err(e.into());
            }
        },
    };

    let ack = ServerEvent::HandshakeAck {
        user_id: identity.as_ref().map(|i| i.user_id.clone()),
        server_time: now_ms(),
    };
    send_direct(conn, &state.codec, ack).await?;

    Ok(identity)
}

impl<A: Authenticator, C: Codec> Session<'_, A, C> {
    /// Queues an event for this connection only.
    fn reply(&self, event: ServerEvent) {
        let _ = self.events.send(event);
    }

    fn reject(&self, err: RoomError) {
        tracing::debug!(conn = %self.conn_id, error = %err, "command rejected");
        self.reply(err.to_event());
    }

    fn user_id(&self) -> Result<&UserId, RoomError> {
        self.identity
            .as_ref()
            .map(|i| &i.user_id)
            .ok_or(RoomError::NotHost)
    }

    fn hosted_room(&self) -> Result<(RoomCode, UserId), RoomError> {
        match &self.binding {
            Binding::Host(code) => Ok((code.clone(), self.user_id()?.clone())),
            _ => Err(RoomError::NotHost),
        }
    }

    fn seat(&self) -> Result<(RoomCode, PlayerId), RoomError> {
        match &self.binding {
            Binding::Player { code, player } => Ok((code.clone(), *player)),
            _ => Err(RoomError::InvalidState("not in a room".into())),
        }
    }

    fn ensure_unbound(&self) -> Result<(), RoomError> {
        match self.binding {
            Binding::None => Ok(()),
            _ => Err(RoomError::InvalidState(
                "this connection is already in a room".into(),
            )),
        }
    }

    async fn dispatch(&mut self, command: ClientCommand) {
        if let Err(err) = self.execute(command).await {
            self.reject(err);
        }
    }

    async fn execute(&mut self, command: ClientCommand) -> Result<(), RoomError> {
        let rooms = &self.state.rooms;
        match command {
            ClientCommand::Handshake { .. } => {
                return Err(RoomError::InvalidPayload("already handshaken".into()));
            }

            ClientCommand::Heartbeat { client_time } => {
                self.reply(ServerEvent::HeartbeatAck {
                    client_time,
                    server_time: now_ms(),
                });
            }

            ClientCommand::CreateRoom {
                question_set_id,
                settings,
                access_mode,
                roster_id,
            } => {
                self.ensure_unbound()?;
                let host = HostInfo {
                    user_id: self.identity.as_ref().map(|i| i.user_id.clone()),
                    display_name: self
                        .identity
                        .as_ref()
                        .map(|i| i.display_name.clone())
                        .unwrap_or_default(),
                };
                let created = rooms
                    .create_room(
                        NewRoom {
                            host,
                            question_set_id,
                            settings,
                            access_mode,
                            roster_id,
                        },
                        self.conn_id,
                        self.events.clone(),
                    )
                    .await?;
                self.binding = Binding::Host(created.record.code);
            }

            ClientCommand::JoinRoom {
                code,
                display_name,
                avatar,
                placeholder_id,
            } => {
                self.ensure_unbound()?;
                let mut request = JoinRequest::named(display_name).with_avatar(avatar);
                if let Some(identity) = &self.identity {
                    request = request.with_user(identity.user_id.clone());
                }
                if let Some(id) = placeholder_id {
                    request = request.with_placeholder(id);
                }
                let accepted = rooms
                    .join_room(&code, request, self.conn_id, self.events.clone())
                    .await?;
                self.binding = Binding::Player {
                    code,
                    player: accepted.player.id,
                };
            }

            ClientCommand::ToggleReady => {
                let (code, player) = self.seat()?;
                rooms.set_ready(&code, player).await?;
            }

            ClientCommand::StartGame => {
                let (code, host) = self.hosted_room()?;
                rooms.start(&code, &host).await?;
            }

            ClientCommand::SubmitAnswer {
                question_id,
                answer,
                elapsed_ms,
            } => {
                let (code, player) = self.seat()?;
                rooms
                    .submit_answer(&code, player, question_id, answer, elapsed_ms)
                    .await?;
            }

            ClientCommand::LeaveRoom => match std::mem::replace(&mut self.binding, Binding::None) {
                Binding::Player { code, player } => rooms.leave(&code, player).await?,
                Binding::Host(code) => rooms.host_disconnected(&code, self.conn_id).await,
                Binding::None => {
                    return Err(RoomError::InvalidState("not in a room".into()));
                }
            },

            ClientCommand::CloseRoom => {
                let (code, host) = self.hosted_room()?;
                rooms.close(&code, &host).await?;
                self.binding = Binding::None;
            }

            ClientCommand::ResumeGame { code } => {
                if !matches!(&self.binding, Binding::Host(bound) if *bound == code) {
                    self.ensure_unbound()?;
                }
                let host = self.user_id()?.clone();
                let status = rooms
                    .resume(&code, &host, self.conn_id, self.events.clone())
                    .await?;
                tracing::info!(room = %code, %status, "host reattached");
                self.binding = Binding::Host(code.clone());
                let state = rooms.state(&code, &host).await?;
                self.reply(ServerEvent::RoomState { state });
            }

            ClientCommand::RoomSummary { code } => {
                let summary = rooms.summary(&code).await?;
                self.reply(ServerEvent::RoomSummary { summary });
            }

            ClientCommand::RoomState { code } => {
                let host = self.user_id()?.clone();
                let state = rooms.state(&code, &host).await?;
                self.reply(ServerEvent::RoomState { state });
            }
        }
        Ok(())
    }

    /// Tells the room this connection is gone.
    async fn detach(&mut self) {
        let rooms = &self.state.rooms;
        match std::mem::replace(&mut self.binding, Binding::None) {
            Binding::Host(code) => {
                tracing::info!(room = %code, conn = %self.conn_id, "host connection lost");
                rooms.host_disconnected(&code, self.conn_id).await;
            }
            Binding::Player { code, player } => {
                tracing::debug!(room = %code, %player, "player connection lost");
                rooms.disconnected(&code, player, self.conn_id).await;
            }
            Binding::None => {}
        }
    }
}

/// Drains the connection's event channel onto the socket, numbering each
/// envelope.
fn spawn_writer<A, C>(
    conn: Arc<WebSocketConnection>,
    state: Arc<ServerState<A, C>>,
    mut rx: mpsc::UnboundedReceiver<ServerEvent>,
) -> JoinHandle<()>
where
    A: Authenticator,
    C: Codec,
{
    tokio::spawn(async move {
        let mut seq: u64 = 1;
        while let Some(event) = rx.recv().await {
            let envelope = Envelope {
                seq: next_seq(&mut seq),
                timestamp: now_ms(),
                payload: Payload::Event(event),
            };
            let bytes = match state.codec.encode(&envelope) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(conn = %conn.id(), error = %e, "failed to encode event");
                    continue;
                }
            };
            if let Err(e) = conn.send(&bytes).await {
                tracing::debug!(conn = %conn.id(), error = %e, "send failed, stopping writer");
                break;
            }
        }
    })
}

/// Sends an event outside the writer task (handshake phase, seq 0).
async fn send_direct(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    event: ServerEvent,
) -> Result<(), QuizliveError> {
    let envelope = Envelope {
        seq: 0,
        timestamp: now_ms(),
        payload: Payload::Event(event),
    };
    let bytes = codec.encode(&envelope)?;
    conn.send(&bytes).await?;
    Ok(())
}

fn invalid(message: &str) -> ServerEvent {
    ServerEvent::error(ErrorKind::InvalidPayload, message)
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}
