//! Room actor: one Tokio task per room that owns its [`SessionAggregate`].
//!
//! Every mutation (joins, answers, countdown ticks, phase changes, host
//! pause and resume) arrives as a command or a timer firing inside the
//! same `select!` loop, so they are applied strictly one at a time. Events
//! go out through each subscriber's unbounded channel in the order they
//! are emitted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use quizlive_protocol::{
    AnswerPayload, PlayerId, PlayerView, QuestionId, QuestionResult, RoomCode,
    RoomStateView, RoomStatus, RoomSummary, ServerEvent, UserId,
};
use quizlive_store::{now_ms, SessionAggregate, SessionStore};
use quizlive_tick::{Alarm, Countdown, CountdownTick};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::roster::{resolve_join, JoinRequest};
use crate::{gameplay, EngineConfig, RoomError};

/// Counter for telling apart successive actors for the same code.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Identifies one socket. A player who reconnects gets a new one, so a
/// late disconnect from the old socket can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

/// Channel the room pushes events into for one connection.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// A successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinAccepted {
    pub player: PlayerView,
    /// `true` when an existing seat was taken back.
    pub is_reconnect: bool,
}

pub(crate) enum RoomCommand {
    Join {
        request: JoinRequest,
        conn: ConnectionId,
        sender: EventSender,
        reply: oneshot::Sender<Result<JoinAccepted, RoomError>>,
    },
    ToggleReady {
        player: PlayerId,
        reply: oneshot::Sender<Result<bool, RoomError>>,
    },
    Leave {
        player: PlayerId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    /// The player's socket dropped. Ignored if the player has since
    /// reconnected on another connection.
    Disconnected { player: PlayerId, conn: ConnectionId },
    Start {
        host: UserId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Answer {
        player: PlayerId,
        question_id: QuestionId,
        answer: AnswerPayload,
        elapsed_ms: u64,
        reply: oneshot::Sender<Result<QuestionResult, RoomError>>,
    },
    /// Host (re)attaches; resumes a paused game.
    Resume {
        host: UserId,
        conn: ConnectionId,
        sender: EventSender,
        reply: oneshot::Sender<Result<RoomStatus, RoomError>>,
    },
    HostDisconnected { conn: ConnectionId },
    Summary {
        reply: oneshot::Sender<RoomSummary>,
    },
    State {
        host: UserId,
        reply: oneshot::Sender<Result<RoomStateView, RoomError>>,
    },
    Close {
        host: UserId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
}

/// Handle to a running room actor. Cheap to clone.
#[derive(Clone)]
pub(crate) struct RoomHandle {
    code: RoomCode,
    generation: u64,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), RoomError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(make(reply_tx)).await?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }

    pub(crate) async fn join(
        &self,
        request: JoinRequest,
        conn: ConnectionId,
        sender: EventSender,
    ) -> Result<JoinAccepted, RoomError> {
        self.request(|reply| RoomCommand::Join {
            request,
            conn,
            sender,
            reply,
        })
        .await?
    }

    pub(crate) async fn toggle_ready(&self, player: PlayerId) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::ToggleReady { player, reply })
            .await?
    }

    pub(crate) async fn leave(&self, player: PlayerId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Leave { player, reply })
            .await?
    }

    pub(crate) async fn disconnected(
        &self,
        player: PlayerId,
        conn: ConnectionId,
    ) -> Result<(), RoomError> {
        self.send(RoomCommand::Disconnected { player, conn }).await
    }

    pub(crate) async fn start(&self, host: UserId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Start { host, reply })
            .await?
    }

    pub(crate) async fn submit_answer(
        &self,
        player: PlayerId,
        question_id: QuestionId,
        answer: AnswerPayload,
        elapsed_ms: u64,
    ) -> Result<QuestionResult, RoomError> {
        self.request(|reply| RoomCommand::Answer {
            player,
            question_id,
            answer,
            elapsed_ms,
            reply,
        })
        .await?
    }

    pub(crate) async fn resume(
        &self,
        host: UserId,
        conn: ConnectionId,
        sender: EventSender,
    ) -> Result<RoomStatus, RoomError> {
        self.request(|reply| RoomCommand::Resume {
            host,
            conn,
            sender,
            reply,
        })
        .await?
    }

    pub(crate) async fn host_disconnected(&self, conn: ConnectionId) -> Result<(), RoomError> {
        self.send(RoomCommand::HostDisconnected { conn }).await
    }

    pub(crate) async fn summary(&self) -> Result<RoomSummary, RoomError> {
        self.request(|reply| RoomCommand::Summary { reply }).await
    }

    pub(crate) async fn state(&self, host: UserId) -> Result<RoomStateView, RoomError> {
        self.request(|reply| RoomCommand::State { host, reply })
            .await?
    }

    pub(crate) async fn close(&self, host: UserId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Close { host, reply })
            .await?
    }
}

/// What a countdown is counting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tick {
    PreGame,
    Question(QuestionId),
}

/// One-shot phase transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Intake closed; show results next.
    Grace,
    /// Results were on screen long enough; advance.
    Results,
    /// The get-ready interstitial is over; open the next question.
    GetReady,
    /// The finished room has lingered long enough; stop.
    Linger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

struct Subscriber {
    conn: ConnectionId,
    sender: EventSender,
}

/// Everything a spawned actor needs from the manager.
pub(crate) struct RoomContext {
    pub(crate) store: Arc<SessionStore>,
    pub(crate) config: EngineConfig,
    pub(crate) rooms: Arc<DashMap<RoomCode, RoomHandle>>,
}

struct RoomActor {
    agg: SessionAggregate,
    store: Arc<SessionStore>,
    config: EngineConfig,
    rooms: Arc<DashMap<RoomCode, RoomHandle>>,
    generation: u64,
    subscribers: HashMap<PlayerId, Subscriber>,
    host: Option<Subscriber>,
    countdown: Countdown<Tick>,
    alarm: Alarm<Step>,
    /// Runs while the host is away. Closes the room once the cache entry
    /// would have expired.
    expiry: Alarm<()>,
    /// Joined while the game was paused with a question open.
    missed_question: HashSet<PlayerId>,
    /// Set for rooms rebuilt from the cache: the aggregate survived but the
    /// timers did not, so resuming must restart the current phase.
    timers_lost: bool,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    async fn run(mut self) {
        let code = self.agg.code().clone();
        info!(room = %code, status = %self.agg.status(), "room actor started");
        if self.host.is_none() && self.agg.status() != RoomStatus::Finished {
            self.expiry.set((), self.store.ttl());
        }
        self.persist().await;

        loop {
            let flow = tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => Flow::Stop,
                },
                tick = self.countdown.wait_for_tick() => {
                    self.on_tick(tick).await;
                    Flow::Continue
                }
                step = self.alarm.wait() => self.on_step(step).await,
                () = self.expiry.wait() => {
                    info!(room = %code, "host did not return, expiring room");
                    self.close("session expired").await;
                    Flow::Stop
                }
            };
            if flow == Flow::Stop {
                break;
            }
        }

        let generation = self.generation;
        self.rooms
            .remove_if(&code, |_, handle| handle.generation == generation);
        info!(room = %code, "room actor stopped");
    }

    async fn handle(&mut self, cmd: RoomCommand) -> Flow {
        match cmd {
            RoomCommand::Join {
                request,
                conn,
                sender,
                reply,
            } => {
                let result = self.handle_join(request, conn, sender).await;
                let _ = reply.send(result);
            }
            RoomCommand::ToggleReady { player, reply } => {
                let result = self.handle_toggle_ready(player).await;
                let _ = reply.send(result);
            }
            RoomCommand::Leave { player, reply } => {
                let result = self.handle_leave(player).await;
                let _ = reply.send(result);
            }
            RoomCommand::Disconnected { player, conn } => {
                self.handle_disconnected(player, conn).await;
            }
            RoomCommand::Start { host, reply } => {
                let result = self.handle_start(&host).await;
                let _ = reply.send(result);
            }
            RoomCommand::Answer {
                player,
                question_id,
                answer,
                elapsed_ms,
                reply,
            } => {
                let result = self
                    .handle_answer(player, question_id, answer, elapsed_ms)
                    .await;
                let _ = reply.send(result);
            }
            RoomCommand::Resume {
                host,
                conn,
                sender,
                reply,
            } => {
                let result = self.handle_resume(&host, conn, sender).await;
                let _ = reply.send(result);
            }
            RoomCommand::HostDisconnected { conn } => {
                return self.handle_host_disconnected(conn).await;
            }
            RoomCommand::Summary { reply } => {
                let _ = reply.send(self.agg.summary());
            }
            RoomCommand::State { host, reply } => {
                let result = self.check_host(&host).map(|()| self.agg.state_view());
                let _ = reply.send(result);
            }
            RoomCommand::Close { host, reply } => {
                if let Err(e) = self.check_host(&host) {
                    let _ = reply.send(Err(e));
                    return Flow::Continue;
                }
                self.close("closed by host").await;
                let _ = reply.send(Ok(()));
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    // -----------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------

    async fn handle_join(
        &mut self,
        request: JoinRequest,
        conn: ConnectionId,
        sender: EventSender,
    ) -> Result<JoinAccepted, RoomError> {
        let outcome = resolve_join(&mut self.agg, &request, now_ms())?;
        let player = self
            .agg
            .player(outcome.player_id)
            .map(|p| p.view())
            .ok_or(RoomError::PlayerNotFound(outcome.player_id))?;

        let _ = sender.send(ServerEvent::Joined {
            code: self.agg.code().clone(),
            player: player.clone(),
            is_reconnect: outcome.is_reconnect,
            status: self.agg.status(),
            players: self.agg.player_views(),
        });
        if self.agg.status() == RoomStatus::Active
            && self.agg.accepting_answers
            && let Some((event, _)) = gameplay::question_event(&self.agg)
        {
            let _ = sender.send(event);
        }
        if self.agg.status() == RoomStatus::Paused && self.agg.accepting_answers {
            self.missed_question.insert(outcome.player_id);
        }
        self.subscribers
            .insert(outcome.player_id, Subscriber { conn, sender });

        info!(
            room = %self.agg.code(),
            player_id = %outcome.player_id,
            %conn,
            is_reconnect = outcome.is_reconnect,
            connected = self.agg.connected_count(),
            "player joined"
        );
        self.broadcast_except(
            outcome.player_id,
            ServerEvent::PlayerJoined {
                player: player.clone(),
                is_reconnect: outcome.is_reconnect,
            },
        );
        self.persist().await;

        Ok(JoinAccepted {
            player,
            is_reconnect: outcome.is_reconnect,
        })
    }

    async fn handle_toggle_ready(&mut self, player_id: PlayerId) -> Result<bool, RoomError> {
        if self.agg.status() != RoomStatus::Lobby {
            return Err(RoomError::InvalidState(format!(
                "cannot change readiness while {}",
                self.agg.status()
            )));
        }
        let player = self
            .agg
            .player_mut(player_id)
            .ok_or(RoomError::PlayerNotFound(player_id))?;
        player.ready = !player.ready;
        let ready = player.ready;

        self.broadcast(ServerEvent::PlayerReady { player_id, ready });
        self.persist().await;
        Ok(ready)
    }

    async fn handle_leave(&mut self, player_id: PlayerId) -> Result<(), RoomError> {
        let player = self
            .agg
            .player_mut(player_id)
            .ok_or(RoomError::PlayerNotFound(player_id))?;
        player.connected = false;
        player.ready = false;
        self.subscribers.remove(&player_id);

        info!(room = %self.agg.code(), %player_id, "player left");
        self.broadcast(ServerEvent::PlayerLeft { player_id });
        self.maybe_end_early();
        self.persist().await;
        Ok(())
    }

    async fn handle_disconnected(&mut self, player_id: PlayerId, conn: ConnectionId) {
        match self.subscribers.get(&player_id) {
            Some(sub) if sub.conn == conn => {}
            _ => {
                debug!(room = %self.agg.code(), %player_id, %conn, "stale disconnect ignored");
                return;
            }
        }
        self.subscribers.remove(&player_id);
        if let Some(player) = self.agg.player_mut(player_id) {
            player.connected = false;
        }

        info!(room = %self.agg.code(), %player_id, %conn, "player disconnected");
        self.broadcast(ServerEvent::PlayerDisconnected { player_id });
        self.maybe_end_early();
        self.persist().await;
    }

    // -----------------------------------------------------------------
    // Host controls
    // -----------------------------------------------------------------

    fn check_host(&self, user_id: &UserId) -> Result<(), RoomError> {
        match &self.agg.room.host.user_id {
            Some(host) if host == user_id => Ok(()),
            _ => Err(RoomError::NotHost),
        }
    }

    async fn handle_start(&mut self, host: &UserId) -> Result<(), RoomError> {
        self.check_host(host)?;
        if self.agg.status() != RoomStatus::Lobby {
            return Err(RoomError::InvalidState(format!(
                "cannot start a game that is {}",
                self.agg.status()
            )));
        }
        if self.agg.connected_count() == 0 {
            return Err(RoomError::InsufficientPlayers);
        }

        let set = self
            .store
            .question_set(&self.agg.room.question_set_id)
            .await?;
        gameplay::initialize(&mut self.agg, set.questions);
        self.agg.room.status = RoomStatus::Starting;

        info!(
            room = %self.agg.code(),
            questions = self.agg.questions.len(),
            players = self.agg.connected_count(),
            "game starting"
        );
        self.broadcast_status();
        self.begin_countdown().await;
        self.persist().await;
        Ok(())
    }

    async fn handle_resume(
        &mut self,
        host: &UserId,
        conn: ConnectionId,
        sender: EventSender,
    ) -> Result<RoomStatus, RoomError> {
        self.check_host(host)?;
        self.host = Some(Subscriber { conn, sender });
        self.expiry.cancel();

        if self.agg.status() != RoomStatus::Paused {
            return Ok(self.agg.status());
        }

        let status = self.agg.room.paused_from.take().unwrap_or(RoomStatus::Active);
        self.agg.room.status = status;
        info!(room = %self.agg.code(), %status, "game resumed");
        self.broadcast(ServerEvent::GameResumed { status });
        self.broadcast_status();

        let missed = std::mem::take(&mut self.missed_question);
        if self.timers_lost {
            self.timers_lost = false;
            self.restart_phase().await;
        } else {
            if self.agg.accepting_answers
                && let Some((event, _)) = gameplay::question_event(&self.agg)
            {
                for player_id in missed {
                    self.send_to(player_id, event.clone());
                }
            }
            self.countdown.resume();
            self.alarm.resume();
        }
        self.persist().await;
        Ok(self.agg.status())
    }

    async fn handle_host_disconnected(&mut self, conn: ConnectionId) -> Flow {
        match &self.host {
            Some(host) if host.conn == conn => self.host = None,
            _ => return Flow::Continue,
        }

        match self.agg.status() {
            RoomStatus::Lobby => {
                info!(room = %self.agg.code(), "host left the lobby");
                self.close("host left").await;
                Flow::Stop
            }
            status @ (RoomStatus::Starting | RoomStatus::Active) => {
                self.countdown.pause();
                self.alarm.pause();
                self.agg.room.paused_from = Some(status);
                self.agg.room.status = RoomStatus::Paused;
                self.expiry.set((), self.store.ttl());
                info!(room = %self.agg.code(), from = %status, "host disconnected, game paused");
                self.broadcast(ServerEvent::GamePaused {
                    reason: "host disconnected".into(),
                });
                self.broadcast_status();
                self.persist().await;
                Flow::Continue
            }
            RoomStatus::Paused | RoomStatus::Finished => Flow::Continue,
        }
    }

    /// Notifies everyone, cancels timers and drops the cache entry.
    async fn close(&mut self, reason: &str) {
        self.countdown.cancel();
        self.alarm.cancel();
        self.expiry.cancel();
        info!(room = %self.agg.code(), reason, "room closed");
        self.broadcast(ServerEvent::RoomClosed {
            reason: reason.to_string(),
        });
        if let Err(e) = self.store.evict(self.agg.code()).await {
            warn!(room = %self.agg.code(), error = %e, "failed to evict closed room");
        }
    }

    // -----------------------------------------------------------------
    // Gameplay
    // -----------------------------------------------------------------

    async fn handle_answer(
        &mut self,
        player_id: PlayerId,
        question_id: QuestionId,
        answer: AnswerPayload,
        elapsed_ms: u64,
    ) -> Result<QuestionResult, RoomError> {
        let accepted = gameplay::submit_answer(
            &mut self.agg,
            player_id,
            question_id,
            answer,
            elapsed_ms,
            self.config.leaderboard_top_n,
            now_ms(),
        )
        .inspect_err(|e| {
            debug!(room = %self.agg.code(), %player_id, %question_id, error = %e, "answer rejected");
        })?;

        debug!(
            room = %self.agg.code(),
            %player_id,
            %question_id,
            correct = accepted.result.correct,
            points = accepted.result.breakdown.total,
            "answer accepted"
        );
        self.send_to(
            player_id,
            ServerEvent::AnswerAccepted {
                result: accepted.result.clone(),
            },
        );
        self.broadcast(accepted.leaderboard);
        self.store.record_answer(accepted.submission);
        self.store.record_totals(accepted.totals);
        self.maybe_end_early();
        self.persist().await;
        Ok(accepted.result)
    }

    /// Either runs the pre-game countdown or, when it is configured to
    /// zero, goes straight to the first question.
    async fn begin_countdown(&mut self) {
        self.broadcast(ServerEvent::GameStarting {
            seconds: self.config.countdown_secs,
            total_questions: self.agg.questions.len(),
        });
        if self.config.countdown_secs == 0 {
            self.begin_game().await;
        } else {
            self.countdown.start(Tick::PreGame, self.config.countdown_secs);
        }
    }

    async fn begin_game(&mut self) {
        if self.agg.questions.is_empty() {
            self.finish().await;
            return;
        }
        self.agg.room.status = RoomStatus::Active;
        self.broadcast(ServerEvent::GameStarted {
            total_questions: self.agg.questions.len(),
        });
        self.broadcast_status();
        self.send_question().await;
    }

    async fn send_question(&mut self) {
        let Some((event, limit)) = gameplay::open_question(&mut self.agg, now_ms()) else {
            self.finish().await;
            return;
        };
        let Some(question_id) = self.agg.current_question().map(|q| q.id) else {
            self.finish().await;
            return;
        };
        debug!(
            room = %self.agg.code(),
            %question_id,
            index = self.agg.current_index,
            limit,
            "question opened"
        );
        self.broadcast(event);
        self.countdown.start(Tick::Question(question_id), limit);
        self.persist().await;
    }

    async fn on_tick(&mut self, tick: CountdownTick<Tick>) {
        match tick.tag {
            Tick::PreGame => {
                self.broadcast(ServerEvent::CountdownTick {
                    remaining: tick.remaining,
                });
                if tick.is_last() {
                    self.begin_game().await;
                    self.persist().await;
                }
            }
            Tick::Question(question_id) => {
                if self.agg.current_question().map(|q| q.id) != Some(question_id) {
                    warn!(room = %self.agg.code(), %question_id, "tick for a stale question");
                    return;
                }
                self.broadcast(ServerEvent::TimerTick {
                    question_id,
                    remaining: tick.remaining,
                });
                if tick.is_last() {
                    gameplay::close_intake(&mut self.agg);
                    debug!(room = %self.agg.code(), %question_id, "question timed out");
                    self.broadcast(ServerEvent::QuestionTimeout { question_id });
                    self.alarm.set(Step::Grace, self.config.timeout_grace);
                    self.persist().await;
                }
            }
        }
    }

    /// Closes the question once every connected player has answered.
    fn maybe_end_early(&mut self) {
        if !self.config.end_early
            || self.agg.status() != RoomStatus::Active
            || !self.agg.accepting_answers
            || !gameplay::all_answered(&self.agg)
        {
            return;
        }
        self.countdown.cancel();
        gameplay::close_intake(&mut self.agg);
        debug!(room = %self.agg.code(), "everyone answered, closing question early");
        self.alarm.set(Step::Grace, self.config.timeout_grace);
    }

    async fn on_step(&mut self, step: Step) -> Flow {
        match step {
            Step::Grace => {
                if let Some(event) =
                    gameplay::question_results(&self.agg, self.config.leaderboard_top_n)
                {
                    self.broadcast(event);
                }
                self.alarm.set(Step::Results, self.config.results_display);
            }
            Step::Results => {
                if gameplay::advance(&mut self.agg) {
                    self.broadcast(ServerEvent::GetReady {
                        next_index: self.agg.current_index,
                        seconds: self.config.get_ready_secs,
                    });
                    self.alarm.set(
                        Step::GetReady,
                        Duration::from_secs(u64::from(self.config.get_ready_secs)),
                    );
                    self.persist().await;
                } else {
                    self.finish().await;
                }
            }
            Step::GetReady => self.send_question().await,
            Step::Linger => return Flow::Stop,
        }
        Flow::Continue
    }

    async fn finish(&mut self) {
        self.countdown.cancel();
        self.alarm.cancel();
        self.expiry.cancel();
        let (event, results) = gameplay::finish(&mut self.agg, now_ms());

        info!(room = %self.agg.code(), players = results.len(), "game finished");
        for result in results {
            self.store.record_result(result);
        }
        self.broadcast_status();
        self.broadcast(event);
        if let Err(e) = self.store.evict(self.agg.code()).await {
            warn!(room = %self.agg.code(), error = %e, "failed to release finished room");
        }
        self.alarm.set(Step::Linger, self.config.finished_linger);
    }

    /// Restarts the phase a rehydrated room was in when its timers were
    /// lost. Answers already given to an open question are kept.
    async fn restart_phase(&mut self) {
        match self.agg.status() {
            RoomStatus::Starting => self.begin_countdown().await,
            RoomStatus::Active if self.agg.accepting_answers => {
                match gameplay::question_event(&self.agg) {
                    Some((event, limit)) => {
                        let question_id = self.agg.current_question().map(|q| q.id);
                        self.broadcast(event);
                        if let Some(question_id) = question_id {
                            self.countdown.start(Tick::Question(question_id), limit);
                        }
                    }
                    None => self.finish().await,
                }
            }
            RoomStatus::Active if self.agg.question_started_at_ms.is_some() => {
                self.alarm.set(Step::Grace, Duration::ZERO);
            }
            RoomStatus::Active => self.send_question().await,
            _ => {}
        }
    }

    // -----------------------------------------------------------------
    // Fan-out
    // -----------------------------------------------------------------

    fn broadcast(&self, event: ServerEvent) {
        for sub in self.subscribers.values() {
            let _ = sub.sender.send(event.clone());
        }
        if let Some(host) = &self.host {
            let _ = host.sender.send(event);
        }
    }

    fn broadcast_except(&self, excluded: PlayerId, event: ServerEvent) {
        for (id, sub) in &self.subscribers {
            if *id != excluded {
                let _ = sub.sender.send(event.clone());
            }
        }
        if let Some(host) = &self.host {
            let _ = host.sender.send(event);
        }
    }

    fn broadcast_status(&self) {
        self.broadcast(ServerEvent::RoomUpdated {
            status: self.agg.status(),
            connected_players: self.agg.connected_count(),
        });
    }

    fn send_to(&self, player_id: PlayerId, event: ServerEvent) {
        if let Some(sub) = self.subscribers.get(&player_id) {
            let _ = sub.sender.send(event);
        }
    }

    /// Mirrors the aggregate to the shared cache. A finished room has
    /// already been released and is not written back.
    async fn persist(&self) {
        if self.agg.status() == RoomStatus::Finished {
            return;
        }
        if let Err(e) = self.store.save(&self.agg).await {
            warn!(room = %self.agg.code(), error = %e, "failed to persist room");
        }
    }
}

/// Spawns an actor for `agg` and returns its handle.
///
/// The actor writes the aggregate to the cache before taking commands.
/// `host` is the host's connection at creation time, if any. Set
/// `timers_lost` for aggregates loaded back from the cache.
pub(crate) fn spawn_room(
    agg: SessionAggregate,
    ctx: RoomContext,
    host: Option<(ConnectionId, EventSender)>,
    timers_lost: bool,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(ctx.config.channel_size.max(1));
    let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
    let code = agg.code().clone();

    let actor = RoomActor {
        agg,
        store: ctx.store,
        config: ctx.config,
        rooms: ctx.rooms,
        generation,
        subscribers: HashMap::new(),
        host: host.map(|(conn, sender)| Subscriber { conn, sender }),
        countdown: Countdown::new(),
        alarm: Alarm::new(),
        expiry: Alarm::new(),
        missed_question: HashSet::new(),
        timers_lost,
        receiver: rx,
    };
    tokio::spawn(actor.run());

    RoomHandle {
        code,
        generation,
        sender: tx,
    }
}
