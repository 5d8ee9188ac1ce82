//! Integration tests for the room system: real actors, in-memory store,
//! paused Tokio clock.

use std::sync::Arc;
use std::time::Duration;

use quizlive_protocol::{
    AccessMode, AnswerPayload, CorrectAnswer, ErrorKind, PlayerId, Question, QuestionId,
    QuestionKind, QuestionSetId, RoomCode, RoomSettings, RoomStatus, RosterId, ServerEvent,
    UserId,
};
use quizlive_room::{
    ConnectionId, EngineConfig, JoinRequest, NewRoom, RoomError, RoomManager,
};
use quizlive_store::{
    HostInfo, MemoryCache, MemoryCatalog, MemoryHistory, QuestionSet, RosterMember,
    SessionStore, StoreConfig,
};
use tokio::sync::mpsc;

type Events = mpsc::UnboundedReceiver<ServerEvent>;

// =========================================================================
// Fixtures
// =========================================================================

fn question(id: u64, correct: &str) -> Question {
    Question {
        id: QuestionId(id),
        position: id as u32,
        prompt: format!("Question {id}"),
        media: None,
        kind: QuestionKind::SingleChoice,
        options: vec!["a".into(), "b".into(), "c".into()],
        correct: CorrectAnswer::Choices(vec![correct.into()]),
        time_limit_secs: Some(10),
        points: 1000,
        explanation: None,
    }
}

fn catalog() -> MemoryCatalog {
    MemoryCatalog::new()
        .with_set(QuestionSet {
            id: QuestionSetId("geo".into()),
            title: "Geography".into(),
            questions: vec![question(1, "1"), question(2, "2")],
        })
        .with_set(QuestionSet {
            id: QuestionSetId("empty".into()),
            title: "Nothing here".into(),
            questions: vec![],
        })
        .with_roster(
            RosterId("7b".into()),
            vec![
                RosterMember {
                    user_id: UserId("u-ada".into()),
                    display_name: "Ada".into(),
                    avatar: "fox".into(),
                },
                RosterMember {
                    user_id: UserId("u-bob".into()),
                    display_name: "Bob".into(),
                    avatar: String::new(),
                },
            ],
        )
        .with_roster(
            RosterId("dup".into()),
            vec![
                RosterMember {
                    user_id: UserId("u-ada".into()),
                    display_name: "Ada".into(),
                    avatar: String::new(),
                },
                RosterMember {
                    user_id: UserId("u-ada".into()),
                    display_name: "Ada Lovelace".into(),
                    avatar: String::new(),
                },
            ],
        )
}

struct Harness {
    manager: RoomManager,
    cache: Arc<MemoryCache>,
    history: Arc<MemoryHistory>,
}

fn harness_with(config: EngineConfig, cache: Arc<MemoryCache>) -> Harness {
    let history = Arc::new(MemoryHistory::new());
    let store = SessionStore::spawn(
        cache.clone(),
        history.clone(),
        Arc::new(catalog()),
        StoreConfig::default(),
    );
    Harness {
        manager: RoomManager::new(Arc::new(store), config),
        cache,
        history,
    }
}

fn harness() -> Harness {
    harness_with(EngineConfig::default(), Arc::new(MemoryCache::new()))
}

fn host() -> UserId {
    UserId("quizmaster".into())
}

fn new_room(set: &str) -> NewRoom {
    NewRoom {
        host: HostInfo {
            user_id: Some(host()),
            display_name: "Ms. Frizzle".into(),
        },
        question_set_id: QuestionSetId(set.into()),
        settings: RoomSettings::default(),
        access_mode: AccessMode::Open,
        roster_id: None,
    }
}

const HOST_CONN: ConnectionId = ConnectionId(1);

async fn create(h: &Harness, room: NewRoom) -> (RoomCode, Events) {
    let (tx, rx) = mpsc::unbounded_channel();
    let created = h.manager.create_room(room, HOST_CONN, tx).await.unwrap();
    (created.record.code, rx)
}

async fn join(h: &Harness, code: &RoomCode, name: &str, conn: u64) -> (PlayerId, Events) {
    let (tx, rx) = mpsc::unbounded_channel();
    let joined = h
        .manager
        .join_room(code, JoinRequest::named(name), ConnectionId(conn), tx)
        .await
        .unwrap();
    (joined.player.id, rx)
}

/// Receives events until one matches, failing after a minute of (paused)
/// time.
async fn expect(rx: &mut Events, what: &str, pred: impl Fn(&ServerEvent) -> bool) -> ServerEvent {
    let found = tokio::time::timeout(Duration::from_secs(60), async {
        while let Some(event) = rx.recv().await {
            if pred(&event) {
                return Some(event);
            }
        }
        None
    })
    .await;
    match found {
        Ok(Some(event)) => event,
        Ok(None) => panic!("channel closed while waiting for {what}"),
        Err(_) => panic!("timed out waiting for {what}"),
    }
}

async fn expect_question(rx: &mut Events) -> QuestionId {
    match expect(rx, "question_new", |e| matches!(e, ServerEvent::QuestionNew { .. })).await {
        ServerEvent::QuestionNew { question, .. } => question.id,
        _ => unreachable!(),
    }
}

fn drain(rx: &mut Events) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    panic!("condition never became true");
}

// =========================================================================
// Creation and lobby
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_create_room_sends_room_created_to_host() {
    let h = harness();
    let (code, mut host_rx) = create(&h, new_room("geo")).await;

    match host_rx.recv().await.unwrap() {
        ServerEvent::RoomCreated { code: c, placeholders } => {
            assert_eq!(c, code);
            assert!(placeholders.is_empty());
        }
        other => panic!("expected room_created, got {other:?}"),
    }
    assert_eq!(code.as_str().len(), RoomCode::LEN);
    assert!(h.manager.contains(&code));

    let summary = h.manager.summary(&code).await.unwrap();
    assert_eq!(summary.title, "Geography");
    assert_eq!(summary.host_name, "Ms. Frizzle");
    assert_eq!(summary.status, RoomStatus::Lobby);
}

#[tokio::test(start_paused = true)]
async fn test_create_room_anonymous_host_is_rejected() {
    let h = harness();
    let mut room = new_room("geo");
    room.host.user_id = None;
    let (tx, _rx) = mpsc::unbounded_channel();
    let err = h.manager.create_room(room, HOST_CONN, tx).await.unwrap_err();
    assert!(matches!(err, RoomError::NotHost));
}

#[tokio::test(start_paused = true)]
async fn test_create_room_unknown_set_is_not_found() {
    let h = harness();
    let (tx, _rx) = mpsc::unbounded_channel();
    let err = h
        .manager
        .create_room(new_room("history"), HOST_CONN, tx)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.manager.room_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_join_broadcasts_and_summary_counts() {
    let h = harness();
    let (code, mut host_rx) = create(&h, new_room("geo")).await;
    let (ada, mut ada_rx) = join(&h, &code, "Ada", 10).await;

    match ada_rx.recv().await.unwrap() {
        ServerEvent::Joined {
            player,
            is_reconnect,
            status,
            ..
        } => {
            assert_eq!(player.id, ada);
            assert!(!is_reconnect);
            assert_eq!(status, RoomStatus::Lobby);
        }
        other => panic!("expected joined, got {other:?}"),
    }
    expect(&mut host_rx, "player_joined", |e| {
        matches!(e, ServerEvent::PlayerJoined { player, .. } if player.id == ada)
    })
    .await;

    assert_eq!(h.manager.summary(&code).await.unwrap().player_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_join_connected_duplicate_name_conflicts() {
    let h = harness();
    let (code, _host_rx) = create(&h, new_room("geo")).await;
    let (_ada, _ada_rx) = join(&h, &code, "Ada", 10).await;

    let (tx, _rx) = mpsc::unbounded_channel();
    let err = h
        .manager
        .join_room(&code, JoinRequest::named(" ada "), ConnectionId(11), tx)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test(start_paused = true)]
async fn test_join_unknown_room_is_not_found() {
    let h = harness();
    let (tx, _rx) = mpsc::unbounded_channel();
    let code = RoomCode::parse("ZZZZ99").unwrap();
    let err = h
        .manager
        .join_room(&code, JoinRequest::named("Ada"), ConnectionId(1), tx)
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::NotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn test_set_ready_toggles() {
    let h = harness();
    let (code, mut host_rx) = create(&h, new_room("geo")).await;
    let (ada, _ada_rx) = join(&h, &code, "Ada", 10).await;

    assert!(h.manager.set_ready(&code, ada).await.unwrap());
    expect(&mut host_rx, "player_ready", |e| {
        matches!(e, ServerEvent::PlayerReady { ready: true, .. })
    })
    .await;
    assert!(!h.manager.set_ready(&code, ada).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_by_name_restores_player_and_score() {
    let h = harness();
    let (code, _host_rx) = create(&h, new_room("geo")).await;
    let (ada, mut ada_rx) = join(&h, &code, "Ada", 10).await;
    let (_bob, _bob_rx) = join(&h, &code, "Bob", 11).await;
    h.manager.start(&code, &host()).await.unwrap();

    let q1 = expect_question(&mut ada_rx).await;
    let result = h
        .manager
        .submit_answer(&code, ada, q1, AnswerPayload::Choice("1".into()), 0)
        .await
        .unwrap();
    assert_eq!(result.total_score, 1500);

    h.manager.disconnected(&code, ada, ConnectionId(10)).await;
    let (tx, _rx) = mpsc::unbounded_channel();
    let back = h
        .manager
        .join_room(&code, JoinRequest::named("ADA"), ConnectionId(12), tx)
        .await
        .unwrap();
    assert_eq!(back.player.id, ada);
    assert!(back.is_reconnect);

    let state = h.manager.state(&code, &host()).await.unwrap();
    let row = state.leaderboard.iter().find(|r| r.player_id == ada).unwrap();
    assert_eq!(row.score, 1500);
}

#[tokio::test(start_paused = true)]
async fn test_stale_disconnect_is_ignored() {
    let h = harness();
    let (code, _host_rx) = create(&h, new_room("geo")).await;
    let (ada, _old_rx) = join(&h, &code, "Ada", 10).await;

    h.manager.leave(&code, ada).await.unwrap();
    let (tx, _new_rx) = mpsc::unbounded_channel();
    h.manager
        .join_room(&code, JoinRequest::named("Ada"), ConnectionId(20), tx)
        .await
        .unwrap();

    // The first socket closing late must not knock out the new one.
    h.manager.disconnected(&code, ada, ConnectionId(10)).await;
    assert_eq!(h.manager.summary(&code).await.unwrap().player_count, 1);
}

// =========================================================================
// Closed rooms
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_closed_room_placeholders_and_identity() {
    let h = harness();
    let mut room = new_room("geo");
    room.access_mode = AccessMode::Closed;
    room.roster_id = Some(RosterId("7b".into()));
    let (tx, _host_rx) = mpsc::unbounded_channel();
    let created = h.manager.create_room(room, HOST_CONN, tx).await.unwrap();
    let code = created.record.code;
    assert_eq!(created.placeholders.len(), 2);
    assert!(created.placeholders.iter().all(|p| !p.connected));

    let request = JoinRequest::named("Ada").with_user(UserId("u-ada".into()));
    let (tx, _rx1) = mpsc::unbounded_channel();
    let first = h
        .manager
        .join_room(&code, request.clone(), ConnectionId(10), tx)
        .await
        .unwrap();
    assert!(!first.is_reconnect);

    let (tx, _rx2) = mpsc::unbounded_channel();
    let second = h
        .manager
        .join_room(&code, request, ConnectionId(11), tx)
        .await
        .unwrap();
    assert_eq!(first.player.id, second.player.id);

    let (tx, _rx3) = mpsc::unbounded_channel();
    let err = h
        .manager
        .join_room(&code, JoinRequest::named("Mallory"), ConnectionId(12), tx)
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::JoinWindowClosed(_)));
}

#[tokio::test(start_paused = true)]
async fn test_closed_room_identity_cannot_hold_two_placeholders() {
    let h = harness();
    let mut room = new_room("geo");
    room.access_mode = AccessMode::Closed;
    room.roster_id = Some(RosterId("7b".into()));
    let (tx, _host_rx) = mpsc::unbounded_channel();
    let created = h.manager.create_room(room, HOST_CONN, tx).await.unwrap();
    let code = created.record.code;
    let ada_seat = created.placeholders[0].id;
    let bob_seat = created.placeholders[1].id;

    let ada = UserId("u-ada".into());
    let (tx, _rx1) = mpsc::unbounded_channel();
    let first = h
        .manager
        .join_room(
            &code,
            JoinRequest::named("Ada")
                .with_user(ada.clone())
                .with_placeholder(ada_seat),
            ConnectionId(10),
            tx,
        )
        .await
        .unwrap();
    let (tx, _rx2) = mpsc::unbounded_channel();
    let second = h
        .manager
        .join_room(
            &code,
            JoinRequest::named("Bob").with_user(ada).with_placeholder(bob_seat),
            ConnectionId(11),
            tx,
        )
        .await
        .unwrap();

    assert_eq!(first.player.id, ada_seat);
    assert_eq!(second.player.id, ada_seat);
    assert_eq!(h.manager.summary(&code).await.unwrap().player_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_closed_room_roster_deduplicated_by_identity() {
    let h = harness();
    let mut room = new_room("geo");
    room.access_mode = AccessMode::Closed;
    room.roster_id = Some(RosterId("dup".into()));
    let (tx, _host_rx) = mpsc::unbounded_channel();
    let created = h.manager.create_room(room, HOST_CONN, tx).await.unwrap();

    assert_eq!(created.placeholders.len(), 1);
    assert_eq!(created.placeholders[0].display_name, "Ada");
}

#[tokio::test(start_paused = true)]
async fn test_closed_room_without_roster_is_invalid() {
    let h = harness();
    let mut room = new_room("geo");
    room.access_mode = AccessMode::Closed;
    let (tx, _rx) = mpsc::unbounded_channel();
    let err = h.manager.create_room(room, HOST_CONN, tx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPayload);
}

// =========================================================================
// Starting
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_start_checks_host_players_and_state() {
    let h = harness();
    let (code, _host_rx) = create(&h, new_room("geo")).await;

    let err = h
        .manager
        .start(&code, &UserId("student".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::NotHost));

    let err = h.manager.start(&code, &host()).await.unwrap_err();
    assert!(matches!(err, RoomError::InsufficientPlayers));

    let (_ada, _ada_rx) = join(&h, &code, "Ada", 10).await;
    h.manager.start(&code, &host()).await.unwrap();
    let err = h.manager.start(&code, &host()).await.unwrap_err();
    assert!(matches!(err, RoomError::InvalidState(_)));
}

#[tokio::test(start_paused = true)]
async fn test_pre_game_countdown_sequence() {
    let h = harness();
    let (code, _host_rx) = create(&h, new_room("geo")).await;
    let (_ada, mut ada_rx) = join(&h, &code, "Ada", 10).await;
    h.manager.start(&code, &host()).await.unwrap();

    let mut ticks = Vec::new();
    loop {
        match expect(&mut ada_rx, "countdown", |e| {
            matches!(
                e,
                ServerEvent::GameStarting { .. }
                    | ServerEvent::CountdownTick { .. }
                    | ServerEvent::GameStarted { .. }
            )
        })
        .await
        {
            ServerEvent::GameStarting { seconds, total_questions } => {
                assert_eq!(seconds, 3);
                assert_eq!(total_questions, 2);
            }
            ServerEvent::CountdownTick { remaining } => ticks.push(remaining),
            ServerEvent::GameStarted { .. } => break,
            _ => unreachable!(),
        }
    }
    assert_eq!(ticks, vec![2, 1, 0]);
    expect_question(&mut ada_rx).await;
}

#[tokio::test(start_paused = true)]
async fn test_empty_question_set_finishes_immediately() {
    let h = harness();
    let (code, _host_rx) = create(&h, new_room("empty")).await;
    let (_ada, mut ada_rx) = join(&h, &code, "Ada", 10).await;
    h.manager.start(&code, &host()).await.unwrap();

    match expect(&mut ada_rx, "game_finished", |e| {
        matches!(e, ServerEvent::GameFinished { .. })
    })
    .await
    {
        ServerEvent::GameFinished { standings } => assert_eq!(standings.len(), 1),
        _ => unreachable!(),
    }
}

// =========================================================================
// Gameplay
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_full_game_flow() {
    let h = harness();
    let (code, mut host_rx) = create(&h, new_room("geo")).await;
    let (ada, mut ada_rx) = join(&h, &code, "Ada", 10).await;
    let (bob, mut bob_rx) = join(&h, &code, "Bob", 11).await;
    h.manager.start(&code, &host()).await.unwrap();

    // Question 1: both answer, the question closes early.
    let q1 = expect_question(&mut ada_rx).await;
    assert_eq!(expect_question(&mut bob_rx).await, q1);
    let ada_result = h
        .manager
        .submit_answer(&code, ada, q1, AnswerPayload::Choice("1".into()), 0)
        .await
        .unwrap();
    assert!(ada_result.correct);
    expect(&mut ada_rx, "answer_accepted", |e| {
        matches!(e, ServerEvent::AnswerAccepted { .. })
    })
    .await;
    let bob_result = h
        .manager
        .submit_answer(&code, bob, q1, AnswerPayload::Choice("0".into()), 3_000)
        .await
        .unwrap();
    assert!(!bob_result.correct);
    assert_eq!(bob_result.breakdown.total, 0);

    match expect(&mut host_rx, "question_results", |e| {
        matches!(e, ServerEvent::QuestionResults { .. })
    })
    .await
    {
        ServerEvent::QuestionResults { stats, leaderboard, .. } => {
            assert_eq!(stats.answered, 2);
            assert_eq!(stats.correct, 1);
            assert_eq!(stats.accuracy_pct, 50);
            assert_eq!(leaderboard[0].player_id, ada);
        }
        _ => unreachable!(),
    }
    expect(&mut host_rx, "get_ready", |e| {
        matches!(e, ServerEvent::GetReady { next_index: 1, seconds: 3 })
    })
    .await;

    // Question 2: nobody answers, it times out.
    let q2 = expect_question(&mut host_rx).await;
    assert_ne!(q1, q2);
    let mut last_tick = None;
    loop {
        match expect(&mut host_rx, "timer", |e| {
            matches!(
                e,
                ServerEvent::TimerTick { .. } | ServerEvent::QuestionTimeout { .. }
            )
        })
        .await
        {
            ServerEvent::TimerTick { remaining, .. } => last_tick = Some(remaining),
            ServerEvent::QuestionTimeout { question_id } => {
                assert_eq!(question_id, q2);
                break;
            }
            _ => unreachable!(),
        }
    }
    assert_eq!(last_tick, Some(0));

    let late = h
        .manager
        .submit_answer(&code, bob, q2, AnswerPayload::Choice("2".into()), 500)
        .await
        .unwrap_err();
    assert_eq!(late.kind(), ErrorKind::TimingViolation);

    match expect(&mut host_rx, "game_finished", |e| {
        matches!(e, ServerEvent::GameFinished { .. })
    })
    .await
    {
        ServerEvent::GameFinished { standings } => {
            assert_eq!(standings.len(), 2);
            assert_eq!(standings[0].player_id, ada);
            assert_eq!(standings[0].rank, 1);
            assert_eq!(standings[1].player_id, bob);
        }
        _ => unreachable!(),
    }

    h.manager.store().flush_history().await.unwrap();
    assert_eq!(h.history.answers().len(), 2);
    assert_eq!(h.history.results().len(), 2);
    assert_eq!(h.history.totals(&code, ada).unwrap().score, 1500);

    // Released from the cache at once, from memory after the linger.
    assert!(h.cache.is_empty());
    let manager = h.manager.clone();
    wait_until(move || !manager.contains(&code)).await;
}

#[tokio::test(start_paused = true)]
async fn test_second_answer_conflicts() {
    let h = harness();
    let (code, _host_rx) = create(&h, new_room("geo")).await;
    let (ada, mut ada_rx) = join(&h, &code, "Ada", 10).await;
    let (_bob, _bob_rx) = join(&h, &code, "Bob", 11).await;
    h.manager.start(&code, &host()).await.unwrap();

    let q1 = expect_question(&mut ada_rx).await;
    h.manager
        .submit_answer(&code, ada, q1, AnswerPayload::Choice("1".into()), 0)
        .await
        .unwrap();
    let err = h
        .manager
        .submit_answer(&code, ada, q1, AnswerPayload::Choice("1".into()), 0)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let state = h.manager.state(&code, &host()).await.unwrap();
    let row = state.leaderboard.iter().find(|r| r.player_id == ada).unwrap();
    assert_eq!(row.score, 1500);
    assert_eq!(row.answered, 1);
}

#[tokio::test(start_paused = true)]
async fn test_answer_for_wrong_question_is_not_found() {
    let h = harness();
    let (code, _host_rx) = create(&h, new_room("geo")).await;
    let (ada, mut ada_rx) = join(&h, &code, "Ada", 10).await;
    h.manager.start(&code, &host()).await.unwrap();
    expect_question(&mut ada_rx).await;

    let err = h
        .manager
        .submit_answer(&code, ada, QuestionId(2), AnswerPayload::Choice("2".into()), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::QuestionMismatch { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_answer_in_lobby_has_no_active_question() {
    let h = harness();
    let (code, _host_rx) = create(&h, new_room("geo")).await;
    let (ada, _ada_rx) = join(&h, &code, "Ada", 10).await;
    let err = h
        .manager
        .submit_answer(&code, ada, QuestionId(1), AnswerPayload::Choice("1".into()), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::NoActiveQuestion));
}

#[tokio::test(start_paused = true)]
async fn test_late_joiner_receives_open_question() {
    let h = harness();
    let (code, _host_rx) = create(&h, new_room("geo")).await;
    let (_ada, mut ada_rx) = join(&h, &code, "Ada", 10).await;
    h.manager.start(&code, &host()).await.unwrap();
    let q1 = expect_question(&mut ada_rx).await;

    let (late, mut late_rx) = join(&h, &code, "Late", 12).await;
    assert!(matches!(late_rx.recv().await, Some(ServerEvent::Joined { .. })));
    assert_eq!(expect_question(&mut late_rx).await, q1);

    let result = h
        .manager
        .submit_answer(&code, late, q1, AnswerPayload::Choice("1".into()), 0)
        .await
        .unwrap();
    assert!(result.correct);
}

// =========================================================================
// Host presence, pause and resume, close
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_host_disconnect_in_lobby_closes_room() {
    let h = harness();
    let (code, _host_rx) = create(&h, new_room("geo")).await;
    let (_ada, mut ada_rx) = join(&h, &code, "Ada", 10).await;

    h.manager.host_disconnected(&code, HOST_CONN).await;
    expect(&mut ada_rx, "room_closed", |e| {
        matches!(e, ServerEvent::RoomClosed { .. })
    })
    .await;

    let manager = h.manager.clone();
    let c = code.clone();
    wait_until(move || !manager.contains(&c)).await;
    let err = h.manager.summary(&code).await.unwrap_err();
    assert!(matches!(err, RoomError::NotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn test_host_disconnect_mid_game_pauses_until_resume() {
    let h = harness();
    let (code, _host_rx) = create(&h, new_room("geo")).await;
    let (ada, mut ada_rx) = join(&h, &code, "Ada", 10).await;
    let (_bob, _bob_rx) = join(&h, &code, "Bob", 11).await;
    h.manager.start(&code, &host()).await.unwrap();
    let q1 = expect_question(&mut ada_rx).await;

    h.manager.host_disconnected(&code, HOST_CONN).await;
    expect(&mut ada_rx, "game_paused", |e| {
        matches!(e, ServerEvent::GamePaused { .. })
    })
    .await;
    assert_eq!(h.manager.summary(&code).await.unwrap().status, RoomStatus::Paused);

    let err = h
        .manager
        .submit_answer(&code, ada, q1, AnswerPayload::Choice("1".into()), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::InvalidState(_)));

    // Frozen: a minute passes without a single tick.
    drain(&mut ada_rx);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(drain(&mut ada_rx).is_empty());

    let (tx, _new_host_rx) = mpsc::unbounded_channel();
    let status = h
        .manager
        .resume(&code, &host(), ConnectionId(2), tx)
        .await
        .unwrap();
    assert_eq!(status, RoomStatus::Active);
    expect(&mut ada_rx, "game_resumed", |e| {
        matches!(e, ServerEvent::GameResumed { status: RoomStatus::Active })
    })
    .await;
    expect(&mut ada_rx, "timer_tick", |e| {
        matches!(e, ServerEvent::TimerTick { question_id, .. } if *question_id == q1)
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_paused_game_expires_with_cache_ttl() {
    let h = harness();
    let (code, _host_rx) = create(&h, new_room("geo")).await;
    let (_ada, mut ada_rx) = join(&h, &code, "Ada", 10).await;
    h.manager.start(&code, &host()).await.unwrap();
    expect_question(&mut ada_rx).await;

    h.manager.host_disconnected(&code, HOST_CONN).await;
    expect(&mut ada_rx, "game_paused", |e| {
        matches!(e, ServerEvent::GamePaused { .. })
    })
    .await;

    tokio::time::sleep(StoreConfig::default().cache_ttl).await;
    expect(&mut ada_rx, "room_closed", |e| {
        matches!(e, ServerEvent::RoomClosed { reason } if reason == "session expired")
    })
    .await;

    let manager = h.manager.clone();
    let c = code.clone();
    wait_until(move || !manager.contains(&c)).await;
    let err = h.manager.summary(&code).await.unwrap_err();
    assert!(matches!(err, RoomError::NotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn test_resume_cancels_expiry() {
    let h = harness();
    let (code, _host_rx) = create(&h, new_room("geo")).await;
    let (_ada, mut ada_rx) = join(&h, &code, "Ada", 10).await;
    h.manager.start(&code, &host()).await.unwrap();
    expect_question(&mut ada_rx).await;

    h.manager.host_disconnected(&code, HOST_CONN).await;
    expect(&mut ada_rx, "game_paused", |e| {
        matches!(e, ServerEvent::GamePaused { .. })
    })
    .await;
    // Five seconds short of the TTL; the rest of the game takes longer.
    tokio::time::sleep(StoreConfig::default().cache_ttl - Duration::from_secs(5)).await;
    let (tx, _new_host_rx) = mpsc::unbounded_channel();
    h.manager
        .resume(&code, &host(), ConnectionId(2), tx)
        .await
        .unwrap();

    let end = expect(&mut ada_rx, "end of game", |e| {
        matches!(e, ServerEvent::GameFinished { .. } | ServerEvent::RoomClosed { .. })
    })
    .await;
    assert!(matches!(end, ServerEvent::GameFinished { .. }), "got {end:?}");
}

#[tokio::test(start_paused = true)]
async fn test_player_joining_during_pause_gets_question_on_resume() {
    let h = harness();
    let (code, _host_rx) = create(&h, new_room("geo")).await;
    let (_ada, mut ada_rx) = join(&h, &code, "Ada", 10).await;
    h.manager.start(&code, &host()).await.unwrap();
    let q1 = expect_question(&mut ada_rx).await;

    h.manager.host_disconnected(&code, HOST_CONN).await;
    expect(&mut ada_rx, "game_paused", |e| {
        matches!(e, ServerEvent::GamePaused { .. })
    })
    .await;

    let (_late, mut late_rx) = join(&h, &code, "Late", 12).await;
    let before = drain(&mut late_rx);
    assert!(!before.iter().any(|e| matches!(e, ServerEvent::QuestionNew { .. })));

    let (tx, _new_host_rx) = mpsc::unbounded_channel();
    h.manager
        .resume(&code, &host(), ConnectionId(2), tx)
        .await
        .unwrap();
    let first = expect(&mut late_rx, "question_new or timer", |e| {
        matches!(
            e,
            ServerEvent::QuestionNew { .. }
                | ServerEvent::TimerTick { .. }
                | ServerEvent::QuestionTimeout { .. }
        )
    })
    .await;
    match first {
        ServerEvent::QuestionNew { question, .. } => assert_eq!(question.id, q1),
        other => panic!("expected question_new before timers, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_resume_requires_host() {
    let h = harness();
    let (code, _host_rx) = create(&h, new_room("geo")).await;
    let (tx, _rx) = mpsc::unbounded_channel();
    let err = h
        .manager
        .resume(&code, &UserId("student".into()), ConnectionId(5), tx)
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::NotHost));
}

#[tokio::test(start_paused = true)]
async fn test_close_notifies_and_evicts() {
    let h = harness();
    let (code, _host_rx) = create(&h, new_room("geo")).await;
    let (_ada, mut ada_rx) = join(&h, &code, "Ada", 10).await;

    let err = h
        .manager
        .close(&code, &UserId("student".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::NotHost));

    h.manager.close(&code, &host()).await.unwrap();
    expect(&mut ada_rx, "room_closed", |e| {
        matches!(e, ServerEvent::RoomClosed { .. })
    })
    .await;
    assert!(!h.manager.contains(&code));
    assert!(h.cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_state_is_host_only() {
    let h = harness();
    let (code, _host_rx) = create(&h, new_room("geo")).await;
    let (_ada, _ada_rx) = join(&h, &code, "Ada", 10).await;

    let state = h.manager.state(&code, &host()).await.unwrap();
    assert_eq!(state.players.len(), 1);
    assert_eq!(state.total_questions, 0);

    let err = h
        .manager
        .state(&code, &UserId("student".into()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

// =========================================================================
// Rehydration
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_rehydrated_lobby_keeps_players() {
    let cache = Arc::new(MemoryCache::new());
    let first = harness_with(EngineConfig::default(), cache.clone());
    let (code, _host_rx) = create(&first, new_room("geo")).await;
    let (ada, _ada_rx) = join(&first, &code, "Ada", 10).await;
    assert!(first.manager.set_ready(&code, ada).await.unwrap());

    let second = harness_with(EngineConfig::default(), cache);
    assert!(!second.manager.contains(&code));
    let summary = second.manager.summary(&code).await.unwrap();
    assert_eq!(summary.status, RoomStatus::Lobby);
    // Nobody is connected to the new process yet.
    assert_eq!(summary.player_count, 0);
    assert!(second.manager.contains(&code));

    let (back, _back_rx) = join(&second, &code, "Ada", 20).await;
    assert_eq!(back, ada);
    assert_eq!(second.manager.summary(&code).await.unwrap().player_count, 1);
    // Readiness does not survive the handover.
    assert!(second.manager.set_ready(&code, ada).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_rehydrated_game_player_rejoins_by_name_with_score() {
    let cache = Arc::new(MemoryCache::new());
    let first = harness_with(EngineConfig::default(), cache.clone());
    let (code, _host_rx) = create(&first, new_room("geo")).await;
    let (ada, mut ada_rx) = join(&first, &code, "Ada", 10).await;
    let (_bob, _bob_rx) = join(&first, &code, "Bob", 11).await;
    first.manager.start(&code, &host()).await.unwrap();
    let q1 = expect_question(&mut ada_rx).await;
    first
        .manager
        .submit_answer(&code, ada, q1, AnswerPayload::Choice("1".into()), 0)
        .await
        .unwrap();

    let second = harness_with(EngineConfig::default(), cache);
    assert_eq!(second.manager.summary(&code).await.unwrap().player_count, 0);

    let (tx, _rx) = mpsc::unbounded_channel();
    let back = second
        .manager
        .join_room(&code, JoinRequest::named("Ada"), ConnectionId(20), tx)
        .await
        .unwrap();
    assert_eq!(back.player.id, ada);
    assert!(back.is_reconnect);

    let state = second.manager.state(&code, &host()).await.unwrap();
    let row = state.leaderboard.iter().find(|r| r.player_id == ada).unwrap();
    assert_eq!(row.score, 1500);
}

#[tokio::test(start_paused = true)]
async fn test_rehydrated_room_without_host_expires() {
    let cache = Arc::new(MemoryCache::new());
    let first = harness_with(EngineConfig::default(), cache.clone());
    let (code, _host_rx) = create(&first, new_room("geo")).await;
    join(&first, &code, "Ada", 10).await;

    let second = harness_with(EngineConfig::default(), cache);
    let (_ada, mut ada_rx) = join(&second, &code, "Ada", 20).await;

    tokio::time::sleep(StoreConfig::default().cache_ttl).await;
    expect(&mut ada_rx, "room_closed", |e| {
        matches!(e, ServerEvent::RoomClosed { reason } if reason == "session expired")
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_rehydrated_game_comes_back_paused_and_resumes() {
    let cache = Arc::new(MemoryCache::new());
    let first = harness_with(EngineConfig::default(), cache.clone());
    let (code, _host_rx) = create(&first, new_room("geo")).await;
    let (ada, mut ada_rx) = join(&first, &code, "Ada", 10).await;
    let (_bob, _bob_rx) = join(&first, &code, "Bob", 11).await;
    first.manager.start(&code, &host()).await.unwrap();
    let q1 = expect_question(&mut ada_rx).await;
    first
        .manager
        .submit_answer(&code, ada, q1, AnswerPayload::Choice("1".into()), 0)
        .await
        .unwrap();

    let second = harness_with(EngineConfig::default(), cache);
    let summary = second.manager.summary(&code).await.unwrap();
    assert_eq!(summary.status, RoomStatus::Paused);

    let (tx, mut host_rx) = mpsc::unbounded_channel();
    let status = second
        .manager
        .resume(&code, &host(), ConnectionId(2), tx)
        .await
        .unwrap();
    assert_eq!(status, RoomStatus::Active);
    assert_eq!(expect_question(&mut host_rx).await, q1);

    // The answer given before the handover still counts.
    let err = second
        .manager
        .submit_answer(&code, ada, q1, AnswerPayload::Choice("1".into()), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::AlreadyAnswered(..)));
}
