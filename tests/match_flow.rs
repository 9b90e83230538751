//! End-to-end duel flows driven through the routing layer, with the
//! in-memory store and fixture question bank standing in for Redis/MongoDB.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

use quiz_duel_back::{
    config::AppConfig,
    dao::{
        models::{
            AnswerOptionEntity, AnswerRecordEntity, MatchStatusEntity, PlayerEntity,
            QuestionEntity, SessionEntity,
        },
        question_bank::StaticQuestionBank,
        result_sink::MemoryResultSink,
        session_store::{SessionStore, memory::MemorySessionStore},
    },
    dto::ws::{ClientCommand, ParticipantInfo, ServerEvent},
    engine::{
        master::{ClientConnection, Master},
        protocol::CommandOrigin,
    },
    state::Backends,
};

const EVENT_WAIT: Duration = Duration::from_secs(300);

struct Harness {
    master: Master,
    store: MemorySessionStore,
    sink: MemoryResultSink,
    bank: StaticQuestionBank,
}

impl Harness {
    async fn new(config: AppConfig) -> Self {
        let backends = Backends::new();
        let store = MemorySessionStore::new();
        backends
            .install_session_store(Arc::new(store.clone()))
            .await;
        let bank = StaticQuestionBank::new();
        backends
            .install_question_bank(Arc::new(bank.clone()))
            .await;
        let sink = MemoryResultSink::new();
        backends.install_result_sink(Arc::new(sink.clone())).await;

        let master = Master::new(Arc::new(config), backends);
        Self {
            master,
            store,
            sink,
            bank,
        }
    }

    fn connect(&self, username: &str) -> TestClient {
        self.connect_as(Uuid::new_v4(), username)
    }

    fn connect_as(&self, user_id: Uuid, username: &str) -> TestClient {
        let (tx, rx) = mpsc::unbounded_channel();
        let socket_id = Uuid::new_v4();
        self.master.register_connection(ClientConnection {
            socket_id,
            user_id,
            username: username.to_owned(),
            tx,
        });
        TestClient {
            origin: CommandOrigin {
                socket: socket_id,
                user_id,
            },
            username: username.to_owned(),
            rx,
        }
    }
}

struct TestClient {
    origin: CommandOrigin,
    username: String,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl TestClient {
    fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            username: self.username.clone(),
        }
    }

    async fn send(&self, harness: &Harness, command: ClientCommand) {
        harness.master.dispatch(self.origin, command).await;
    }

    async fn next_event(&mut self) -> ServerEvent {
        let message = timeout(EVENT_WAIT, self.rx.recv())
            .await
            .expect("timed out waiting for a server event")
            .expect("connection channel closed");
        match message {
            Message::Text(text) => serde_json::from_str(text.as_str()).expect("parse server event"),
            other => panic!("unexpected websocket message: {other:?}"),
        }
    }

    async fn expect_error(&mut self) -> (String, String) {
        match self.next_event().await {
            ServerEvent::MatchError { error, code } => (error, code),
            other => panic!("expected match_error, got {other:?}"),
        }
    }

    fn assert_no_pending_events(&mut self) {
        match self.rx.try_recv() {
            Err(mpsc::error::TryRecvError::Empty) => {}
            other => panic!("expected no pending events, got {other:?}"),
        }
    }
}

fn question(text: &str, time_limit_secs: u32) -> (QuestionEntity, Uuid, Uuid) {
    let correct = Uuid::new_v4();
    let wrong = Uuid::new_v4();
    let entity = QuestionEntity {
        id: Uuid::new_v4(),
        text: text.to_owned(),
        options: vec![
            AnswerOptionEntity {
                id: correct,
                text: "right".into(),
                correct: true,
            },
            AnswerOptionEntity {
                id: wrong,
                text: "wrong".into(),
                correct: false,
            },
        ],
        time_limit_secs,
    };
    (entity, correct, wrong)
}

struct Quiz {
    id: Uuid,
    questions: Vec<QuestionEntity>,
    correct: Vec<Uuid>,
    wrong: Vec<Uuid>,
}

fn register_quiz(harness: &Harness, question_count: usize, time_limit_secs: u32) -> Quiz {
    let mut questions = Vec::new();
    let mut correct = Vec::new();
    let mut wrong = Vec::new();
    for index in 0..question_count {
        let (entity, right, bad) = question(&format!("question {index}"), time_limit_secs);
        questions.push(entity);
        correct.push(right);
        wrong.push(bad);
    }
    let id = Uuid::new_v4();
    harness.bank.insert(id, questions.clone());
    Quiz {
        id,
        questions,
        correct,
        wrong,
    }
}

/// Run create + join + both-ready and return once both clients saw the match
/// start. Returns the match id.
async fn start_duel(
    harness: &Harness,
    quiz: &Quiz,
    alice: &mut TestClient,
    bob: &mut TestClient,
) -> Uuid {
    alice
        .send(
            harness,
            ClientCommand::CreateMatch {
                quiz_id: quiz.id,
                participant_info: alice.info(),
            },
        )
        .await;
    let (match_id, join_code) = match alice.next_event().await {
        ServerEvent::MatchConnected {
            match_id,
            join_code,
            players,
        } => {
            assert_eq!(players.len(), 1);
            (match_id, join_code.expect("join code issued"))
        }
        other => panic!("expected match_connected, got {other:?}"),
    };

    bob.send(
        harness,
        ClientCommand::JoinMatch {
            match_id: None,
            join_code: Some(join_code),
            participant_info: bob.info(),
        },
    )
    .await;
    match bob.next_event().await {
        ServerEvent::MatchJoined { players, .. } => assert_eq!(players.len(), 2),
        other => panic!("expected match_joined, got {other:?}"),
    }
    match alice.next_event().await {
        ServerEvent::PlayerListUpdated { players } => assert_eq!(players.len(), 2),
        other => panic!("expected player_list_updated, got {other:?}"),
    }

    let alice_id = alice.origin.user_id;
    let bob_id = bob.origin.user_id;

    alice.send(harness, ClientCommand::PlayerReady).await;
    for client in [&mut *alice, &mut *bob] {
        match client.next_event().await {
            ServerEvent::PlayerReady { user_id, is_ready } => {
                assert_eq!(user_id, alice_id);
                assert!(is_ready);
            }
            other => panic!("expected player_ready, got {other:?}"),
        }
    }

    bob.send(harness, ClientCommand::PlayerReady).await;
    for client in [&mut *alice, &mut *bob] {
        match client.next_event().await {
            ServerEvent::PlayerReady { user_id, .. } => {
                assert_eq!(user_id, bob_id);
            }
            other => panic!("expected player_ready, got {other:?}"),
        }
    }

    for client in [&mut *alice, &mut *bob] {
        match client.next_event().await {
            ServerEvent::MatchStarted {
                question,
                question_index,
                total_questions,
            } => {
                assert_eq!(question_index, 0);
                assert_eq!(total_questions, quiz.questions.len());
                assert_eq!(question.id, quiz.questions[0].id);
            }
            other => panic!("expected match_started, got {other:?}"),
        }
    }

    match_id
}

fn submit(question_id: Uuid, option: Uuid, time_spent: f64) -> ClientCommand {
    ClientCommand::SubmitAnswer {
        question_id,
        selected_options: vec![option],
        time_spent,
    }
}

#[tokio::test(start_paused = true)]
async fn full_happy_path_scores_and_completes() {
    let harness = Harness::new(AppConfig::default()).await;
    let quiz = register_quiz(&harness, 2, 30);
    let mut alice = harness.connect("alice");
    let mut bob = harness.connect("bob");

    let match_id = start_duel(&harness, &quiz, &mut alice, &mut bob).await;

    // Alice answers question 0 correctly at 10s: 100 + (30 - 10) * 2 = 140.
    alice
        .send(&harness, submit(quiz.questions[0].id, quiz.correct[0], 10.0))
        .await;
    match alice.next_event().await {
        ServerEvent::AnswerResult {
            is_correct,
            points,
            correct_options,
            total_score,
        } => {
            assert!(is_correct);
            assert_eq!(points, 140);
            assert_eq!(total_score, 140);
            assert_eq!(correct_options, vec![quiz.correct[0]]);
        }
        other => panic!("expected answer_result, got {other:?}"),
    }
    match bob.next_event().await {
        ServerEvent::OpponentSubmitted { user_id, username } => {
            assert_eq!(user_id, alice.origin.user_id);
            assert_eq!(username, "alice");
        }
        other => panic!("expected opponent_submitted, got {other:?}"),
    }
    match alice.next_event().await {
        ServerEvent::WaitingForOpponent { waiting_for, .. } => {
            assert_eq!(waiting_for, vec!["bob".to_string()]);
        }
        other => panic!("expected waiting_for_opponent, got {other:?}"),
    }

    // Bob answers incorrectly at 5s: zero points, and both submissions are in
    // so the duel advances with the question-0 timer cancelled.
    bob.send(&harness, submit(quiz.questions[0].id, quiz.wrong[0], 5.0))
        .await;
    match bob.next_event().await {
        ServerEvent::AnswerResult {
            is_correct,
            points,
            total_score,
            ..
        } => {
            assert!(!is_correct);
            assert_eq!(points, 0);
            assert_eq!(total_score, 0);
        }
        other => panic!("expected answer_result, got {other:?}"),
    }
    match alice.next_event().await {
        ServerEvent::OpponentSubmitted { user_id, .. } => {
            assert_eq!(user_id, bob.origin.user_id);
        }
        other => panic!("expected opponent_submitted, got {other:?}"),
    }
    for client in [&mut alice, &mut bob] {
        match client.next_event().await {
            ServerEvent::NextQuestion {
                question,
                question_index,
                total_questions,
            } => {
                assert_eq!(question_index, 1);
                assert_eq!(total_questions, 2);
                assert_eq!(question.id, quiz.questions[1].id);
            }
            other => panic!("expected next_question, got {other:?}"),
        }
    }

    // Both answer question 1 correctly at 0s: 100 + 30 * 2 = 160 each.
    alice
        .send(&harness, submit(quiz.questions[1].id, quiz.correct[1], 0.0))
        .await;
    match alice.next_event().await {
        ServerEvent::AnswerResult {
            points,
            total_score,
            ..
        } => {
            assert_eq!(points, 160);
            assert_eq!(total_score, 300);
        }
        other => panic!("expected answer_result, got {other:?}"),
    }
    match bob.next_event().await {
        ServerEvent::OpponentSubmitted { .. } => {}
        other => panic!("expected opponent_submitted, got {other:?}"),
    }
    match alice.next_event().await {
        ServerEvent::WaitingForOpponent { .. } => {}
        other => panic!("expected waiting_for_opponent, got {other:?}"),
    }

    bob.send(&harness, submit(quiz.questions[1].id, quiz.correct[1], 0.0))
        .await;
    match bob.next_event().await {
        ServerEvent::AnswerResult {
            points,
            total_score,
            ..
        } => {
            assert_eq!(points, 160);
            assert_eq!(total_score, 160);
        }
        other => panic!("expected answer_result, got {other:?}"),
    }
    match alice.next_event().await {
        ServerEvent::OpponentSubmitted { .. } => {}
        other => panic!("expected opponent_submitted, got {other:?}"),
    }

    let alice_id = alice.origin.user_id;
    for (client, expected_score) in [(&mut alice, 300), (&mut bob, 160)] {
        match client.next_event().await {
            ServerEvent::MatchCompleted {
                results, winner, ..
            } => {
                assert_eq!(winner, Some(alice_id));
                assert_eq!(results.len(), 2);
                let own = results
                    .iter()
                    .find(|result| result.user_id == client.origin.user_id)
                    .expect("own result present");
                assert_eq!(own.total_score, expected_score);
            }
            other => panic!("expected match_completed, got {other:?}"),
        }
    }

    // Let the worker finish its post-broadcast bookkeeping.
    sleep(Duration::from_millis(10)).await;
    let record = harness.sink.record_for(match_id).expect("sink record");
    assert_eq!(record.winner, Some(alice.origin.user_id));
    let alice_row = record
        .players
        .iter()
        .find(|row| row.user_id == alice.origin.user_id)
        .expect("alice row");
    assert_eq!(alice_row.total_score, 300);
    assert_eq!(alice_row.correct_count, 2);
    assert!(alice_row.winner);
    assert!((alice_row.accuracy_pct - 100.0).abs() < f64::EPSILON);
    let bob_row = record
        .players
        .iter()
        .find(|row| row.user_id == bob.origin.user_id)
        .expect("bob row");
    assert_eq!(bob_row.correct_count, 1);
    assert!((bob_row.accuracy_pct - 50.0).abs() < f64::EPSILON);
}

#[tokio::test(start_paused = true)]
async fn timeout_forces_the_missing_submission_and_advances() {
    let harness = Harness::new(AppConfig::default()).await;
    let quiz = register_quiz(&harness, 1, 30);
    let mut alice = harness.connect("alice");
    let mut bob = harness.connect("bob");

    let match_id = start_duel(&harness, &quiz, &mut alice, &mut bob).await;

    alice
        .send(&harness, submit(quiz.questions[0].id, quiz.correct[0], 5.0))
        .await;
    match alice.next_event().await {
        ServerEvent::AnswerResult { points, .. } => assert_eq!(points, 150),
        other => panic!("expected answer_result, got {other:?}"),
    }
    match bob.next_event().await {
        ServerEvent::OpponentSubmitted { .. } => {}
        other => panic!("expected opponent_submitted, got {other:?}"),
    }
    match alice.next_event().await {
        ServerEvent::WaitingForOpponent { .. } => {}
        other => panic!("expected waiting_for_opponent, got {other:?}"),
    }

    // Bob never answers; the armed 30s timer forces his flag and the duel
    // finishes (single-question quiz).
    let alice_id = alice.origin.user_id;
    for client in [&mut alice, &mut bob] {
        match client.next_event().await {
            ServerEvent::QuestionTimeout { question_index, .. } => {
                assert_eq!(question_index, 0);
            }
            other => panic!("expected question_timeout, got {other:?}"),
        }
        match client.next_event().await {
            ServerEvent::MatchCompleted { winner, .. } => {
                assert_eq!(winner, Some(alice_id));
            }
            other => panic!("expected match_completed, got {other:?}"),
        }
    }

    sleep(Duration::from_millis(10)).await;
    // The forced non-submission leaves no answer record behind.
    let entity = harness
        .store
        .find_session(match_id)
        .await
        .unwrap()
        .expect("session still within the completion grace period");
    assert_eq!(entity.status, MatchStatusEntity::Completed);
    let bob_player = entity
        .players
        .iter()
        .find(|player| player.user_id == bob.origin.user_id)
        .expect("bob persisted");
    assert!(bob_player.has_submitted);
    assert!(bob_player.answers.is_empty());
    assert_eq!(bob_player.score, 0);

    let record = harness.sink.record_for(match_id).expect("sink record");
    let bob_row = record
        .players
        .iter()
        .find(|row| row.user_id == bob.origin.user_id)
        .expect("bob row");
    assert_eq!(bob_row.correct_count, 0);
    assert_eq!(bob_row.total_time_secs, 0.0);
}

#[tokio::test(start_paused = true)]
async fn duplicate_submission_is_an_idempotent_noop() {
    let harness = Harness::new(AppConfig::default()).await;
    let quiz = register_quiz(&harness, 1, 30);
    let mut alice = harness.connect("alice");
    let mut bob = harness.connect("bob");

    let match_id = start_duel(&harness, &quiz, &mut alice, &mut bob).await;

    alice
        .send(&harness, submit(quiz.questions[0].id, quiz.correct[0], 10.0))
        .await;
    match alice.next_event().await {
        ServerEvent::AnswerResult { points, .. } => assert_eq!(points, 140),
        other => panic!("expected answer_result, got {other:?}"),
    }
    match bob.next_event().await {
        ServerEvent::OpponentSubmitted { .. } => {}
        other => panic!("expected opponent_submitted, got {other:?}"),
    }
    match alice.next_event().await {
        ServerEvent::WaitingForOpponent { .. } => {}
        other => panic!("expected waiting_for_opponent, got {other:?}"),
    }

    // Retried submission: no second score, no error, no event at all.
    alice
        .send(&harness, submit(quiz.questions[0].id, quiz.correct[0], 2.0))
        .await;
    sleep(Duration::from_millis(10)).await;
    alice.assert_no_pending_events();

    sleep(Duration::from_millis(10)).await;
    let entity = harness
        .store
        .find_session(match_id)
        .await
        .unwrap()
        .expect("session persisted");
    let alice_player = entity
        .players
        .iter()
        .find(|player| player.user_id == alice.origin.user_id)
        .expect("alice persisted");
    assert_eq!(alice_player.answers.len(), 1);
    assert_eq!(alice_player.score, 140);

    bob.send(&harness, submit(quiz.questions[0].id, quiz.correct[0], 0.0))
        .await;
    match bob.next_event().await {
        ServerEvent::AnswerResult { points, .. } => assert_eq!(points, 160),
        other => panic!("expected answer_result, got {other:?}"),
    }
    match alice.next_event().await {
        ServerEvent::OpponentSubmitted { .. } => {}
        other => panic!("expected opponent_submitted, got {other:?}"),
    }
    let bob_id = bob.origin.user_id;
    for client in [&mut alice, &mut bob] {
        match client.next_event().await {
            ServerEvent::MatchCompleted { winner, .. } => {
                assert_eq!(winner, Some(bob_id));
            }
            other => panic!("expected match_completed, got {other:?}"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn third_joiner_is_rejected_with_a_state_conflict() {
    let harness = Harness::new(AppConfig::default()).await;
    let quiz = register_quiz(&harness, 1, 30);
    let mut alice = harness.connect("alice");
    let mut bob = harness.connect("bob");
    let mut carol = harness.connect("carol");

    alice
        .send(
            &harness,
            ClientCommand::CreateMatch {
                quiz_id: quiz.id,
                participant_info: alice.info(),
            },
        )
        .await;
    let match_id = match alice.next_event().await {
        ServerEvent::MatchConnected { match_id, .. } => match_id,
        other => panic!("expected match_connected, got {other:?}"),
    };

    bob.send(
        &harness,
        ClientCommand::JoinMatch {
            match_id: Some(match_id),
            join_code: None,
            participant_info: bob.info(),
        },
    )
    .await;
    match bob.next_event().await {
        ServerEvent::MatchJoined { .. } => {}
        other => panic!("expected match_joined, got {other:?}"),
    }

    // The slot Bob took is gone; Carol loses the race.
    carol
        .send(
            &harness,
            ClientCommand::JoinMatch {
                match_id: Some(match_id),
                join_code: None,
                participant_info: carol.info(),
            },
        )
        .await;
    let (error, code) = carol.expect_error().await;
    assert_eq!(code, "state_conflict");
    assert!(error.contains("full"));
}

#[tokio::test(start_paused = true)]
async fn unknown_join_code_reports_not_found() {
    let harness = Harness::new(AppConfig::default()).await;
    let mut bob = harness.connect("bob");

    bob.send(
        &harness,
        ClientCommand::JoinMatch {
            match_id: None,
            join_code: Some("ZZZZZZ".into()),
            participant_info: bob.info(),
        },
    )
    .await;
    let (_, code) = bob.expect_error().await;
    assert_eq!(code, "not_found");
}

#[tokio::test(start_paused = true)]
async fn submitting_while_waiting_is_a_state_conflict() {
    let harness = Harness::new(AppConfig::default()).await;
    let quiz = register_quiz(&harness, 1, 30);
    let mut alice = harness.connect("alice");

    alice
        .send(
            &harness,
            ClientCommand::CreateMatch {
                quiz_id: quiz.id,
                participant_info: alice.info(),
            },
        )
        .await;
    match alice.next_event().await {
        ServerEvent::MatchConnected { .. } => {}
        other => panic!("expected match_connected, got {other:?}"),
    }

    alice
        .send(&harness, submit(quiz.questions[0].id, quiz.correct[0], 1.0))
        .await;
    let (_, code) = alice.expect_error().await;
    assert_eq!(code, "state_conflict");
}

#[tokio::test(start_paused = true)]
async fn ready_without_a_match_reports_not_found() {
    let harness = Harness::new(AppConfig::default()).await;
    let mut alice = harness.connect("alice");

    alice.send(&harness, ClientCommand::PlayerReady).await;
    let (_, code) = alice.expect_error().await;
    assert_eq!(code, "not_found");
}

#[tokio::test(start_paused = true)]
async fn duplicate_ready_does_not_start_the_match_twice() {
    let harness = Harness::new(AppConfig::default()).await;
    let quiz = register_quiz(&harness, 1, 30);
    let mut alice = harness.connect("alice");
    let mut bob = harness.connect("bob");

    let _match_id = start_duel(&harness, &quiz, &mut alice, &mut bob).await;

    // A ready retry after the match started is rejected, and the deferred
    // trigger it would have scheduled must not double-start anything.
    bob.send(&harness, ClientCommand::PlayerReady).await;
    let (_, code) = bob.expect_error().await;
    assert_eq!(code, "state_conflict");

    alice
        .send(&harness, submit(quiz.questions[0].id, quiz.correct[0], 0.0))
        .await;
    match alice.next_event().await {
        ServerEvent::AnswerResult { .. } => {}
        other => panic!("expected answer_result, got {other:?}"),
    }
    match bob.next_event().await {
        ServerEvent::OpponentSubmitted { .. } => {}
        other => panic!("expected opponent_submitted, got {other:?}"),
    }
    match alice.next_event().await {
        ServerEvent::WaitingForOpponent { .. } => {}
        other => panic!("expected waiting_for_opponent, got {other:?}"),
    }
    bob.send(&harness, submit(quiz.questions[0].id, quiz.wrong[0], 1.0))
        .await;
    match bob.next_event().await {
        ServerEvent::AnswerResult { .. } => {}
        other => panic!("expected answer_result, got {other:?}"),
    }
    match alice.next_event().await {
        ServerEvent::OpponentSubmitted { .. } => {}
        other => panic!("expected opponent_submitted, got {other:?}"),
    }

    for client in [&mut alice, &mut bob] {
        match client.next_event().await {
            ServerEvent::MatchCompleted { .. } => {}
            other => panic!("expected match_completed, got {other:?}"),
        }
    }

    sleep(Duration::from_millis(10)).await;
    alice.assert_no_pending_events();
    bob.assert_no_pending_events();
}

#[tokio::test(start_paused = true)]
async fn reconnect_rehydrates_from_the_durable_store() {
    let harness = Harness::new(AppConfig::default()).await;
    let quiz = register_quiz(&harness, 2, 30);
    let alice_id = Uuid::new_v4();
    let bob_id = Uuid::new_v4();
    let match_id = Uuid::new_v4();

    // Session as another process would have persisted it: in progress on
    // question 1, presented 12 seconds ago, Alice already 140 points up.
    let presented_at = SystemTime::now() - Duration::from_secs(12);
    let entity = SessionEntity {
        id: match_id,
        join_code: Some("AB12CD".into()),
        quiz_id: quiz.id,
        questions: quiz.questions.clone(),
        status: MatchStatusEntity::InProgress,
        current_index: 1,
        presented_at: Some(presented_at),
        players: vec![
            PlayerEntity {
                user_id: alice_id,
                username: "alice".into(),
                score: 140,
                ready: true,
                has_submitted: false,
                answers: vec![AnswerRecordEntity {
                    question_id: quiz.questions[0].id,
                    selected_option_ids: vec![quiz.correct[0]],
                    correct: true,
                    time_spent_secs: 10.0,
                    points: 140,
                }],
            },
            PlayerEntity {
                user_id: bob_id,
                username: "bob".into(),
                score: 0,
                ready: true,
                has_submitted: false,
                answers: Vec::new(),
            },
        ],
        created_at: SystemTime::now(),
        updated_at: SystemTime::now(),
    };
    harness
        .store
        .save_session(entity, Duration::from_secs(3_600))
        .await
        .unwrap();

    // This master has never seen the match; the connect command must route to
    // a fresh unit and rehydrate.
    let mut alice = harness.connect_as(alice_id, "alice");
    alice
        .send(&harness, ClientCommand::ConnectToMatch { match_id })
        .await;

    match alice.next_event().await {
        ServerEvent::MatchReconnected {
            question,
            question_index,
            total_questions,
            time_elapsed,
            player_score,
            player_answers,
            has_submitted_current,
        } => {
            assert_eq!(question.id, quiz.questions[1].id);
            assert_eq!(question_index, 1);
            assert_eq!(total_questions, 2);
            assert!(
                (11.5..13.5).contains(&time_elapsed),
                "expected ~12s elapsed, got {time_elapsed}"
            );
            assert_eq!(player_score, 140);
            assert_eq!(player_answers.len(), 1);
            assert_eq!(player_answers[0].points, 140);
            assert!(!has_submitted_current);
        }
        other => panic!("expected match_reconnected, got {other:?}"),
    }

    // Reconnection reads state; it must not mutate progression.
    let persisted = harness
        .store
        .find_session(match_id)
        .await
        .unwrap()
        .expect("session still stored");
    assert_eq!(persisted.status, MatchStatusEntity::InProgress);
    assert_eq!(persisted.current_index, 1);

    // A stranger cannot attach to the session.
    let mut mallory = harness.connect("mallory");
    mallory
        .send(&harness, ClientCommand::ConnectToMatch { match_id })
        .await;
    let (_, code) = mallory.expect_error().await;
    assert_eq!(code, "state_conflict");
}

#[tokio::test(start_paused = true)]
async fn create_fails_with_capacity_exceeded_when_units_are_full() {
    let config = AppConfig::default()
        .with_worker_count(1)
        .with_worker_capacity(1);
    let harness = Harness::new(config).await;
    let quiz = register_quiz(&harness, 1, 30);
    let mut alice = harness.connect("alice");
    let mut carol = harness.connect("carol");

    alice
        .send(
            &harness,
            ClientCommand::CreateMatch {
                quiz_id: quiz.id,
                participant_info: alice.info(),
            },
        )
        .await;
    match alice.next_event().await {
        ServerEvent::MatchConnected { .. } => {}
        other => panic!("expected match_connected, got {other:?}"),
    }

    carol
        .send(
            &harness,
            ClientCommand::CreateMatch {
                quiz_id: quiz.id,
                participant_info: carol.info(),
            },
        )
        .await;
    let (_, code) = carol.expect_error().await;
    assert_eq!(code, "capacity_exceeded");
}

#[tokio::test(start_paused = true)]
async fn creating_from_an_unknown_quiz_reports_not_found() {
    let harness = Harness::new(AppConfig::default()).await;
    let mut alice = harness.connect("alice");

    alice
        .send(
            &harness,
            ClientCommand::CreateMatch {
                quiz_id: Uuid::new_v4(),
                participant_info: alice.info(),
            },
        )
        .await;
    let (_, code) = alice.expect_error().await;
    assert_eq!(code, "not_found");
}

#[tokio::test(start_paused = true)]
async fn out_of_range_time_spent_is_rejected_without_scoring() {
    let harness = Harness::new(AppConfig::default()).await;
    let quiz = register_quiz(&harness, 1, 30);
    let mut alice = harness.connect("alice");
    let mut bob = harness.connect("bob");

    let match_id = start_duel(&harness, &quiz, &mut alice, &mut bob).await;

    // 30s limit + 2s grace window; 40s is out of range.
    alice
        .send(&harness, submit(quiz.questions[0].id, quiz.correct[0], 40.0))
        .await;
    let (_, code) = alice.expect_error().await;
    assert_eq!(code, "validation_error");

    // Empty selections are rejected the same way.
    alice
        .send(
            &harness,
            ClientCommand::SubmitAnswer {
                question_id: quiz.questions[0].id,
                selected_options: Vec::new(),
                time_spent: 1.0,
            },
        )
        .await;
    let (_, code) = alice.expect_error().await;
    assert_eq!(code, "validation_error");

    sleep(Duration::from_millis(10)).await;
    let entity = harness
        .store
        .find_session(match_id)
        .await
        .unwrap()
        .expect("session persisted");
    let alice_player = entity
        .players
        .iter()
        .find(|player| player.user_id == alice.origin.user_id)
        .expect("alice persisted");
    assert!(!alice_player.has_submitted);
    assert!(alice_player.answers.is_empty());
    assert_eq!(alice_player.score, 0);
}
