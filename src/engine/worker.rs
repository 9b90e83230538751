//! Execution unit: owns and drives the sessions assigned to it.
//!
//! Each unit is a single logical thread of control. Client commands, timer
//! firings, and deferred triggers all arrive on one channel and run to
//! completion in order, so a session's submission-flag check and the advance
//! decision that follows are atomic with respect to each other.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime},
};

use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::models::{MatchRecordEntity, PlayerResultEntity, SessionEntity},
    dto::ws::ServerEvent,
    engine::{
        protocol::{CommandOrigin, WorkerCommand, WorkerEvent},
        timers::TimerMap,
    },
    error::ServiceError,
    session::{
        AnswerRecord, MatchSession, Player,
        scoring::{self, ScoreOutcome},
        status::{MatchEvent, MatchStatus},
    },
    state::Backends,
};

/// One execution unit and its in-memory session cache.
pub struct Worker {
    id: usize,
    config: Arc<AppConfig>,
    backends: Arc<Backends>,
    sessions: HashMap<Uuid, MatchSession>,
    timers: TimerMap,
    self_tx: mpsc::UnboundedSender<WorkerCommand>,
    events: mpsc::UnboundedSender<WorkerEvent>,
}

/// Spawn an execution unit, returning its command channel and task handle.
pub fn spawn(
    id: usize,
    config: Arc<AppConfig>,
    backends: Arc<Backends>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) -> (mpsc::UnboundedSender<WorkerCommand>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let worker = Worker {
        id,
        config,
        backends,
        sessions: HashMap::new(),
        timers: TimerMap::new(),
        self_tx: tx.clone(),
        events,
    };
    let handle = tokio::spawn(worker.run(rx));
    (tx, handle)
}

fn session_missing(match_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("session `{match_id}` not found"))
}

fn not_participant() -> ServiceError {
    ServiceError::InvalidState("not a participant of this match".into())
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<WorkerCommand>) {
        info!(worker = self.id, "execution unit started");
        while let Some(command) = rx.recv().await {
            self.handle_command(command).await;
        }
        info!(worker = self.id, "execution unit stopped");
    }

    async fn handle_command(&mut self, command: WorkerCommand) {
        let match_id = command.match_id();
        let origin_socket = command.origin_socket();

        if let Err(err) = self.dispatch(command).await {
            match &err {
                ServiceError::Unavailable(_) | ServiceError::Degraded => {
                    warn!(worker = self.id, %match_id, error = %err, "command failed")
                }
                _ => debug!(worker = self.id, %match_id, error = %err, "command rejected"),
            }

            // A failed command that left no cached session means any routing
            // entry for this match is speculative; let the master drop it.
            if !self.sessions.contains_key(&match_id) {
                self.send(WorkerEvent::Closed { match_id });
            }

            if let Some(socket) = origin_socket {
                self.emit(
                    socket,
                    ServerEvent::MatchError {
                        error: err.to_string(),
                        code: err.code().to_string(),
                    },
                );
            }
        }
    }

    async fn dispatch(&mut self, command: WorkerCommand) -> Result<(), ServiceError> {
        match command {
            WorkerCommand::CreateMatch {
                match_id,
                join_code,
                quiz_id,
                origin,
                username,
            } => {
                self.handle_create(match_id, join_code, quiz_id, origin, username)
                    .await
            }
            WorkerCommand::JoinMatch {
                match_id,
                origin,
                username,
            } => self.handle_join(match_id, origin, username).await,
            WorkerCommand::ConnectToMatch { match_id, origin } => {
                self.ensure_cached(match_id).await?;
                self.reattach(match_id, origin)
            }
            WorkerCommand::PlayerReady { match_id, origin } => {
                self.handle_ready(match_id, origin).await
            }
            WorkerCommand::SubmitAnswer {
                match_id,
                origin,
                question_id,
                selected_options,
                time_spent,
            } => {
                self.handle_submit(match_id, origin, question_id, selected_options, time_spent)
                    .await
            }
            WorkerCommand::ParticipantDisconnected {
                match_id,
                user_id,
                socket,
            } => {
                self.handle_disconnected(match_id, user_id, socket);
                Ok(())
            }
            WorkerCommand::StartDelayElapsed { match_id } => {
                self.handle_start_delay(match_id).await
            }
            WorkerCommand::QuestionTimedOut {
                match_id,
                question_index,
            } => self.handle_timeout(match_id, question_index).await,
            WorkerCommand::PurgeSession { match_id } => {
                self.handle_purge(match_id).await;
                Ok(())
            }
        }
    }

    /// Read-through rehydration: every handler but create goes through here,
    /// so a command routed to a fresh process can pick up a session another
    /// process persisted.
    async fn ensure_cached(&mut self, match_id: Uuid) -> Result<(), ServiceError> {
        if self.sessions.contains_key(&match_id) {
            return Ok(());
        }

        let store = self.backends.require_session_store().await?;
        let Some(entity) = store.find_session(match_id).await? else {
            return Err(session_missing(match_id));
        };
        let mut session = MatchSession::from(entity);

        // Re-resolve the immutable question list. Content never changes after
        // publication, so the stored copy stands in when the bank is away.
        if let Some(bank) = self.backends.question_bank().await {
            match bank.resolve_quiz(session.quiz_id).await {
                Ok(Some(questions)) => {
                    session.questions = questions.into_iter().map(Into::into).collect();
                }
                Ok(None) => {
                    debug!(%match_id, quiz_id = %session.quiz_id, "quiz no longer published; keeping denormalized questions")
                }
                Err(err) => {
                    warn!(%match_id, error = %err, "question re-resolution failed; keeping denormalized questions")
                }
            }
        }

        info!(worker = self.id, %match_id, "rehydrated session from durable store");

        let in_progress = session.status == MatchStatus::InProgress;
        let index = session.current_index;
        let remaining = session
            .current_question()
            .map(|question| {
                (f64::from(question.time_limit_secs)
                    - session.elapsed_on_current(SystemTime::now()))
                .max(0.0)
            })
            .unwrap_or(0.0);

        self.sessions.insert(match_id, session);

        // The previous owner's timer died with it; arm the remainder here.
        if in_progress && !self.timers.is_armed(match_id, index) {
            self.timers.arm(
                match_id,
                index,
                Duration::from_secs_f64(remaining),
                self.self_tx.clone(),
            );
        }

        Ok(())
    }

    /// Write-through persistence. Failures are logged, never propagated: the
    /// in-memory state stays correct for this process's lifetime and the next
    /// successful write closes the gap.
    async fn persist(&self, entity: SessionEntity) {
        let match_id = entity.id;
        let ttl = self.config.session_ttl();
        let Some(store) = self.backends.session_store().await else {
            warn!(%match_id, "skipping persist: storage unavailable (degraded mode)");
            return;
        };

        if let Some(code) = entity.join_code.clone() {
            if let Err(err) = store.save_join_code(code, match_id, ttl).await {
                warn!(%match_id, error = %err, "failed to refresh join code mapping");
            }
        }
        if let Err(err) = store.save_session(entity, ttl).await {
            warn!(%match_id, error = %err, "failed to persist session; accepting bounded-loss window");
        }
    }

    async fn handle_create(
        &mut self,
        match_id: Uuid,
        join_code: String,
        quiz_id: Uuid,
        origin: CommandOrigin,
        username: String,
    ) -> Result<(), ServiceError> {
        let bank = self
            .backends
            .question_bank()
            .await
            .ok_or(ServiceError::Degraded)?;
        let questions = bank
            .resolve_quiz(quiz_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("quiz `{quiz_id}` not found")))?;
        if questions.is_empty() {
            return Err(ServiceError::InvalidInput(format!(
                "quiz `{quiz_id}` has no questions"
            )));
        }

        let mut session = MatchSession::new(
            match_id,
            Some(join_code.clone()),
            quiz_id,
            questions.into_iter().map(Into::into).collect(),
        );
        session.players.insert(
            origin.user_id,
            Player::new(origin.user_id, username, origin.socket),
        );

        let entity = SessionEntity::from(&session);
        let reply = ServerEvent::MatchConnected {
            match_id,
            join_code: Some(join_code.clone()),
            players: ServerEvent::roster(&session),
        };
        self.sessions.insert(match_id, session);

        self.persist(entity).await;
        self.send(WorkerEvent::Bind {
            match_id,
            user_id: origin.user_id,
            socket: origin.socket,
            join_code: Some(join_code),
        });
        self.emit(origin.socket, reply);
        info!(worker = self.id, %match_id, user_id = %origin.user_id, "match created");
        Ok(())
    }

    async fn handle_join(
        &mut self,
        match_id: Uuid,
        origin: CommandOrigin,
        username: String,
    ) -> Result<(), ServiceError> {
        self.ensure_cached(match_id).await?;

        let already_known = self
            .sessions
            .get(&match_id)
            .ok_or_else(|| session_missing(match_id))?
            .players
            .contains_key(&origin.user_id);
        if already_known {
            // A participant re-issuing join is treated as a reconnect.
            return self.reattach(match_id, origin);
        }

        let (entity, join_code, reply, roster_event) = {
            let session = self
                .sessions
                .get_mut(&match_id)
                .ok_or_else(|| session_missing(match_id))?;
            match session.status {
                MatchStatus::Waiting => {}
                MatchStatus::InProgress => {
                    return Err(ServiceError::InvalidState("match already started".into()));
                }
                MatchStatus::Completed => {
                    return Err(ServiceError::InvalidState("match already completed".into()));
                }
            }
            if session.is_full() {
                return Err(ServiceError::InvalidState("match is full".into()));
            }

            session.players.insert(
                origin.user_id,
                Player::new(origin.user_id, username, origin.socket),
            );
            session.touch();

            let roster = ServerEvent::roster(session);
            (
                SessionEntity::from(&*session),
                session.join_code.clone(),
                ServerEvent::MatchJoined {
                    match_id,
                    players: roster.clone(),
                },
                ServerEvent::PlayerListUpdated { players: roster },
            )
        };

        self.persist(entity).await;
        self.send(WorkerEvent::Bind {
            match_id,
            user_id: origin.user_id,
            socket: origin.socket,
            join_code,
        });
        self.emit(origin.socket, reply);
        self.broadcast(match_id, vec![origin.socket], roster_event);
        info!(worker = self.id, %match_id, user_id = %origin.user_id, "participant joined");
        Ok(())
    }

    /// Re-attach a known participant's transport handle and send them a
    /// targeted snapshot of where the session stands. No session state beyond
    /// the handle is touched.
    fn reattach(&mut self, match_id: Uuid, origin: CommandOrigin) -> Result<(), ServiceError> {
        let (snapshot, join_code) = {
            let session = self
                .sessions
                .get_mut(&match_id)
                .ok_or_else(|| session_missing(match_id))?;
            {
                let player = session
                    .players
                    .get_mut(&origin.user_id)
                    .ok_or_else(not_participant)?;
                player.socket_id = Some(origin.socket);
            }

            let snapshot = match session.status {
                MatchStatus::Waiting => ServerEvent::MatchConnected {
                    match_id,
                    join_code: session.join_code.clone(),
                    players: ServerEvent::roster(session),
                },
                MatchStatus::InProgress => {
                    let question = session.current_question().ok_or_else(|| {
                        ServiceError::InvalidState("session has no current question".into())
                    })?;
                    let player = session
                        .players
                        .get(&origin.user_id)
                        .ok_or_else(not_participant)?;
                    ServerEvent::MatchReconnected {
                        question: question.into(),
                        question_index: session.current_index,
                        total_questions: session.questions.len(),
                        time_elapsed: session.elapsed_on_current(SystemTime::now()),
                        player_score: player.score,
                        player_answers: player.answers.iter().map(Into::into).collect(),
                        has_submitted_current: player.has_submitted,
                    }
                }
                MatchStatus::Completed => {
                    return Err(ServiceError::InvalidState("match already completed".into()));
                }
            };
            (snapshot, session.join_code.clone())
        };

        self.send(WorkerEvent::Bind {
            match_id,
            user_id: origin.user_id,
            socket: origin.socket,
            join_code,
        });
        self.emit(origin.socket, snapshot);
        info!(worker = self.id, %match_id, user_id = %origin.user_id, "participant reconnected");
        Ok(())
    }

    async fn handle_ready(
        &mut self,
        match_id: Uuid,
        origin: CommandOrigin,
    ) -> Result<(), ServiceError> {
        self.ensure_cached(match_id).await?;

        let (entity, should_schedule) = {
            let session = self
                .sessions
                .get_mut(&match_id)
                .ok_or_else(|| session_missing(match_id))?;
            if session.status != MatchStatus::Waiting {
                return Err(ServiceError::InvalidState(
                    "ready is only accepted while waiting for players".into(),
                ));
            }
            let player = session
                .players
                .get_mut(&origin.user_id)
                .ok_or_else(not_participant)?;
            player.ready = true;
            session.touch();

            (
                SessionEntity::from(&*session),
                session.is_full() && session.all_ready(),
            )
        };

        self.persist(entity).await;
        self.broadcast(
            match_id,
            Vec::new(),
            ServerEvent::PlayerReady {
                user_id: origin.user_id,
                is_ready: true,
            },
        );

        if should_schedule {
            // Deferred start lets both clients render the full lobby before
            // play begins; the trigger re-validates everything at fire time.
            let delay = self.config.auto_start_delay();
            let tx = self.self_tx.clone();
            tokio::spawn(async move {
                sleep(delay).await;
                let _ = tx.send(WorkerCommand::StartDelayElapsed { match_id });
            });
        }
        Ok(())
    }

    async fn handle_start_delay(&mut self, match_id: Uuid) -> Result<(), ServiceError> {
        let Some(session) = self.sessions.get(&match_id) else {
            return Ok(());
        };
        if session.status != MatchStatus::Waiting || !session.is_full() || !session.all_ready() {
            debug!(%match_id, "deferred start superseded; ignoring");
            return Ok(());
        }
        self.start_match(match_id).await
    }

    async fn start_match(&mut self, match_id: Uuid) -> Result<(), ServiceError> {
        let (entity, event, limit) = {
            let session = self
                .sessions
                .get_mut(&match_id)
                .ok_or_else(|| session_missing(match_id))?;
            session.status = session.status.apply(MatchEvent::Start)?;
            session.current_index = 0;
            session.presented_at = Some(SystemTime::now());
            session.reset_submission_flags();
            session.touch();

            let question = session.current_question().ok_or_else(|| {
                ServiceError::InvalidState("session has no current question".into())
            })?;
            (
                SessionEntity::from(&*session),
                ServerEvent::MatchStarted {
                    question: question.into(),
                    question_index: 0,
                    total_questions: session.questions.len(),
                },
                question.time_limit_secs,
            )
        };

        self.persist(entity).await;
        self.broadcast(match_id, Vec::new(), event);
        self.timers.arm(
            match_id,
            0,
            Duration::from_secs(u64::from(limit)),
            self.self_tx.clone(),
        );
        info!(worker = self.id, %match_id, "match started");
        Ok(())
    }

    async fn handle_submit(
        &mut self,
        match_id: Uuid,
        origin: CommandOrigin,
        question_id: Uuid,
        selected_options: Vec<Uuid>,
        time_spent: f64,
    ) -> Result<(), ServiceError> {
        self.ensure_cached(match_id).await?;

        let (question, index) = {
            let session = self
                .sessions
                .get(&match_id)
                .ok_or_else(|| session_missing(match_id))?;
            if session.status != MatchStatus::InProgress {
                return Err(ServiceError::InvalidState(
                    "submissions are only accepted while a question is live".into(),
                ));
            }
            let player = session
                .players
                .get(&origin.user_id)
                .ok_or_else(not_participant)?;
            if player.has_submitted {
                // Idempotent no-op so clients can safely retry over a flaky link.
                debug!(%match_id, user_id = %origin.user_id, "duplicate submission ignored");
                return Ok(());
            }
            (session.current_question().cloned(), session.current_index)
        };

        // The authoritative question is the stored index; the client-claimed
        // id is advisory only.
        let (outcome, correct_options, recorded_question_id) = match &question {
            Some(question) => {
                if question_id != question.id {
                    debug!(%match_id, claimed = %question_id, actual = %question.id, "submission carried a stale question id");
                }
                scoring::validate_submission(
                    question,
                    &selected_options,
                    time_spent,
                    self.config.scoring(),
                )?;
                (
                    scoring::score_submission(
                        question,
                        &selected_options,
                        time_spent,
                        self.config.scoring(),
                    ),
                    question.correct_option_ids().into_iter().collect(),
                    question.id,
                )
            }
            None => {
                // Scoring fault: record the submission unscored rather than
                // stall the match waiting for an answer that already arrived.
                error!(%match_id, index, "current question missing while in progress; recording unscored submission");
                (
                    ScoreOutcome {
                        correct: false,
                        points: 0,
                    },
                    Vec::new(),
                    question_id,
                )
            }
        };

        let (entity, emissions, advance) = {
            let session = self
                .sessions
                .get_mut(&match_id)
                .ok_or_else(|| session_missing(match_id))?;
            let player = session
                .players
                .get_mut(&origin.user_id)
                .ok_or_else(not_participant)?;

            player.answers.push(AnswerRecord {
                question_id: recorded_question_id,
                selected_option_ids: selected_options,
                correct: outcome.correct,
                time_spent_secs: time_spent,
                points: outcome.points,
            });
            player.score += outcome.points;
            player.has_submitted = true;
            let total_score = player.score;
            let username = player.username.clone();
            session.touch();

            let advance = session.all_submitted();
            let mut emissions = vec![
                WorkerEvent::Emit {
                    socket: origin.socket,
                    event: ServerEvent::AnswerResult {
                        is_correct: outcome.correct,
                        points: outcome.points,
                        correct_options,
                        total_score,
                    },
                },
                WorkerEvent::Broadcast {
                    match_id,
                    exclude: vec![origin.socket],
                    event: ServerEvent::OpponentSubmitted {
                        user_id: origin.user_id,
                        username,
                    },
                },
            ];
            if !advance {
                let waiting_for = session
                    .players
                    .values()
                    .filter(|player| !player.has_submitted)
                    .map(|player| player.username.clone())
                    .collect();
                emissions.push(WorkerEvent::Emit {
                    socket: origin.socket,
                    event: ServerEvent::WaitingForOpponent {
                        message: "waiting for your opponent to answer".into(),
                        waiting_for,
                    },
                });
            }
            (SessionEntity::from(&*session), emissions, advance)
        };

        self.persist(entity).await;
        for event in emissions {
            self.send(event);
        }

        if advance {
            // Cancel before advancing so no timer survives for the old index.
            self.timers.cancel(match_id, index);
            self.advance_or_complete(match_id).await?;
        }
        Ok(())
    }

    async fn handle_timeout(
        &mut self,
        match_id: Uuid,
        question_index: usize,
    ) -> Result<(), ServiceError> {
        self.timers.forget(match_id, question_index);

        // Timer callbacks re-validate against current state; a session that
        // advanced or completed through the submission path makes this a no-op.
        let entity = {
            let Some(session) = self.sessions.get_mut(&match_id) else {
                debug!(%match_id, question_index, "timeout for unknown session ignored");
                return Ok(());
            };
            if session.status != MatchStatus::InProgress
                || session.current_index != question_index
            {
                debug!(%match_id, question_index, "stale timeout ignored");
                return Ok(());
            }

            // An unanswered question counts as a zero-point non-submission.
            for player in session.players.values_mut() {
                player.has_submitted = true;
            }
            session.touch();
            SessionEntity::from(&*session)
        };

        self.persist(entity).await;
        self.broadcast(
            match_id,
            Vec::new(),
            ServerEvent::QuestionTimeout {
                message: "time is up".into(),
                question_index,
            },
        );
        self.advance_or_complete(match_id).await
    }

    async fn advance_or_complete(&mut self, match_id: Uuid) -> Result<(), ServiceError> {
        enum Step {
            Next(SessionEntity, ServerEvent, usize, u32),
            Done,
        }

        let step = {
            let session = self
                .sessions
                .get_mut(&match_id)
                .ok_or_else(|| session_missing(match_id))?;
            let next = session.current_index + 1;
            if next >= session.questions.len() {
                Step::Done
            } else {
                session.current_index = next;
                session.presented_at = Some(SystemTime::now());
                session.reset_submission_flags();
                session.touch();

                let question = session.current_question().ok_or_else(|| {
                    ServiceError::InvalidState("session has no current question".into())
                })?;
                Step::Next(
                    SessionEntity::from(&*session),
                    ServerEvent::NextQuestion {
                        question: question.into(),
                        question_index: next,
                        total_questions: session.questions.len(),
                    },
                    next,
                    question.time_limit_secs,
                )
            }
        };

        match step {
            Step::Next(entity, event, index, limit) => {
                self.persist(entity).await;
                self.broadcast(match_id, Vec::new(), event);
                self.timers.arm(
                    match_id,
                    index,
                    Duration::from_secs(u64::from(limit)),
                    self.self_tx.clone(),
                );
                Ok(())
            }
            Step::Done => self.complete_match(match_id).await,
        }
    }

    async fn complete_match(&mut self, match_id: Uuid) -> Result<(), ServiceError> {
        let (entity, record) = {
            let session = self
                .sessions
                .get_mut(&match_id)
                .ok_or_else(|| session_missing(match_id))?;
            session.status = session.status.apply(MatchEvent::Complete)?;
            session.touch();
            (SessionEntity::from(&*session), build_match_record(session))
        };

        self.timers.cancel_all_for(match_id);
        self.persist(entity).await;
        self.broadcast(match_id, Vec::new(), ServerEvent::match_completed(&record));

        // History is best-effort: the completion broadcast above is already
        // out and must never be held hostage by the sink.
        if let Some(sink) = self.backends.result_sink().await {
            if let Err(err) = sink.record_match(record).await {
                warn!(%match_id, error = %err, "failed to record match results in the history sink");
            }
        }

        let delay = self.config.completion_grace();
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(WorkerCommand::PurgeSession { match_id });
        });
        info!(worker = self.id, %match_id, "match completed");
        Ok(())
    }

    fn handle_disconnected(&mut self, match_id: Uuid, user_id: Uuid, socket: Uuid) {
        let detached = {
            let Some(session) = self.sessions.get_mut(&match_id) else {
                return;
            };
            let Some(player) = session.players.get_mut(&user_id) else {
                return;
            };
            // Ignore stale notifications once a reconnect replaced the handle.
            if player.socket_id == Some(socket) {
                player.socket_id = None;
                true
            } else {
                false
            }
        };

        if detached {
            self.send(WorkerEvent::Unbind { match_id, user_id });
            debug!(worker = self.id, %match_id, %user_id, "participant disconnected");
        }
    }

    async fn handle_purge(&mut self, match_id: Uuid) {
        self.timers.cancel_all_for(match_id);
        let session = self.sessions.remove(&match_id);

        if let Some(store) = self.backends.session_store().await {
            if let Err(err) = store.delete_session(match_id).await {
                warn!(%match_id, error = %err, "failed to delete session from durable store");
            }
            if let Some(code) = session.and_then(|session| session.join_code) {
                if let Err(err) = store.delete_join_code(code).await {
                    warn!(%match_id, error = %err, "failed to delete join code from durable store");
                }
            }
        }

        self.send(WorkerEvent::Closed { match_id });
        info!(worker = self.id, %match_id, "session purged");
    }

    fn send(&self, event: WorkerEvent) {
        if self.events.send(event).is_err() {
            warn!(worker = self.id, "event channel closed; dropping event");
        }
    }

    fn emit(&self, socket: Uuid, event: ServerEvent) {
        self.send(WorkerEvent::Emit { socket, event });
    }

    fn broadcast(&self, match_id: Uuid, exclude: Vec<Uuid>, event: ServerEvent) {
        self.send(WorkerEvent::Broadcast {
            match_id,
            exclude,
            event,
        });
    }
}

fn build_match_record(session: &MatchSession) -> MatchRecordEntity {
    let total_questions = session.questions.len();
    let winner = decide_winner(session);
    let players = session
        .players
        .values()
        .map(|player| PlayerResultEntity {
            user_id: player.user_id,
            username: player.username.clone(),
            total_score: player.score,
            correct_count: player.correct_count(),
            total_time_secs: player.total_time_secs(),
            accuracy_pct: if total_questions == 0 {
                0.0
            } else {
                player.correct_count() as f64 * 100.0 / total_questions as f64
            },
            winner: winner == Some(player.user_id),
        })
        .collect();

    MatchRecordEntity {
        match_id: session.id,
        quiz_id: session.quiz_id,
        completed_at: SystemTime::now(),
        winner,
        players,
    }
}

/// Highest score wins; ties prefer the lower total time spent, then join order.
fn decide_winner(session: &MatchSession) -> Option<Uuid> {
    let mut best: Option<&Player> = None;
    for player in session.players.values() {
        let better = match best {
            None => true,
            Some(current) => {
                player.score > current.score
                    || (player.score == current.score
                        && player.total_time_secs() < current.total_time_secs())
            }
        };
        if better {
            best = Some(player);
        }
    }
    best.map(|player| player.user_id)
}
