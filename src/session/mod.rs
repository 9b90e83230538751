//! Runtime representation of a duel session and its participants.

pub mod scoring;
pub mod status;

use std::{
    collections::HashSet,
    time::{Duration, SystemTime},
};

use indexmap::IndexMap;
use uuid::Uuid;

use crate::dao::models::{
    AnswerOptionEntity, AnswerRecordEntity, PlayerEntity, QuestionEntity, SessionEntity,
};
use status::MatchStatus;

/// Fixed participant capacity of a duel.
pub const MATCH_CAPACITY: usize = 2;

/// One selectable option of a question, including its withheld correctness flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOption {
    /// Stable identifier for the option.
    pub id: Uuid,
    /// Option text shown to players.
    pub text: String,
    /// Whether this option belongs to the correct set. Never sent on the wire.
    pub correct: bool,
}

/// A single timed multiple-choice question, resolved once at session creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Stable identifier for the question.
    pub id: Uuid,
    /// Question text shown to players.
    pub text: String,
    /// Selectable options; one or more may be flagged correct.
    pub options: Vec<AnswerOption>,
    /// Seconds players have to answer before the timeout fires.
    pub time_limit_secs: u32,
}

impl Question {
    /// The set of option ids flagged correct for this question.
    pub fn correct_option_ids(&self) -> HashSet<Uuid> {
        self.options
            .iter()
            .filter(|option| option.correct)
            .map(|option| option.id)
            .collect()
    }
}

/// One graded (or recorded-but-unscored) submission in a player's log.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerRecord {
    /// Question this record answers.
    pub question_id: Uuid,
    /// Options the player selected.
    pub selected_option_ids: Vec<Uuid>,
    /// Whether the selection matched the correct set exactly.
    pub correct: bool,
    /// Seconds the player reported spending on the question.
    pub time_spent_secs: f64,
    /// Points awarded for this record.
    pub points: u32,
}

/// One participant's mutable progress within a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    /// Participant identity.
    pub user_id: Uuid,
    /// Display name used in rosters and events.
    pub username: String,
    /// Transport handle of the connected socket; empty while disconnected.
    pub socket_id: Option<Uuid>,
    /// Accumulated score, monotonically non-decreasing.
    pub score: u32,
    /// Ready flag gating the match start.
    pub ready: bool,
    /// Whether this player has recorded a submission for the current question.
    pub has_submitted: bool,
    /// Ordered-by-submission log of answer records.
    pub answers: Vec<AnswerRecord>,
}

impl Player {
    /// Build a fresh, connected participant.
    pub fn new(user_id: Uuid, username: String, socket_id: Uuid) -> Self {
        Self {
            user_id,
            username,
            socket_id: Some(socket_id),
            score: 0,
            ready: false,
            has_submitted: false,
            answers: Vec::new(),
        }
    }

    /// Total seconds this player spent across all recorded answers.
    pub fn total_time_secs(&self) -> f64 {
        self.answers.iter().map(|record| record.time_spent_secs).sum()
    }

    /// Number of correct answers in the log.
    pub fn correct_count(&self) -> usize {
        self.answers.iter().filter(|record| record.correct).count()
    }
}

/// Authoritative state of one two-player duel.
///
/// Participants are kept in an [`IndexMap`] so join order is preserved; the
/// roster order drives the final tie-break fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSession {
    /// Opaque match identifier.
    pub id: Uuid,
    /// Human-shareable code other players can join with.
    pub join_code: Option<String>,
    /// Quiz this session was resolved from.
    pub quiz_id: Uuid,
    /// Immutable ordered question list, denormalized at creation time.
    pub questions: Vec<Question>,
    /// Current lifecycle status.
    pub status: MatchStatus,
    /// 0-based index of the question currently presented.
    pub current_index: usize,
    /// Wall-clock instant the current question was presented.
    pub presented_at: Option<SystemTime>,
    /// Participants keyed by identity, in join order.
    pub players: IndexMap<Uuid, Player>,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Last time the session was mutated.
    pub updated_at: SystemTime,
}

impl MatchSession {
    /// Build a new in-memory session in the waiting state.
    pub fn new(
        id: Uuid,
        join_code: Option<String>,
        quiz_id: Uuid,
        questions: Vec<Question>,
    ) -> Self {
        let timestamp = SystemTime::now();
        Self {
            id,
            join_code,
            quiz_id,
            questions,
            status: MatchStatus::Waiting,
            current_index: 0,
            presented_at: None,
            players: IndexMap::new(),
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// The question at the current index, if the index is in range.
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    /// Whether both capacity slots are filled.
    pub fn is_full(&self) -> bool {
        self.players.len() >= MATCH_CAPACITY
    }

    /// Whether every participant has flagged ready.
    pub fn all_ready(&self) -> bool {
        !self.players.is_empty() && self.players.values().all(|player| player.ready)
    }

    /// Whether every participant has a recorded submission for the current index.
    pub fn all_submitted(&self) -> bool {
        !self.players.is_empty() && self.players.values().all(|player| player.has_submitted)
    }

    /// Seconds elapsed on the current question, floored at zero.
    pub fn elapsed_on_current(&self, now: SystemTime) -> f64 {
        self.presented_at
            .and_then(|presented| now.duration_since(presented).ok())
            .unwrap_or(Duration::ZERO)
            .as_secs_f64()
    }

    /// Reset every participant's submission flag. Must happen atomically with
    /// each index advance.
    pub fn reset_submission_flags(&mut self) {
        for player in self.players.values_mut() {
            player.has_submitted = false;
        }
    }

    /// Stamp the session as mutated now.
    pub fn touch(&mut self) {
        self.updated_at = SystemTime::now();
    }
}

impl From<QuestionEntity> for Question {
    fn from(value: QuestionEntity) -> Self {
        Self {
            id: value.id,
            text: value.text,
            options: value.options.into_iter().map(Into::into).collect(),
            time_limit_secs: value.time_limit_secs,
        }
    }
}

impl From<Question> for QuestionEntity {
    fn from(value: Question) -> Self {
        Self {
            id: value.id,
            text: value.text,
            options: value.options.into_iter().map(Into::into).collect(),
            time_limit_secs: value.time_limit_secs,
        }
    }
}

impl From<AnswerOptionEntity> for AnswerOption {
    fn from(value: AnswerOptionEntity) -> Self {
        Self {
            id: value.id,
            text: value.text,
            correct: value.correct,
        }
    }
}

impl From<AnswerOption> for AnswerOptionEntity {
    fn from(value: AnswerOption) -> Self {
        Self {
            id: value.id,
            text: value.text,
            correct: value.correct,
        }
    }
}

impl From<AnswerRecordEntity> for AnswerRecord {
    fn from(value: AnswerRecordEntity) -> Self {
        Self {
            question_id: value.question_id,
            selected_option_ids: value.selected_option_ids,
            correct: value.correct,
            time_spent_secs: value.time_spent_secs,
            points: value.points,
        }
    }
}

impl From<AnswerRecord> for AnswerRecordEntity {
    fn from(value: AnswerRecord) -> Self {
        Self {
            question_id: value.question_id,
            selected_option_ids: value.selected_option_ids,
            correct: value.correct,
            time_spent_secs: value.time_spent_secs,
            points: value.points,
        }
    }
}

impl From<PlayerEntity> for Player {
    fn from(value: PlayerEntity) -> Self {
        Self {
            user_id: value.user_id,
            username: value.username,
            // Transport handles are process-local and never persisted; a
            // rehydrated player starts out disconnected.
            socket_id: None,
            score: value.score,
            ready: value.ready,
            has_submitted: value.has_submitted,
            answers: value.answers.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<Player> for PlayerEntity {
    fn from(value: Player) -> Self {
        Self {
            user_id: value.user_id,
            username: value.username,
            score: value.score,
            ready: value.ready,
            has_submitted: value.has_submitted,
            answers: value.answers.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<SessionEntity> for MatchSession {
    fn from(value: SessionEntity) -> Self {
        Self {
            id: value.id,
            join_code: value.join_code,
            quiz_id: value.quiz_id,
            questions: value.questions.into_iter().map(Into::into).collect(),
            status: value.status.into(),
            current_index: value.current_index,
            presented_at: value.presented_at,
            players: value
                .players
                .into_iter()
                .map(|player| (player.user_id, Player::from(player)))
                .collect(),
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl From<&MatchSession> for SessionEntity {
    fn from(value: &MatchSession) -> Self {
        Self {
            id: value.id,
            join_code: value.join_code.clone(),
            quiz_id: value.quiz_id,
            questions: value.questions.iter().cloned().map(Into::into).collect(),
            status: value.status.into(),
            current_index: value.current_index,
            presented_at: value.presented_at,
            players: value
                .players
                .values()
                .cloned()
                .map(Into::into)
                .collect(),
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}
