//! Serialized representations shared between the durable store and the sinks.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Lifecycle status stored with a serialized session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatusEntity {
    /// Waiting for players or ready flags.
    Waiting,
    /// A question is currently presented.
    InProgress,
    /// Terminal; results are final.
    Completed,
}

/// One selectable option of a persisted question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerOptionEntity {
    /// Stable identifier for the option.
    pub id: Uuid,
    /// Option text shown to players.
    pub text: String,
    /// Whether this option is part of the correct set.
    pub correct: bool,
}

/// Persisted question, denormalized into the session at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntity {
    /// Stable identifier for the question.
    pub id: Uuid,
    /// Question text shown to players.
    pub text: String,
    /// Selectable options including correctness flags.
    pub options: Vec<AnswerOptionEntity>,
    /// Seconds players have to answer.
    pub time_limit_secs: u32,
}

/// One graded submission in a player's persisted answer log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerRecordEntity {
    /// Question this record answers.
    pub question_id: Uuid,
    /// Options the player selected.
    pub selected_option_ids: Vec<Uuid>,
    /// Whether the selection matched the correct set exactly.
    pub correct: bool,
    /// Seconds the player reported spending.
    pub time_spent_secs: f64,
    /// Points awarded.
    pub points: u32,
}

/// Persisted participant record inside a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerEntity {
    /// Participant identity.
    pub user_id: Uuid,
    /// Display name.
    pub username: String,
    /// Accumulated score.
    pub score: u32,
    /// Ready flag gating the match start.
    pub ready: bool,
    /// Submission flag for the current question index.
    pub has_submitted: bool,
    /// Ordered answer log.
    pub answers: Vec<AnswerRecordEntity>,
}

/// Full serialized session, the value stored per match id in the durable store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionEntity {
    /// Match identifier, the durable-store key.
    pub id: Uuid,
    /// Human-shareable join code, if one was issued.
    pub join_code: Option<String>,
    /// Quiz the question list was resolved from.
    pub quiz_id: Uuid,
    /// Denormalized immutable question list.
    pub questions: Vec<QuestionEntity>,
    /// Lifecycle status.
    pub status: MatchStatusEntity,
    /// 0-based index of the current question.
    pub current_index: usize,
    /// Wall-clock instant the current question was presented.
    pub presented_at: Option<SystemTime>,
    /// Participants in join order.
    pub players: Vec<PlayerEntity>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last mutation timestamp.
    pub updated_at: SystemTime,
}

/// Aggregated per-player outcome written to the long-term result sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerResultEntity {
    /// Participant identity.
    pub user_id: Uuid,
    /// Display name at completion time.
    pub username: String,
    /// Final accumulated score.
    pub total_score: u32,
    /// Number of correctly answered questions.
    pub correct_count: usize,
    /// Total seconds spent across all answers.
    pub total_time_secs: f64,
    /// Correct answers over total questions, as a percentage.
    pub accuracy_pct: f64,
    /// Whether this player won the duel.
    pub winner: bool,
}

/// Completed-match record upserted into the long-term result sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchRecordEntity {
    /// Match identifier; upsert key together with each player id.
    pub match_id: Uuid,
    /// Quiz the duel was played on.
    pub quiz_id: Uuid,
    /// Completion timestamp.
    pub completed_at: SystemTime,
    /// Winning participant, if any player was present.
    pub winner: Option<Uuid>,
    /// Per-player aggregates.
    pub players: Vec<PlayerResultEntity>,
}
