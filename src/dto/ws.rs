//! Wire protocol: commands accepted from clients and events pushed back.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{MatchRecordEntity, PlayerResultEntity},
    dto::{format_system_time, validation::validate_username},
    session::{AnswerRecord, MatchSession, Player, Question},
};

/// Display-name payload attached to create/join commands.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ParticipantInfo {
    /// Display name used in rosters and events for this match.
    pub username: String,
}

impl Validate for ParticipantInfo {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(err) = validate_username(&self.username) {
            errors.add("username", err);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Commands accepted from duel WebSocket clients.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Handshake: must be the first frame on every connection.
    Authenticate {
        /// Participant identity issued by the external identity service.
        user_id: Uuid,
        /// Account name, used as the fallback display name.
        username: String,
        /// Opaque token verified by the configured verifier.
        token: String,
    },
    /// Create a fresh match from a published quiz.
    CreateMatch {
        /// Quiz to resolve the question list from.
        quiz_id: Uuid,
        /// Creator's display-name payload.
        participant_info: ParticipantInfo,
    },
    /// Join an existing match by id or shareable code.
    JoinMatch {
        /// Target match id, if known.
        #[serde(default)]
        match_id: Option<Uuid>,
        /// Shareable join code, alternative to the id.
        #[serde(default)]
        join_code: Option<String>,
        /// Joiner's display-name payload.
        participant_info: ParticipantInfo,
    },
    /// Reconnect to (or observe) a match the participant already belongs to.
    ConnectToMatch {
        /// Target match id.
        match_id: Uuid,
    },
    /// Flag the sender as ready to start.
    PlayerReady,
    /// Submit an answer for the current question.
    SubmitAnswer {
        /// Question the client believes is current; advisory only.
        question_id: Uuid,
        /// Selected option ids; must be non-empty.
        selected_options: Vec<Uuid>,
        /// Seconds spent answering.
        time_spent: f64,
    },
}

/// Error produced when an inbound frame cannot become a valid command.
#[derive(Debug, Error)]
pub enum CommandParseError {
    /// Frame was not valid JSON for any known command.
    #[error("malformed command: {0}")]
    Json(#[from] serde_json::Error),
    /// Frame parsed but carried invalid field values.
    #[error("invalid command: {0}")]
    Validation(#[from] ValidationErrors),
}

impl ClientCommand {
    /// Parse and validate a raw text frame.
    pub fn from_json_str(raw: &str) -> Result<Self, CommandParseError> {
        let command: Self = serde_json::from_str(raw)?;
        match &command {
            ClientCommand::CreateMatch {
                participant_info, ..
            }
            | ClientCommand::JoinMatch {
                participant_info, ..
            } => participant_info.validate()?,
            _ => {}
        }
        Ok(command)
    }
}

/// Sanitized option snapshot; never carries the correctness flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OptionSnapshot {
    /// Stable identifier for the option.
    pub id: Uuid,
    /// Option text.
    pub text: String,
}

/// Sanitized question payload pushed to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionSnapshot {
    /// Stable identifier for the question.
    pub id: Uuid,
    /// Question text.
    pub text: String,
    /// Selectable options, correctness withheld.
    pub options: Vec<OptionSnapshot>,
    /// Seconds available to answer.
    pub time_limit: u32,
}

impl From<&Question> for QuestionSnapshot {
    fn from(question: &Question) -> Self {
        Self {
            id: question.id,
            text: question.text.clone(),
            options: question
                .options
                .iter()
                .map(|option| OptionSnapshot {
                    id: option.id,
                    text: option.text.clone(),
                })
                .collect(),
            time_limit: question.time_limit_secs,
        }
    }
}

/// Public projection of a participant for roster events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerSummary {
    /// Participant identity.
    pub user_id: Uuid,
    /// Display name.
    pub username: String,
    /// Ready flag.
    pub is_ready: bool,
    /// Accumulated score.
    pub score: u32,
    /// Whether a transport handle is currently attached.
    pub connected: bool,
}

impl From<&Player> for PlayerSummary {
    fn from(player: &Player) -> Self {
        Self {
            user_id: player.user_id,
            username: player.username.clone(),
            is_ready: player.ready,
            score: player.score,
            connected: player.socket_id.is_some(),
        }
    }
}

/// One answer-log entry as exposed in reconnect snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerRecordSummary {
    /// Question answered.
    pub question_id: Uuid,
    /// Options selected.
    pub selected_options: Vec<Uuid>,
    /// Whether the answer was correct.
    pub is_correct: bool,
    /// Seconds spent.
    pub time_spent: f64,
    /// Points awarded.
    pub points: u32,
}

impl From<&AnswerRecord> for AnswerRecordSummary {
    fn from(record: &AnswerRecord) -> Self {
        Self {
            question_id: record.question_id,
            selected_options: record.selected_option_ids.clone(),
            is_correct: record.correct,
            time_spent: record.time_spent_secs,
            points: record.points,
        }
    }
}

/// Final per-player aggregates pushed with `match_completed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerResultSummary {
    /// Participant identity.
    pub user_id: Uuid,
    /// Display name.
    pub username: String,
    /// Final score.
    pub total_score: u32,
    /// Correct answers.
    pub correct_count: usize,
    /// Total seconds spent.
    pub total_time: f64,
    /// Correct answers over total questions, percentage.
    pub accuracy: f64,
    /// Whether this player won.
    pub is_winner: bool,
}

impl From<&PlayerResultEntity> for PlayerResultSummary {
    fn from(entity: &PlayerResultEntity) -> Self {
        Self {
            user_id: entity.user_id,
            username: entity.username.clone(),
            total_score: entity.total_score,
            correct_count: entity.correct_count,
            total_time: entity.total_time_secs,
            accuracy: entity.accuracy_pct,
            is_winner: entity.winner,
        }
    }
}

/// Events pushed from the server to duel clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Handshake acknowledgement.
    Authenticated {
        /// Verified participant identity.
        user_id: Uuid,
    },
    /// Targeted reply after creating or connecting to a waiting match.
    MatchConnected {
        /// Match identifier.
        match_id: Uuid,
        /// Shareable join code, if issued.
        join_code: Option<String>,
        /// Current roster.
        players: Vec<PlayerSummary>,
    },
    /// Targeted reply after joining a match.
    MatchJoined {
        /// Match identifier.
        match_id: Uuid,
        /// Current roster.
        players: Vec<PlayerSummary>,
    },
    /// Roster changed; broadcast to the whole match.
    PlayerListUpdated {
        /// Current roster.
        players: Vec<PlayerSummary>,
    },
    /// A participant toggled their ready flag.
    PlayerReady {
        /// Participant who changed.
        user_id: Uuid,
        /// New flag value.
        is_ready: bool,
    },
    /// The match started; first question attached.
    MatchStarted {
        /// Sanitized first question.
        question: QuestionSnapshot,
        /// Index of the question (always 0 here).
        question_index: usize,
        /// Total number of questions.
        total_questions: usize,
    },
    /// Advancement to the next question.
    NextQuestion {
        /// Sanitized question.
        question: QuestionSnapshot,
        /// New current index.
        question_index: usize,
        /// Total number of questions.
        total_questions: usize,
    },
    /// The current question's timer fired before everyone submitted.
    QuestionTimeout {
        /// Human-readable notice.
        message: String,
        /// Index of the timed-out question.
        question_index: usize,
    },
    /// Targeted grading outcome for the submitter.
    AnswerResult {
        /// Whether the submission was correct.
        is_correct: bool,
        /// Points awarded.
        points: u32,
        /// The correct option ids, revealed after grading.
        correct_options: Vec<Uuid>,
        /// Submitter's new accumulated score.
        total_score: u32,
    },
    /// Targeted notice to the other participant that the opponent answered.
    OpponentSubmitted {
        /// Submitting participant.
        user_id: Uuid,
        /// Their display name.
        username: String,
    },
    /// Targeted notice that the submitter is waiting on the opponent.
    WaitingForOpponent {
        /// Human-readable notice.
        message: String,
        /// Display names still owing a submission.
        waiting_for: Vec<String>,
    },
    /// Final results; broadcast to the whole match.
    MatchCompleted {
        /// Per-player aggregates.
        results: Vec<PlayerResultSummary>,
        /// Winning participant, if any.
        winner: Option<Uuid>,
        /// RFC 3339 completion timestamp.
        completed_at: String,
    },
    /// Targeted snapshot letting a reconnecting client resume mid-question.
    MatchReconnected {
        /// Sanitized current question.
        question: QuestionSnapshot,
        /// Current question index.
        question_index: usize,
        /// Total number of questions.
        total_questions: usize,
        /// Seconds already elapsed on the current question.
        time_elapsed: f64,
        /// The player's accumulated score.
        player_score: u32,
        /// The player's full answer history.
        player_answers: Vec<AnswerRecordSummary>,
        /// Whether the player already submitted for the current question.
        has_submitted_current: bool,
    },
    /// Any command failure, with a stable machine-readable code.
    MatchError {
        /// Human-readable message.
        error: String,
        /// Stable error code.
        code: String,
    },
}

impl ServerEvent {
    /// Roster projection of a session, in join order.
    pub fn roster(session: &MatchSession) -> Vec<PlayerSummary> {
        session.players.values().map(Into::into).collect()
    }

    /// Build the `match_completed` payload from a sink record.
    pub fn match_completed(record: &MatchRecordEntity) -> Self {
        ServerEvent::MatchCompleted {
            results: record.players.iter().map(Into::into).collect(),
            winner: record.winner,
            completed_at: format_system_time(record.completed_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AnswerOption;

    #[test]
    fn commands_parse_from_tagged_json() {
        let raw = r#"{"type":"submit_answer","question_id":"6fa459ea-ee8a-3ca4-894e-db77e160355e","selected_options":["6fa459ea-ee8a-3ca4-894e-db77e160355e"],"time_spent":12.5}"#;
        let command = ClientCommand::from_json_str(raw).unwrap();
        assert!(matches!(command, ClientCommand::SubmitAnswer { time_spent, .. } if time_spent == 12.5));

        let raw = r#"{"type":"player_ready"}"#;
        assert!(matches!(
            ClientCommand::from_json_str(raw).unwrap(),
            ClientCommand::PlayerReady
        ));
    }

    #[test]
    fn blank_username_fails_parse_validation() {
        let raw = r#"{"type":"create_match","quiz_id":"6fa459ea-ee8a-3ca4-894e-db77e160355e","participant_info":{"username":"  "}}"#;
        assert!(matches!(
            ClientCommand::from_json_str(raw),
            Err(CommandParseError::Validation(_))
        ));
    }

    #[test]
    fn unknown_command_type_is_rejected() {
        let raw = r#"{"type":"drop_table"}"#;
        assert!(matches!(
            ClientCommand::from_json_str(raw),
            Err(CommandParseError::Json(_))
        ));
    }

    #[test]
    fn question_snapshot_never_leaks_correctness() {
        let question = Question {
            id: Uuid::new_v4(),
            text: "q".into(),
            options: vec![AnswerOption {
                id: Uuid::new_v4(),
                text: "a".into(),
                correct: true,
            }],
            time_limit_secs: 30,
        };

        let snapshot = QuestionSnapshot::from(&question);
        let serialized = serde_json::to_string(&snapshot).unwrap();
        assert!(!serialized.contains("correct"));
    }

    #[test]
    fn server_events_serialize_with_event_tag() {
        let event = ServerEvent::PlayerReady {
            user_id: Uuid::new_v4(),
            is_ready: true,
        };
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "player_ready");
        assert_eq!(value["data"]["is_ready"], true);
    }
}
