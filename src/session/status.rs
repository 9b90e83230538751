use thiserror::Error;

use crate::dao::models::MatchStatusEntity;

/// High-level status a duel session can be in.
///
/// Statuses only ever move forward; no status is re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    /// Capacity not yet filled, or filled but not everyone marked ready.
    Waiting,
    /// Exactly one question index is current; submissions are being scored.
    InProgress,
    /// Terminal. Results are computed and the session awaits purge.
    Completed,
}

/// Events that can be applied to the session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEvent {
    /// Capacity is met and every participant flagged ready.
    Start,
    /// The last question index was left, by submission or timeout.
    Complete,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The status the session was in when the invalid event was received.
    pub from: MatchStatus,
    /// The event that cannot be applied from this status.
    pub event: MatchEvent,
}

impl MatchStatus {
    /// Compute the status reached by applying `event`, if the transition is valid.
    pub fn apply(self, event: MatchEvent) -> Result<MatchStatus, InvalidTransition> {
        match (self, event) {
            (MatchStatus::Waiting, MatchEvent::Start) => Ok(MatchStatus::InProgress),
            (MatchStatus::InProgress, MatchEvent::Complete) => Ok(MatchStatus::Completed),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }

    /// Whether the session has reached its terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, MatchStatus::Completed)
    }
}

impl From<MatchStatusEntity> for MatchStatus {
    fn from(value: MatchStatusEntity) -> Self {
        match value {
            MatchStatusEntity::Waiting => MatchStatus::Waiting,
            MatchStatusEntity::InProgress => MatchStatus::InProgress,
            MatchStatusEntity::Completed => MatchStatus::Completed,
        }
    }
}

impl From<MatchStatus> for MatchStatusEntity {
    fn from(value: MatchStatus) -> Self {
        match value {
            MatchStatus::Waiting => MatchStatusEntity::Waiting,
            MatchStatus::InProgress => MatchStatusEntity::InProgress,
            MatchStatus::Completed => MatchStatusEntity::Completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_path_is_valid() {
        let status = MatchStatus::Waiting;
        let status = status.apply(MatchEvent::Start).unwrap();
        assert_eq!(status, MatchStatus::InProgress);
        let status = status.apply(MatchEvent::Complete).unwrap();
        assert_eq!(status, MatchStatus::Completed);
        assert!(status.is_terminal());
    }

    #[test]
    fn backward_and_repeated_transitions_are_rejected() {
        let err = MatchStatus::InProgress.apply(MatchEvent::Start).unwrap_err();
        assert_eq!(err.from, MatchStatus::InProgress);
        assert_eq!(err.event, MatchEvent::Start);

        assert!(MatchStatus::Waiting.apply(MatchEvent::Complete).is_err());
        assert!(MatchStatus::Completed.apply(MatchEvent::Start).is_err());
        assert!(MatchStatus::Completed.apply(MatchEvent::Complete).is_err());
    }

    #[test]
    fn entity_conversion_round_trips() {
        for status in [
            MatchStatus::Waiting,
            MatchStatus::InProgress,
            MatchStatus::Completed,
        ] {
            let entity: MatchStatusEntity = status.into();
            assert_eq!(MatchStatus::from(entity), status);
        }
    }
}
