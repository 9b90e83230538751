//! Service error taxonomy and its mapping onto wire-level error codes.

use thiserror::Error;

use crate::{dao::storage::StorageError, session::status::InvalidTransition};

/// Errors that can occur while handling a match command.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Connection is not authenticated or presented an invalid token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Command is valid but illegal for the session's current status.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested match was not found, even after a durable-store lookup.
    #[error("not found: {0}")]
    NotFound(String),
    /// No execution unit has room for another session.
    #[error("capacity exceeded: {0}")]
    Capacity(String),
    /// The execution unit owning the session is gone.
    #[error("worker unavailable: {0}")]
    WorkerUnavailable(String),
}

impl ServiceError {
    /// Stable code delivered to clients inside `match_error` events.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Unavailable(_) | ServiceError::Degraded => "storage_unavailable",
            ServiceError::Unauthorized(_) => "unauthorized",
            ServiceError::InvalidInput(_) => "validation_error",
            ServiceError::InvalidState(_) => "state_conflict",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Capacity(_) => "capacity_exceeded",
            ServiceError::WorkerUnavailable(_) => "worker_unavailable",
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ServiceError::Degraded.code(), "storage_unavailable");
        assert_eq!(
            ServiceError::InvalidInput("x".into()).code(),
            "validation_error"
        );
        assert_eq!(
            ServiceError::InvalidState("x".into()).code(),
            "state_conflict"
        );
        assert_eq!(ServiceError::NotFound("x".into()).code(), "not_found");
        assert_eq!(
            ServiceError::Capacity("x".into()).code(),
            "capacity_exceeded"
        );
    }
}
