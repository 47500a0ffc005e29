use thiserror::Error;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, state::state_machine::InvalidTransition};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed pin, name or option.
    #[error("{0}")]
    Validation(String),
    /// Unknown pin, player or room.
    #[error("{0}")]
    NotFound(String),
    /// Secret, role or connection registration mismatch.
    #[error("{0}")]
    Unauthorized(String),
    /// Operation cannot be performed in the current room state.
    #[error("{0}")]
    InvalidState(String),
    /// Admission denied by a rate limiter; carries the advisory text.
    #[error("{0}")]
    RateLimited(&'static str),
    #[error("Room is full")]
    RoomFull,
    /// No free pin could be drawn within the configured attempts.
    #[error("Could not allocate a room pin, try again")]
    PinExhausted,
    /// Lost a conditional write to a concurrent executor.
    #[error("concurrent update won by another executor")]
    Conflict,
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
}

impl ServiceError {
    /// Message shown to the client, or `None` when the failure stays silent.
    pub fn advisory(&self) -> Option<String> {
        match self {
            ServiceError::Conflict => None,
            ServiceError::Unavailable(_) | ServiceError::Degraded => {
                Some("Service temporarily unavailable".into())
            }
            other => Some(other.to_string()),
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
        ServiceError::InvalidState(format!(
            "Not allowed while the room is {}",
            err.from.as_str()
        ))
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        let message = err
            .field_errors()
            .into_values()
            .flatten()
            .find_map(|error| error.message.clone())
            .map(|message| message.into_owned())
            .unwrap_or_else(|| format!("validation failed: {err}"));
        ServiceError::Validation(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::state_machine::{RoomEvent, RoomState};

    #[test]
    fn conflicts_are_silent() {
        assert_eq!(ServiceError::Conflict.advisory(), None);
        assert_eq!(
            ServiceError::RoomFull.advisory().as_deref(),
            Some("Room is full")
        );
    }

    #[test]
    fn infrastructure_failures_hide_details() {
        let err = ServiceError::from(StorageError::Corrupted("rooms/abc".into()));
        assert_eq!(
            err.advisory().as_deref(),
            Some("Service temporarily unavailable")
        );
    }

    #[test]
    fn invalid_transitions_name_the_current_state() {
        let err = ServiceError::from(InvalidTransition {
            from: RoomState::Question,
            event: RoomEvent::OpenQuestion,
        });
        assert_eq!(
            err.advisory().as_deref(),
            Some("Not allowed while the room is QUESTION")
        );
    }
}
