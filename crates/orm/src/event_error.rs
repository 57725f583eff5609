//! Errors raised by model lifecycle observers

use thiserror::Error;

/// Failure returned by a [`ModelObserver`](crate::events::ModelObserver) hook.
///
/// Returned from a pre-hook (`creating`, `updating`, `deleting`) it aborts
/// the operation before the backend is touched; from a post-hook it is
/// reported after the write already happened.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("Validation error: {message}{}", .hint.as_ref().map(|hint| format!(" (hint: {})", hint)).unwrap_or_default())]
    Validation { message: String, hint: Option<String> },

    #[error("Observer error: {message}")]
    Observer { message: String },

    /// An observer decided later observers and the operation must not run
    #[error("Event propagation stopped: {reason}")]
    PropagationStopped { reason: String },
}

impl EventError {
    pub fn validation(message: &str) -> Self {
        Self::Validation {
            message: message.to_string(),
            hint: None,
        }
    }

    pub fn validation_with_hint(message: &str, hint: &str) -> Self {
        Self::Validation {
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    pub fn observer(message: &str) -> Self {
        Self::Observer {
            message: message.to_string(),
        }
    }

    pub fn propagation_stopped(reason: &str) -> Self {
        Self::PropagationStopped {
            reason: reason.to_string(),
        }
    }

    /// Suggested fix for a validation failure
    pub fn hint(&self) -> Option<&str> {
        match self {
            EventError::Validation { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }
}
