//! Error Taxonomy
//!
//! Every failure the command engine can observe. Some variants are user-facing
//! notices (the dispatcher replies and keeps serving), the rest abort only the
//! operation that raised them.

use thiserror::Error;

/// Which outbound service a call was made against
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Service {
    /// The task-board service (Trello)
    Board,
    /// The chat service (Telegram)
    Messaging,
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Board => write!(f, "board service"),
            Self::Messaging => write!(f, "messaging service"),
        }
    }
}

/// Errors raised by the command engine
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifierError {
    /// A due date did not match `day.month.year`
    #[error("Invalid date '{0}', expected day.month.year (e.g. 22.02.2021)")]
    InvalidDateFormat(String),

    /// A trigger time did not match `HH:MM`
    #[error("Invalid trigger time '{0}', expected HH:MM")]
    InvalidTriggerTime(String),

    /// `/add` was given fewer than a date and a name
    #[error("Usage: /add <dd.mm.yyyy> <card name>")]
    MissingArguments,

    /// A button payload could not be split into kind and reference
    #[error("Malformed action payload: {0}")]
    MalformedPayload(String),

    /// An encoded button payload exceeds the transport limit
    #[error("Action payload is {size} bytes, limit is {limit}")]
    PayloadTooLarge {
        /// Encoded size in bytes
        size: usize,
        /// Transport limit in bytes
        limit: usize,
    },

    /// A button payload carried an action tag this bot does not know
    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    /// An add-flow callback arrived with no conversation to receive it
    #[error("No add dialog in progress")]
    NoActiveConversation,

    /// A second add command arrived while a conversation is active
    #[error("An add dialog is already in progress")]
    ConversationInProgress,

    /// The board or messaging service was unreachable or rejected a call
    #[error("{service} error: {message}")]
    UpstreamServiceError {
        /// Which service failed
        service: Service,
        /// Description from the transport or the service
        message: String,
    },
}

impl NotifierError {
    /// Build a board-service failure
    pub fn board(message: impl Into<String>) -> Self {
        Self::UpstreamServiceError {
            service: Service::Board,
            message: message.into(),
        }
    }

    /// Build a messaging-service failure
    pub fn messaging(message: impl Into<String>) -> Self {
        Self::UpstreamServiceError {
            service: Service::Messaging,
            message: message.into(),
        }
    }

    /// Whether the user should be shown this error as a notice
    #[must_use]
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::PayloadTooLarge { .. })
    }
}

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, NotifierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_display_names_service() {
        let err = NotifierError::board("401 unauthorized");
        assert_eq!(err.to_string(), "board service error: 401 unauthorized");

        let err = NotifierError::messaging("timeout");
        assert_eq!(err.to_string(), "messaging service error: timeout");
    }

    #[test]
    fn test_payload_too_large_is_not_user_visible() {
        let err = NotifierError::PayloadTooLarge { size: 80, limit: 64 };
        assert!(!err.is_user_visible());
        assert!(NotifierError::NoActiveConversation.is_user_visible());
        assert!(NotifierError::UnknownAction("x".to_string()).is_user_visible());
    }
}
