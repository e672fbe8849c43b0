//! Error types for the waiting-room service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application. Callers that need to branch on failure category
//! use [`error_kind`] rather than matching on variants directly.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// The three failure categories callers are expected to distinguish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input, rejected before any store access. Never retried.
    Invalid,
    /// Store or presence backend unreachable.
    Unavailable,
    /// Any other backend or internal failure.
    Unexpected,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Invalid => write!(f, "invalid"),
            ErrorKind::Unavailable => write!(f, "unavailable"),
            ErrorKind::Unexpected => write!(f, "unexpected"),
        }
    }
}

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("Invalid user id: {reason}")]
    InvalidUserId { reason: String },

    #[error("Invalid category: {reason}")]
    InvalidCategory { reason: String },

    #[error("Unknown category: {category}")]
    UnknownCategory { category: String },

    #[error("Waiting pool store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Presence store unavailable: {message}")]
    PresenceUnavailable { message: String },

    #[error("Scheduler cannot {operation} while {state}")]
    InvalidSchedulerState { operation: String, state: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl MatchmakingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MatchmakingError::InvalidUserId { .. }
            | MatchmakingError::InvalidCategory { .. }
            | MatchmakingError::UnknownCategory { .. } => ErrorKind::Invalid,
            MatchmakingError::StoreUnavailable { .. }
            | MatchmakingError::PresenceUnavailable { .. } => ErrorKind::Unavailable,
            MatchmakingError::InvalidSchedulerState { .. }
            | MatchmakingError::ConfigurationError { .. }
            | MatchmakingError::InternalError { .. } => ErrorKind::Unexpected,
        }
    }

    pub(crate) fn lock_poisoned(what: &str) -> Self {
        MatchmakingError::InternalError {
            message: format!("Failed to acquire {} lock", what),
        }
    }
}

/// Classify an error chain. Anything that is not a [`MatchmakingError`] is unexpected.
pub fn error_kind(error: &anyhow::Error) -> ErrorKind {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<MatchmakingError>())
        .map(MatchmakingError::kind)
        .unwrap_or(ErrorKind::Unexpected)
}
