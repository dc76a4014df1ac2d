//! Error types for the Proctor session controller.
//!
//! This module defines the error hierarchy for every session operation,
//! including configuration loading, start preconditions, and failures of
//! the external attempt backend.

use std::path::PathBuf;

/// A specialized `Result` type for Proctor session operations.
pub type Result<T> = std::result::Result<T, ProctorError>;

/// Errors that can occur while running an exam session.
///
/// Every variant renders as a user-facing message with an actionable
/// suggestion, since the controller surfaces these messages directly.
#[derive(Debug, thiserror::Error)]
pub enum ProctorError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your proctor.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Start Preconditions
    // ========================================================================
    /// No authenticated user is attached to the session.
    #[error("You must be signed in to start an exam\n\nSuggestion: Set 'userId' and 'authToken' in proctor.json or pass --user")]
    NotAuthenticated,

    /// The exam has not been loaded or contains no questions.
    #[error("Exam '{exam_id}' is not loaded or has no questions\n\nSuggestion: Reload the exam and try again")]
    ExamNotLoaded {
        /// Identifier of the exam.
        exam_id: String,
    },

    /// Another attempt for this exam is already in progress.
    #[error("An attempt for exam '{exam_id}' is already in progress\n\nSuggestion: Resume the existing attempt with --resume")]
    AttemptInProgress {
        /// Identifier of the exam.
        exam_id: String,
    },

    /// Resume was requested but no in-progress attempt exists.
    #[error("No attempt in progress for exam '{exam_id}'\n\nSuggestion: Start a new attempt instead of resuming")]
    NothingToResume {
        /// Identifier of the exam.
        exam_id: String,
    },

    /// The answered question does not belong to the exam.
    #[error("Question '{question_id}' is not part of this exam\n\nSuggestion: Reload the exam; the question list may have changed")]
    UnknownQuestion {
        /// Identifier of the question.
        question_id: String,
    },

    /// An operation that needs a running attempt was called outside one.
    #[error("No exam is in progress (session is {status})\n\nSuggestion: Start or resume an exam first")]
    NotInProgress {
        /// Current session status.
        status: String,
    },

    // ========================================================================
    // Backend Errors
    // ========================================================================
    /// The attempt backend rejected or failed a request.
    #[error("{operation} failed ({kind}): {message}\n\nSuggestion: {suggestion}")]
    Backend {
        /// The collaborator operation that failed (e.g. "submit attempt").
        operation: String,
        /// The kind of failure.
        kind: BackendErrorKind,
        /// Detailed error message.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // State Machine Errors
    // ========================================================================
    /// Invalid state transition attempted.
    #[error("Invalid state transition: cannot go from {from} to {to}")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Categories of backend failures for structured error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Missing or expired credentials (401/403).
    Unauthorized,
    /// The requested resource does not exist (404).
    NotFound,
    /// The request conflicts with server state (409).
    Conflict,
    /// Rate limit exceeded (429).
    RateLimit,
    /// Server error (5xx responses).
    Server,
    /// Network connectivity issues or timeouts.
    Network,
    /// The response body could not be decoded.
    Decode,
    /// Other unclassified errors.
    Other,
}

impl std::fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Server => write!(f, "server"),
            Self::Network => write!(f, "network"),
            Self::Decode => write!(f, "decode"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl BackendErrorKind {
    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Sign in again; your session may have expired",
            Self::NotFound => "Check the exam identifier",
            Self::Conflict => "Reload the exam; its state changed on the server",
            Self::RateLimit => "Wait a moment and retry",
            Self::Server => "Retry later; the exam service may be experiencing issues",
            Self::Network => "Check your network connection and retry",
            Self::Decode => "Make sure the client and exam service versions match",
            Self::Other => "Retry, and contact support if the problem persists",
        }
    }

    /// Maps an HTTP status code onto an error kind.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Unauthorized,
            404 => Self::NotFound,
            409 => Self::Conflict,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }
}

impl ProctorError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `ExamNotLoaded` error.
    #[must_use]
    pub fn exam_not_loaded(exam_id: impl Into<String>) -> Self {
        Self::ExamNotLoaded {
            exam_id: exam_id.into(),
        }
    }

    /// Creates a new `AttemptInProgress` error.
    #[must_use]
    pub fn attempt_in_progress(exam_id: impl Into<String>) -> Self {
        Self::AttemptInProgress {
            exam_id: exam_id.into(),
        }
    }

    /// Creates a new `NothingToResume` error.
    #[must_use]
    pub fn nothing_to_resume(exam_id: impl Into<String>) -> Self {
        Self::NothingToResume {
            exam_id: exam_id.into(),
        }
    }

    /// Creates a new `UnknownQuestion` error.
    #[must_use]
    pub fn unknown_question(question_id: impl Into<String>) -> Self {
        Self::UnknownQuestion {
            question_id: question_id.into(),
        }
    }

    /// Creates a new `NotInProgress` error.
    #[must_use]
    pub fn not_in_progress(status: impl std::fmt::Display) -> Self {
        Self::NotInProgress {
            status: status.to_string(),
        }
    }

    /// Creates a new `Backend` error with automatic suggestion based on error kind.
    #[must_use]
    pub fn backend(
        operation: impl Into<String>,
        kind: BackendErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::Backend {
            operation: operation.into(),
            kind,
            message: message.into(),
            suggestion: kind.suggestion().to_string(),
        }
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns `true` if this error is transient and may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Backend {
                kind: BackendErrorKind::RateLimit
                    | BackendErrorKind::Server
                    | BackendErrorKind::Network,
                ..
            }
        )
    }

    /// Returns `true` if this error is fatal and the session cannot continue.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
                | Self::NotAuthenticated
                | Self::Backend {
                    kind: BackendErrorKind::Unauthorized,
                    ..
                }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = ProctorError::attempt_in_progress("exam-42");
        let msg = err.to_string();
        assert!(msg.contains("already in progress"));
        assert!(msg.contains("exam-42"));
        assert!(msg.contains("Suggestion"));
    }

    #[test]
    fn test_backend_error_kind_display() {
        assert_eq!(BackendErrorKind::RateLimit.to_string(), "rate_limit");
        assert_eq!(BackendErrorKind::Unauthorized.to_string(), "unauthorized");
        assert_eq!(BackendErrorKind::NotFound.to_string(), "not_found");
    }

    #[test]
    fn test_backend_error_kind_from_status() {
        assert_eq!(BackendErrorKind::from_status(401), BackendErrorKind::Unauthorized);
        assert_eq!(BackendErrorKind::from_status(403), BackendErrorKind::Unauthorized);
        assert_eq!(BackendErrorKind::from_status(404), BackendErrorKind::NotFound);
        assert_eq!(BackendErrorKind::from_status(409), BackendErrorKind::Conflict);
        assert_eq!(BackendErrorKind::from_status(429), BackendErrorKind::RateLimit);
        assert_eq!(BackendErrorKind::from_status(503), BackendErrorKind::Server);
        assert_eq!(BackendErrorKind::from_status(418), BackendErrorKind::Other);
    }

    #[test]
    fn test_backend_error_carries_suggestion() {
        let err = ProctorError::backend("submit attempt", BackendErrorKind::Network, "timed out");
        let msg = err.to_string();
        assert!(msg.starts_with("submit attempt failed (network): timed out"));
        assert!(msg.contains("Check your network connection"));
    }

    #[test]
    fn test_is_transient() {
        let network = ProctorError::backend("persist answer", BackendErrorKind::Network, "reset");
        assert!(network.is_transient());

        let conflict = ProctorError::backend("start attempt", BackendErrorKind::Conflict, "busy");
        assert!(!conflict.is_transient());

        assert!(!ProctorError::NotAuthenticated.is_transient());
    }

    #[test]
    fn test_is_fatal() {
        assert!(ProctorError::NotAuthenticated.is_fatal());

        let auth = ProctorError::backend("get exam", BackendErrorKind::Unauthorized, "expired");
        assert!(auth.is_fatal());

        let server = ProctorError::backend("grade attempt", BackendErrorKind::Server, "500");
        assert!(!server.is_fatal());
        assert!(!ProctorError::attempt_in_progress("e").is_fatal());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ProctorError = io_err.into();
        assert!(matches!(err, ProctorError::Io(_)));
    }
}
