//! Caller-visible error taxonomy for voxbridge
//!
//! Every orchestrator operation fails with a [`BridgeError`]. The HTTP layer
//! maps variants to status codes through [`BridgeError::status_code`] and
//! shows users [`BridgeError::sanitized_message`] rather than raw stderr.

use thiserror::Error;

/// Sub-classification of failures reported by the agent CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentFailureKind {
    /// Rate limit, quota or "too many requests" signals
    RateLimit,
    /// Authentication or authorization failures (not logged in, bad key)
    Auth,
    /// Anything else the agent reported
    Other,
}

impl std::fmt::Display for AgentFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentFailureKind::RateLimit => write!(f, "rate limit"),
            AgentFailureKind::Auth => write!(f, "authentication"),
            AgentFailureKind::Other => write!(f, "agent"),
        }
    }
}

/// Global error type for voxbridge operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Unknown session id
    #[error("Session not found: {session_id}")]
    NotFound { session_id: String },

    /// Empty or malformed user input
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Deadline exceeded or request cancelled; any subprocess was killed
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    /// Non-zero exit or unparsable output, carries stderr for diagnostics
    #[error("Process failed: {message}")]
    ProcessFailed { message: String, stderr: String },

    /// The subprocess ran but its own payload signalled failure
    #[error("Agent reported {kind} error: {message}")]
    AgentReported {
        kind: AgentFailureKind,
        message: String,
    },

    /// Store invariant violation or id generation failure
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BridgeError {
    /// Create a not-found error for a session id
    pub fn not_found(session_id: impl Into<String>) -> Self {
        Self::NotFound {
            session_id: session_id.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a process failure error
    pub fn process_failed(message: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::ProcessFailed {
            message: message.into(),
            stderr: stderr.into(),
        }
    }

    /// Create an agent-reported error
    pub fn agent_reported(kind: AgentFailureKind, message: impl Into<String>) -> Self {
        Self::AgentReported {
            kind,
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// HTTP status the transport layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            BridgeError::NotFound { .. } => 404,
            BridgeError::InvalidInput { .. } => 400,
            BridgeError::Timeout { .. } => 504,
            BridgeError::ProcessFailed { .. } => 502,
            BridgeError::AgentReported { kind, .. } => match kind {
                AgentFailureKind::RateLimit => 429,
                AgentFailureKind::Auth => 502,
                AgentFailureKind::Other => 500,
            },
            BridgeError::Internal { .. } => 500,
        }
    }

    /// Stable machine-readable code for wire responses
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::NotFound { .. } => "SESSION_NOT_FOUND",
            BridgeError::InvalidInput { .. } => "INVALID_INPUT",
            BridgeError::Timeout { .. } => "TIMEOUT",
            BridgeError::ProcessFailed { .. } => "PROCESS_FAILED",
            BridgeError::AgentReported { kind, .. } => match kind {
                AgentFailureKind::RateLimit => "AGENT_RATE_LIMITED",
                AgentFailureKind::Auth => "AGENT_AUTH_FAILED",
                AgentFailureKind::Other => "AGENT_ERROR",
            },
            BridgeError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show an end user: no stderr, no paths
    pub fn sanitized_message(&self) -> String {
        match self {
            BridgeError::NotFound { .. } => "Session not found".to_string(),
            BridgeError::InvalidInput { message } => message.clone(),
            BridgeError::Timeout { .. } => "The assistant took too long to answer".to_string(),
            BridgeError::ProcessFailed { .. } => "The assistant could not be reached".to_string(),
            BridgeError::AgentReported { kind, .. } => match kind {
                AgentFailureKind::RateLimit => {
                    "The assistant is rate limited, try again later".to_string()
                }
                AgentFailureKind::Auth => "The assistant is not authenticated".to_string(),
                AgentFailureKind::Other => "The assistant reported an error".to_string(),
            },
            BridgeError::Internal { .. } => "An unexpected error occurred".to_string(),
        }
    }

    /// Returns the error severity level for logging
    pub fn severity(&self) -> tracing::Level {
        match self {
            BridgeError::Internal { .. } => tracing::Level::ERROR,
            BridgeError::ProcessFailed { .. } => tracing::Level::ERROR,
            BridgeError::AgentReported { .. } => tracing::Level::WARN,
            BridgeError::Timeout { .. } => tracing::Level::WARN,
            BridgeError::NotFound { .. } => tracing::Level::INFO,
            BridgeError::InvalidInput { .. } => tracing::Level::INFO,
        }
    }

    /// Returns true for the not-found variant
    pub fn is_not_found(&self) -> bool {
        matches!(self, BridgeError::NotFound { .. })
    }

    /// Returns true for the timeout variant
    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeError::Timeout { .. })
    }
}

/// Result type alias using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(BridgeError::not_found("abc").status_code(), 404);
        assert_eq!(BridgeError::invalid_input("empty").status_code(), 400);
        assert_eq!(BridgeError::timeout("ask").status_code(), 504);
        assert_eq!(
            BridgeError::process_failed("exit 1", "boom").status_code(),
            502
        );
        assert_eq!(BridgeError::internal("poisoned").status_code(), 500);
        assert_eq!(
            BridgeError::agent_reported(AgentFailureKind::RateLimit, "slow down").status_code(),
            429
        );
        assert_eq!(
            BridgeError::agent_reported(AgentFailureKind::Other, "nope").status_code(),
            500
        );
    }

    #[test]
    fn test_sanitized_message_hides_stderr() {
        let err = BridgeError::process_failed("exit status 1", "/home/user/.secret: denied");
        let message = err.sanitized_message();
        assert!(!message.contains("/home/user"));
        assert!(!message.contains("denied"));
    }

    #[test]
    fn test_display_messages() {
        let err = BridgeError::not_found("session-42");
        assert!(err.to_string().contains("session-42"));

        let err = BridgeError::agent_reported(AgentFailureKind::Auth, "not logged in");
        assert!(err.to_string().contains("authentication"));
        assert!(err.to_string().contains("not logged in"));
    }

    #[test]
    fn test_codes_are_distinct_per_kind() {
        let rate = BridgeError::agent_reported(AgentFailureKind::RateLimit, "x");
        let auth = BridgeError::agent_reported(AgentFailureKind::Auth, "x");
        assert_ne!(rate.code(), auth.code());
        assert_eq!(BridgeError::not_found("x").code(), "SESSION_NOT_FOUND");
    }

    #[test]
    fn test_severity_levels() {
        assert_eq!(BridgeError::internal("x").severity(), tracing::Level::ERROR);
        assert_eq!(BridgeError::not_found("x").severity(), tracing::Level::INFO);
        assert_eq!(BridgeError::timeout("x").severity(), tracing::Level::WARN);
    }

    #[test]
    fn test_predicates() {
        assert!(BridgeError::not_found("x").is_not_found());
        assert!(BridgeError::timeout("ask").is_timeout());
        assert!(!BridgeError::internal("x").is_timeout());
    }
}
