//! Error types for agent CLI invocations
//!
//! The invoker reports exactly what happened to one subprocess run. It does
//! not decide whether a failure is worth retrying; the orchestrator
//! classifies these errors (see `orchestrator::classify`).

use thiserror::Error;

use crate::utils::process::ProcessError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// The request context was cancelled; the subprocess was killed
    #[error("Agent invocation cancelled")]
    Cancelled,

    /// The request deadline elapsed; the subprocess was killed
    #[error("Agent invocation exceeded its deadline")]
    DeadlineExceeded,

    /// The agent executable could not be started
    #[error("Failed to start agent CLI: {message}")]
    SpawnFailed {
        /// Error message
        message: String,
    },

    /// The agent exited with a non-zero status
    #[error("Agent CLI exited with code {exit_code}: {stderr}")]
    ProcessFailed {
        /// Exit code, -1 when killed by a signal
        exit_code: i32,
        /// Captured stderr
        stderr: String,
    },

    /// The agent exited cleanly but stdout was not a valid payload
    #[error("Agent CLI produced unparsable output: {message}")]
    MalformedOutput {
        /// Parser error
        message: String,
        /// Raw stdout
        output: String,
        /// Captured stderr
        stderr: String,
    },

    /// The payload's own error flag was set
    #[error("Agent reported error: {message}")]
    AgentReported {
        /// The payload's result text
        message: String,
    },
}

impl AgentError {
    pub fn spawn_failed(message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            message: message.into(),
        }
    }

    pub fn process_failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self::ProcessFailed {
            exit_code,
            stderr: stderr.into(),
        }
    }

    pub fn malformed_output(
        message: impl Into<String>,
        output: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::MalformedOutput {
            message: message.into(),
            output: output.into(),
            stderr: stderr.into(),
        }
    }

    pub fn agent_reported(message: impl Into<String>) -> Self {
        Self::AgentReported {
            message: message.into(),
        }
    }

    /// Returns true if the request context ended the invocation
    pub fn is_cancellation(&self) -> bool {
        matches!(self, AgentError::Cancelled | AgentError::DeadlineExceeded)
    }

    /// The text worth scanning for rate-limit, auth or network indicators
    pub fn diagnostic_text(&self) -> &str {
        match self {
            AgentError::Cancelled | AgentError::DeadlineExceeded => "",
            AgentError::SpawnFailed { message } => message,
            AgentError::ProcessFailed { stderr, .. } => stderr,
            AgentError::MalformedOutput { stderr, .. } => stderr,
            AgentError::AgentReported { message } => message,
        }
    }
}

impl From<ProcessError> for AgentError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Cancelled { .. } => Self::Cancelled,
            ProcessError::DeadlineExceeded { .. } => Self::DeadlineExceeded,
            ProcessError::Spawn { .. } => Self::spawn_failed(err.to_string()),
            ProcessError::Wait { .. } => Self::process_failed(-1, err.to_string()),
        }
    }
}
