//! Transient vs permanent classification of agent failures
//!
//! Classification is substring matching over the diagnostic text the agent
//! left behind (stderr or the payload message). Rate-limit and auth signals
//! always win over network signals: retrying them only burns quota.

use crate::agent::AgentError;
use crate::utils::error::{AgentFailureKind, BridgeError};

/// Drives the retry decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Might succeed if attempted again
    Transient,
    /// Retrying cannot help
    Permanent,
}

const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "rate-limit",
    "ratelimit",
    "too many requests",
    "429",
    "quota",
    "usage limit",
];

const AUTH_MARKERS: &[&str] = &[
    "unauthorized",
    "unauthenticated",
    "authentication",
    "not logged in",
    "login required",
    "api key",
    "forbidden",
    "401",
    "403",
];

const NETWORK_MARKERS: &[&str] = &[
    "network",
    "connection",
    "econnreset",
    "econnrefused",
    "etimedout",
    "enotfound",
    "socket hang up",
    "dns",
    "temporarily unavailable",
    "service unavailable",
    "502",
    "503",
];

fn contains_any(haystack: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| haystack.contains(marker))
}

/// Rate-limit or auth sub-classification of a diagnostic message
pub fn failure_kind(text: &str) -> Option<AgentFailureKind> {
    let lowered = text.to_lowercase();
    if contains_any(&lowered, RATE_LIMIT_MARKERS) {
        Some(AgentFailureKind::RateLimit)
    } else if contains_any(&lowered, AUTH_MARKERS) {
        Some(AgentFailureKind::Auth)
    } else {
        None
    }
}

fn is_network_failure(text: &str) -> bool {
    contains_any(&text.to_lowercase(), NETWORK_MARKERS)
}

pub fn classify(err: &AgentError) -> ErrorClass {
    match err {
        AgentError::Cancelled | AgentError::DeadlineExceeded => ErrorClass::Permanent,
        AgentError::SpawnFailed { .. } => ErrorClass::Transient,
        AgentError::MalformedOutput { stderr, .. } => {
            if failure_kind(stderr).is_some() {
                ErrorClass::Permanent
            } else {
                ErrorClass::Transient
            }
        }
        AgentError::ProcessFailed { .. } | AgentError::AgentReported { .. } => {
            let text = err.diagnostic_text();
            if failure_kind(text).is_some() {
                ErrorClass::Permanent
            } else if is_network_failure(text) {
                ErrorClass::Transient
            } else {
                ErrorClass::Permanent
            }
        }
    }
}

impl From<AgentError> for BridgeError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Cancelled | AgentError::DeadlineExceeded => {
                BridgeError::timeout(format!("ask ({})", err))
            }
            AgentError::SpawnFailed { message } => BridgeError::process_failed(message, ""),
            AgentError::ProcessFailed { exit_code, stderr } => match failure_kind(&stderr) {
                Some(kind) => BridgeError::agent_reported(kind, stderr.trim()),
                None => BridgeError::process_failed(
                    format!("agent CLI exited with code {}", exit_code),
                    stderr,
                ),
            },
            AgentError::MalformedOutput {
                message, stderr, ..
            } => BridgeError::process_failed(
                format!("agent CLI produced unparsable output: {}", message),
                stderr,
            ),
            AgentError::AgentReported { message } => {
                let kind = failure_kind(&message).unwrap_or(AgentFailureKind::Other);
                BridgeError::agent_reported(kind, message)
            }
        }
    }
}
