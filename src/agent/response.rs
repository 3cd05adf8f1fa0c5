//! Structured output of `<agent> --print --output-format json`

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentPayload {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub subtype: String,
    #[serde(default)]
    pub is_error: bool,
    /// Answer text, or the error message when `is_error` is set
    #[serde(default)]
    pub result: String,
    /// Conversation handle to pass to `--resume` next time
    #[serde(default)]
    pub session_id: Option<String>,
}

/// A successful answer plus the handle to resume from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentAnswer {
    pub answer: String,
    pub handle: String,
}

impl AgentAnswer {
    pub fn new(answer: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            handle: handle.into(),
        }
    }
}

/// Parses the payload from captured stdout.
///
/// The whole buffer is tried first; if the CLI printed anything before the
/// payload, the last non-empty line is tried instead.
pub fn parse_payload(stdout: &str) -> Result<AgentPayload, serde_json::Error> {
    let trimmed = stdout.trim();
    match serde_json::from_str::<AgentPayload>(trimmed) {
        Ok(payload) => Ok(payload),
        Err(whole_err) => match trimmed.lines().rev().find(|line| !line.trim().is_empty()) {
            Some(last) if last.trim() != trimmed => {
                serde_json::from_str::<AgentPayload>(last.trim()).map_err(|_| whole_err)
            }
            _ => Err(whole_err),
        },
    }
}
