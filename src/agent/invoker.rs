//! Agent CLI invoker
//!
//! Runs the external coding agent once per question in request/resume
//! mode: every call spawns a fresh process, waits for it (or kills it when
//! the request context completes), and parses its JSON payload. There is no
//! long-lived per-session process.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::agent::error::AgentError;
use crate::agent::response::{AgentAnswer, parse_payload};
use crate::utils::context::RequestContext;
use crate::utils::process::run_with_context;

/// Default agent executable, resolved through `PATH`
pub const DEFAULT_AGENT_PATH: &str = "cursor-agent";

/// Runs one question against the agent CLI. Implementations perform no
/// retries.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Asks `question`, resuming `agent_handle` when it is non-empty.
    ///
    /// Returns the answer and the handle to use next time (the previous
    /// handle when the agent did not report a new one).
    async fn ask(
        &self,
        ctx: &RequestContext,
        agent_handle: &str,
        question: &str,
        working_dir: &Path,
    ) -> Result<AgentAnswer, AgentError>;
}

#[derive(Debug, Clone)]
pub struct CliAgentInvoker {
    executable: PathBuf,
}

impl CliAgentInvoker {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// `--print --output-format json [--resume <handle>] <question>`
    pub fn build_args(agent_handle: &str, question: &str) -> Vec<String> {
        let mut args = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "json".to_string(),
        ];
        if !agent_handle.is_empty() {
            args.push("--resume".to_string());
            args.push(agent_handle.to_string());
        }
        args.push(question.to_string());
        args
    }
}

impl Default for CliAgentInvoker {
    fn default() -> Self {
        Self::new(DEFAULT_AGENT_PATH)
    }
}

#[async_trait]
impl AgentInvoker for CliAgentInvoker {
    async fn ask(
        &self,
        ctx: &RequestContext,
        agent_handle: &str,
        question: &str,
        working_dir: &Path,
    ) -> Result<AgentAnswer, AgentError> {
        let mut cmd = Command::new(&self.executable);
        cmd.args(Self::build_args(agent_handle, question))
            .current_dir(working_dir);

        debug!(
            executable = %self.executable.display(),
            resume = !agent_handle.is_empty(),
            question_len = question.len(),
            working_dir = %working_dir.display(),
            "Invoking agent CLI"
        );

        let output = run_with_context(cmd, ctx).await?;
        let stderr = output.stderr_lossy();

        if !output.success() {
            warn!(
                exit_code = output.exit_code(),
                stderr = %stderr,
                "Agent CLI exited with failure"
            );
            return Err(AgentError::process_failed(output.exit_code(), stderr));
        }

        let stdout = output.stdout_lossy();
        let payload = parse_payload(&stdout).map_err(|e| {
            warn!(error = %e, stdout_bytes = stdout.len(), "Agent CLI output is not a valid payload");
            AgentError::malformed_output(e.to_string(), stdout.clone(), stderr.clone())
        })?;

        if payload.is_error {
            return Err(AgentError::agent_reported(payload.result));
        }

        let handle = match payload.session_id {
            Some(id) if !id.is_empty() => id,
            _ => agent_handle.to_string(),
        };

        Ok(AgentAnswer::new(payload.result, handle))
    }
}
