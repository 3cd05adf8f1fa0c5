//! Context-bound subprocess execution
//!
//! [`run_with_context`] is the single place where voxbridge spawns external
//! executables. The child runs in its own process group and is reaped within
//! the call: on normal exit its output is collected, on context completion
//! the whole group is killed and the child waited for before the error is
//! returned. The context bounds the pipe drains too, so a helper that keeps
//! stdout open cannot hold an expired request.

use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::utils::context::{DoneReason, RequestContext};

/// Captured result of a completed subprocess
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, or -1 when the process was terminated by a signal
    pub fn exit_code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} was cancelled")]
    Cancelled { program: String },

    #[error("{program} exceeded its deadline")]
    DeadlineExceeded { program: String },
}

impl ProcessError {
    fn from_reason(program: String, reason: DoneReason) -> Self {
        match reason {
            DoneReason::Cancelled => Self::Cancelled { program },
            DoneReason::DeadlineExceeded => Self::DeadlineExceeded { program },
        }
    }
}

/// Runs `command` to completion or until `ctx` completes.
///
/// Stdin is closed, stdout and stderr are captured separately. When the
/// context completes first, whether the child is still running or only its
/// pipes are still open, the process group is killed, the child reaped and
/// the matching `Cancelled`/`DeadlineExceeded` error is returned.
pub async fn run_with_context(
    mut command: Command,
    ctx: &RequestContext,
) -> Result<ProcessOutput, ProcessError> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();

    if let Some(reason) = ctx.reason() {
        return Err(ProcessError::from_reason(program, reason));
    }

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;
    let pid = child.id().unwrap_or(0);
    let mut group = GroupGuard::new(child.id());
    debug!(pid = pid, program = %program, "Subprocess spawned");

    let mut stdout_task = tokio::spawn(drain(child.stdout.take()));
    let mut stderr_task = tokio::spawn(drain(child.stderr.take()));

    let outcome = tokio::select! {
        biased;
        reason = ctx.done() => Err(reason),
        finished = async {
            let status = child.wait().await;
            let stdout = (&mut stdout_task).await.unwrap_or_default();
            let stderr = (&mut stderr_task).await.unwrap_or_default();
            (status, stdout, stderr)
        } => Ok(finished),
    };

    match outcome {
        Err(reason) => {
            group.kill();
            if !matches!(child.try_wait(), Ok(Some(_))) {
                if let Err(e) = child.kill().await {
                    warn!(pid = pid, program = %program, error = %e, "Failed to kill subprocess");
                }
            }
            stdout_task.abort();
            stderr_task.abort();
            debug!(pid = pid, program = %program, reason = %reason, "Subprocess killed");
            Err(ProcessError::from_reason(program, reason))
        }
        Ok((status, stdout, stderr)) => {
            group.disarm();
            let status = status.map_err(|source| ProcessError::Wait {
                program: program.clone(),
                source,
            })?;
            debug!(
                pid = pid,
                program = %program,
                exit_code = status.code().unwrap_or(-1),
                stdout_bytes = stdout.len(),
                stderr_bytes = stderr.len(),
                "Subprocess exited"
            );
            Ok(ProcessOutput {
                status,
                stdout,
                stderr,
            })
        }
    }
}

/// Kills the child's process group on drop unless disarmed
struct GroupGuard {
    pgid: Option<u32>,
}

impl GroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
        }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pgid = pgid, error = %e, "Failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!(error = %e, "Failed to drain subprocess pipe");
        }
    }
    buf
}
