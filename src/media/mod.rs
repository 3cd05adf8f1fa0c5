//! Speech-to-text and text-to-speech subprocess adapters
//!
//! Both adapters stage their payload in a uniquely named temp file, run a
//! local executable bound to the request context and collect its output
//! artifact. Temp files are owned by [`TempArtifact`] guards, so they are
//! removed on every exit path.

pub mod speech;
pub mod temp;
pub mod transcribe;

use std::path::PathBuf;

use thiserror::Error;

use crate::utils::process::ProcessError;

pub use speech::{SpeechHealth, SpeechSynthesizer};
pub use temp::{TempArtifact, sweep_stale_artifacts, unique_suffix};
pub use transcribe::Transcriber;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out")]
    Timeout { program: String },

    #[error("{program} was cancelled")]
    Cancelled { program: String },

    #[error("{program} failed (exit code {exit_code:?}): {output}")]
    ProcessFailed {
        program: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("Expected output file was not produced: {}", .path.display())]
    MissingOutput { path: PathBuf },
}

impl MediaError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// HTTP status the transport layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            MediaError::InvalidInput(_) => 400,
            MediaError::Timeout { .. } | MediaError::Cancelled { .. } => 504,
            MediaError::Io { .. }
            | MediaError::ProcessFailed { .. }
            | MediaError::MissingOutput { .. } => 500,
        }
    }
}

impl From<ProcessError> for MediaError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Spawn { program, source } | ProcessError::Wait { program, source } => {
                MediaError::ProcessFailed {
                    program,
                    exit_code: None,
                    output: source.to_string(),
                }
            }
            ProcessError::Cancelled { program } => MediaError::Cancelled { program },
            ProcessError::DeadlineExceeded { program } => MediaError::Timeout { program },
        }
    }
}

/// Stderr followed by stdout, for failure diagnostics
pub(crate) fn combined_output(output: &crate::utils::process::ProcessOutput) -> String {
    let stderr = output.stderr_lossy();
    let stdout = output.stdout_lossy();
    match (stderr.trim().is_empty(), stdout.trim().is_empty()) {
        (true, _) => stdout.trim().to_string(),
        (false, true) => stderr.trim().to_string(),
        (false, false) => format!("{}\n{}", stderr.trim(), stdout.trim()),
    }
}
