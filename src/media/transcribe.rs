//! Speech-to-text through the whisper CLI

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::media::temp::{TempArtifact, ensure_dir, unique_suffix};
use crate::media::{MediaError, combined_output};
use crate::utils::context::RequestContext;
use crate::utils::process::run_with_context;

/// Upper bound on one transcription, further narrowed by the caller's context
pub const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Extension used when the upload's name has none (browser recordings)
pub const DEFAULT_AUDIO_EXTENSION: &str = "webm";

#[derive(Debug, Clone)]
pub struct Transcriber {
    executable: PathBuf,
    model: String,
    temp_dir: PathBuf,
    timeout: Duration,
}

impl Transcriber {
    pub fn new(executable: impl Into<PathBuf>, model: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            model: model.into(),
            temp_dir: std::env::temp_dir().join("voxbridge-transcribe"),
            timeout: TRANSCRIBE_TIMEOUT,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.whisper_path.clone(), config.whisper_model.clone())
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Transcribes an uploaded audio blob. `filename` only contributes its
    /// extension, which tells whisper how to decode the file.
    pub async fn transcribe(
        &self,
        ctx: &RequestContext,
        audio: Bytes,
        filename: &str,
    ) -> Result<String, MediaError> {
        if audio.is_empty() {
            return Err(MediaError::InvalidInput("audio payload is empty".to_string()));
        }

        ensure_dir(&self.temp_dir).await?;

        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .unwrap_or(DEFAULT_AUDIO_EXTENSION);
        let stem = format!("audio_{}", unique_suffix());

        let audio_file =
            TempArtifact::write(self.temp_dir.join(format!("{}.{}", stem, extension)), &audio)
                .await?;
        // whisper names its output after the input stem
        let transcript_file = TempArtifact::new(self.temp_dir.join(format!("{}.txt", stem)));

        info!(
            filename = %filename,
            size = audio.len(),
            "Transcribing audio"
        );

        let mut command = Command::new(&self.executable);
        command
            .arg(audio_file.path())
            .arg("--model")
            .arg(&self.model)
            .arg("--output_format")
            .arg("txt")
            .arg("--output_dir")
            .arg(&self.temp_dir);

        debug!(
            whisper = %self.executable.display(),
            audio = %audio_file.path().display(),
            model = %self.model,
            "Executing whisper"
        );

        let ctx = ctx.child_with_timeout(self.timeout);
        let output = run_with_context(command, &ctx).await.map_err(|e| {
            error!(error = %e, "Whisper did not complete");
            MediaError::from(e)
        })?;

        if !output.success() {
            let diagnostics = combined_output(&output);
            error!(exit_code = output.exit_code(), output = %diagnostics, "Whisper failed");
            return Err(MediaError::ProcessFailed {
                program: self.executable.display().to_string(),
                exit_code: Some(output.exit_code()),
                output: diagnostics,
            });
        }

        let text = match tokio::fs::read_to_string(transcript_file.path()).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MediaError::MissingOutput {
                    path: transcript_file.path().to_path_buf(),
                });
            }
            Err(e) => return Err(MediaError::io(transcript_file.path(), e)),
        };

        let text = text.trim().to_string();
        info!(text_len = text.len(), "Transcription successful");
        debug!(text = %text, "Transcription text");
        Ok(text)
    }
}
