//! Text-to-speech through the kokoro-tts CLI

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::media::temp::{TempArtifact, ensure_dir, sweep_stale_artifacts, unique_suffix};
use crate::media::{MediaError, combined_output};
use crate::orchestrator::DEFAULT_REQUEST_TIMEOUT;
use crate::utils::context::RequestContext;
use crate::utils::process::run_with_context;

/// Margin added to the request timeout before an orphaned file may be swept
pub const SWEEP_MARGIN: Duration = Duration::from_secs(60 * 60);

/// Availability report for the synthesizer
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SpeechHealth {
    pub available: bool,
    /// `"kokoro"` when usable, `"browser"` when clients should fall back
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    pub message: String,
}

impl SpeechHealth {
    fn unavailable(message: impl Into<String>) -> Self {
        Self {
            available: false,
            provider: "browser".to_string(),
            voice: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpeechSynthesizer {
    executable: PathBuf,
    model_path: PathBuf,
    voices_path: PathBuf,
    voice: String,
    speed: f64,
    temp_dir: PathBuf,
    sweep_age: Duration,
}

impl SpeechSynthesizer {
    pub fn new(
        executable: impl Into<PathBuf>,
        model_path: impl Into<PathBuf>,
        voices_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executable: executable.into(),
            model_path: model_path.into(),
            voices_path: voices_path.into(),
            voice: "af_sarah".to_string(),
            speed: 1.0,
            temp_dir: std::env::temp_dir().join("voxbridge-tts"),
            sweep_age: DEFAULT_REQUEST_TIMEOUT + SWEEP_MARGIN,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.tts_path.clone(),
            config.tts_model_path.clone(),
            config.tts_voices_path.clone(),
        )
        .with_voice(config.tts_voice.clone(), config.tts_speed)
        .with_sweep_age(config.request_timeout().saturating_add(SWEEP_MARGIN))
    }

    pub fn with_voice(mut self, voice: impl Into<String>, speed: f64) -> Self {
        self.voice = voice.into();
        self.speed = speed;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// Minimum age before the background sweep may delete a temp file.
    /// Must exceed the longest request that could still be using it.
    pub fn with_sweep_age(mut self, age: Duration) -> Self {
        self.sweep_age = age;
        self
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    fn command(&self, input: &Path, output: &Path) -> Command {
        let mut command = Command::new(&self.executable);
        command
            .arg(input)
            .arg(output)
            .arg("--model")
            .arg(&self.model_path)
            .arg("--voices")
            .arg(&self.voices_path)
            .arg("--speed")
            .arg(format!("{:.1}", self.speed))
            .arg("--lang")
            .arg("en-us")
            .arg("--voice")
            .arg(&self.voice)
            .env("ONNX_PROVIDER", "CUDAExecutionProvider");
        command
    }

    /// Synthesizes `text` to a wav file and returns its path. The caller
    /// owns the returned file; the staged input is always removed.
    pub async fn synthesize(&self, ctx: &RequestContext, text: &str) -> Result<PathBuf, MediaError> {
        if text.trim().is_empty() {
            return Err(MediaError::InvalidInput("text must not be empty".to_string()));
        }

        ensure_dir(&self.temp_dir).await?;
        self.spawn_sweep();

        let suffix = unique_suffix();
        let input = TempArtifact::write(
            self.temp_dir.join(format!("input_{}.txt", suffix)),
            text.as_bytes(),
        )
        .await?;
        let output = TempArtifact::new(self.temp_dir.join(format!("output_{}.wav", suffix)));

        info!(text_len = text.len(), voice = %self.voice, "Generating speech");
        debug!(
            tts = %self.executable.display(),
            model = %self.model_path.display(),
            voices = %self.voices_path.display(),
            speed = self.speed,
            input = %input.path().display(),
            output = %output.path().display(),
            "Executing kokoro-tts"
        );

        let result = run_with_context(self.command(input.path(), output.path()), ctx)
            .await
            .map_err(|e| {
                error!(error = %e, "kokoro-tts did not complete");
                MediaError::from(e)
            })?;

        if !result.success() {
            let diagnostics = combined_output(&result);
            error!(exit_code = result.exit_code(), output = %diagnostics, "kokoro-tts failed");
            return Err(MediaError::ProcessFailed {
                program: self.executable.display().to_string(),
                exit_code: Some(result.exit_code()),
                output: diagnostics,
            });
        }

        match tokio::fs::metadata(output.path()).await {
            Ok(metadata) if metadata.is_file() => {
                debug!(bytes = metadata.len(), "kokoro-tts produced audio");
            }
            _ => {
                return Err(MediaError::MissingOutput {
                    path: output.path().to_path_buf(),
                });
            }
        }

        Ok(output.keep())
    }

    fn spawn_sweep(&self) {
        let dir = self.temp_dir.clone();
        let age = self.sweep_age;
        tokio::spawn(async move {
            sweep_stale_artifacts(&dir, age).await;
        });
    }

    /// Checks that the executable, model and voices file are all present
    pub fn health(&self) -> SpeechHealth {
        if let Err(e) = check_executable(&self.executable) {
            return if e.kind() == std::io::ErrorKind::NotFound {
                debug!(path = %self.executable.display(), "kokoro-tts executable not found");
                SpeechHealth::unavailable("Kokoro TTS not configured, using browser TTS")
            } else {
                error!(path = %self.executable.display(), error = %e, "Failed to check kokoro-tts executable");
                SpeechHealth::unavailable(format!("Kokoro TTS inaccessible: {}", e))
            };
        }

        for (path, what) in [(&self.model_path, "model"), (&self.voices_path, "voices")] {
            if let Err(e) = std::fs::metadata(path) {
                return if e.kind() == std::io::ErrorKind::NotFound {
                    debug!(path = %path.display(), "Kokoro {} file not found", what);
                    SpeechHealth::unavailable(format!(
                        "Kokoro {} file not found, using browser TTS",
                        what
                    ))
                } else {
                    error!(path = %path.display(), error = %e, "Failed to check kokoro {} file", what);
                    SpeechHealth::unavailable(format!("Kokoro TTS inaccessible: {}", e))
                };
            }
        }

        SpeechHealth {
            available: true,
            provider: "kokoro".to_string(),
            voice: Some(self.voice.clone()),
            message: "Kokoro TTS available".to_string(),
        }
    }
}

/// Stats `path`, resolving bare program names through `PATH`
fn check_executable(path: &Path) -> std::io::Result<()> {
    let is_bare = path.components().count() == 1 && !path.is_absolute();
    if !is_bare {
        return std::fs::metadata(path).map(|_| ());
    }

    let found = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(path).is_file()))
        .unwrap_or(false);
    if found {
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} not found in PATH", path.display()),
        ))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn stub(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("kokoro-stub");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn synthesizer(bin: &Path, body: &str, work: &Path) -> SpeechSynthesizer {
        SpeechSynthesizer::new(stub(bin, body), "model.onnx", "voices.bin").with_temp_dir(work)
    }

    #[tokio::test]
    async fn test_arguments_and_environment() {
        let bin = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let log = bin.path().join("args.log");
        let body = format!(
            r#"echo "$@ $ONNX_PROVIDER" > {}; printf 'RIFF' > "$2""#,
            log.display()
        );
        let synth = synthesizer(bin.path(), &body, work.path()).with_voice("am_adam", 1.5);

        let out = synth
            .synthesize(&RequestContext::background(), "hello")
            .await
            .unwrap();

        let args = std::fs::read_to_string(&log).unwrap();
        assert!(args.contains("--model model.onnx --voices voices.bin"));
        assert!(args.contains("--speed 1.5"));
        assert!(args.contains("--lang en-us --voice am_adam"));
        assert!(args.trim_end().ends_with("CUDAExecutionProvider"));
        std::fs::remove_file(out).unwrap();
    }

    #[tokio::test]
    async fn test_failure_removes_all_artifacts() {
        let bin = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let synth = synthesizer(bin.path(), r#"printf 'partial' > "$2"; exit 1"#, work.path());

        let err = synth
            .synthesize(&RequestContext::background(), "hello")
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::ProcessFailed { .. }));
        let leftovers: Vec<_> = std::fs::read_dir(work.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_missing_output() {
        let bin = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let synth = synthesizer(bin.path(), "exit 0", work.path());

        let err = synth
            .synthesize(&RequestContext::background(), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::MissingOutput { .. }));
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let synth = SpeechSynthesizer::new("kokoro-tts", "m", "v");
        let err = synth
            .synthesize(&RequestContext::background(), "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidInput(_)));
    }

    #[test]
    fn test_health_reports_missing_pieces() {
        let bin = TempDir::new().unwrap();
        let exe = stub(bin.path(), "exit 0");
        let model = bin.path().join("model.onnx");
        let voices = bin.path().join("voices.bin");

        let synth = SpeechSynthesizer::new(bin.path().join("absent"), &model, &voices);
        let health = synth.health();
        assert!(!health.available);
        assert_eq!(health.provider, "browser");

        let synth = SpeechSynthesizer::new(&exe, &model, &voices);
        assert!(synth.health().message.contains("model"));

        std::fs::write(&model, b"m").unwrap();
        assert!(synth.health().message.contains("voices"));

        std::fs::write(&voices, b"v").unwrap();
        let health = synth.health();
        assert!(health.available);
        assert_eq!(health.provider, "kokoro");
        assert_eq!(health.voice.as_deref(), Some("af_sarah"));
    }

    #[test]
    fn test_bare_executable_resolved_through_path() {
        assert!(check_executable(Path::new("sh")).is_ok());
        assert!(check_executable(Path::new("definitely-not-a-real-program-x9")).is_err());
    }
}
