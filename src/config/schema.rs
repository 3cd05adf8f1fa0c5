use crate::config::loader::ConfigError;
use crate::orchestrator::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound for every configured interval and timeout (one year)
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Idle time after which a session is evicted
    pub session_timeout_minutes: u64,
    pub cleanup_interval_secs: u64,
    /// Default deadline for one ask request
    pub request_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub retry: RetryConfig,

    /// Working directory the agent CLI runs in
    pub workspace_dir: PathBuf,
    pub agent_path: PathBuf,

    pub whisper_path: PathBuf,
    pub whisper_model: String,

    pub tts_path: PathBuf,
    pub tts_model_path: PathBuf,
    pub tts_voices_path: PathBuf,
    pub tts_voice: String,
    pub tts_speed: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_timeout_minutes: 10,
            cleanup_interval_secs: 60,
            request_timeout_secs: 60,
            heartbeat_interval_secs: 30,
            retry: RetryConfig::default(),
            workspace_dir: PathBuf::from("."),
            agent_path: PathBuf::from("cursor-agent"),
            whisper_path: PathBuf::from("whisper"),
            whisper_model: "base".to_string(),
            tts_path: PathBuf::from("kokoro-tts"),
            tts_model_path: PathBuf::from("kokoro-v1.0.onnx"),
            tts_voices_path: PathBuf::from("voices-v1.0.bin"),
            tts_voice: "af_sarah".to_string(),
            tts_speed: 1.0,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_timeout_minutes < 1 {
            return Err(ConfigError::invalid(
                "session_timeout_minutes",
                "must be at least 1",
            ));
        }
        if self.cleanup_interval_secs < 1 {
            return Err(ConfigError::invalid(
                "cleanup_interval_secs",
                "must be at least 1",
            ));
        }
        if self.request_timeout_secs < 1 {
            return Err(ConfigError::invalid(
                "request_timeout_secs",
                "must be at least 1",
            ));
        }
        if self.heartbeat_interval_secs < 1 {
            return Err(ConfigError::invalid(
                "heartbeat_interval_secs",
                "must be at least 1",
            ));
        }
        for (field, secs) in [
            (
                "session_timeout_minutes",
                self.session_timeout_minutes.saturating_mul(60),
            ),
            ("cleanup_interval_secs", self.cleanup_interval_secs),
            ("request_timeout_secs", self.request_timeout_secs),
            ("heartbeat_interval_secs", self.heartbeat_interval_secs),
        ] {
            if secs > MAX_DURATION_SECS {
                return Err(ConfigError::invalid(field, "must not exceed one year"));
            }
        }
        if self.retry.max_attempts < 1 {
            return Err(ConfigError::invalid("retry.max_attempts", "must be at least 1"));
        }
        if !(self.retry.multiplier >= 1.0) {
            return Err(ConfigError::invalid("retry.multiplier", "must be >= 1.0"));
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(ConfigError::invalid(
                "retry.max_delay_ms",
                "must not be lower than retry.initial_delay_ms",
            ));
        }
        if !(self.tts_speed > 0.0) {
            return Err(ConfigError::invalid("tts_speed", "must be positive"));
        }
        Ok(())
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_minutes.saturating_mul(60))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// The retry policy for ask; a single-attempt policy when disabled
    pub fn retry_policy(&self) -> RetryPolicy {
        if !self.retry.enabled {
            return RetryPolicy::disabled();
        }
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            multiplier: self.retry.multiplier,
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }
}
