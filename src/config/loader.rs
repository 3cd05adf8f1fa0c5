use crate::config::schema::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file contains invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration value for {field}: {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Loads configuration from defaults, the config file, the environment and
/// CLI overrides, in increasing order of precedence.
pub fn load_config(
    cli_workspace: Option<PathBuf>,
    cli_config_path: Option<PathBuf>,
) -> Result<Config> {
    load_config_with_env(cli_workspace, cli_config_path, |key| std::env::var(key).ok())
}

/// [`load_config`] with the environment layer read through `lookup`
pub(crate) fn load_config_with_env<F>(
    cli_workspace: Option<PathBuf>,
    cli_config_path: Option<PathBuf>,
    lookup: F,
) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    tracing::debug!("Loading configuration");

    let mut config = Config::default();

    // Layer 1: config file (~/.voxbridge/config.json or --config)
    let config_file = cli_config_path.clone().or_else(get_config_path);
    if let Some(ref path) = config_file {
        if path.exists() {
            tracing::debug!(config_path = %path.display(), "Loading configuration from file");
            config = read_config_file(path)?;
        } else if cli_config_path.is_some() {
            anyhow::bail!("Config file not found: {}", path.display());
        } else {
            tracing::debug!(config_path = %path.display(), "Config file not found, using defaults");
        }
    }

    // Layer 2: environment variables
    config = merge_env_variables(config, lookup);

    // Layer 3: CLI flags
    if let Some(workspace) = cli_workspace {
        tracing::debug!(workspace = %workspace.display(), "Applying CLI workspace override");
        config.workspace_dir = workspace;
    }

    config
        .validate()
        .context("Configuration validation failed")?;

    tracing::debug!(
        session_timeout_minutes = config.session_timeout_minutes,
        request_timeout_secs = config.request_timeout_secs,
        retry_enabled = config.retry.enabled,
        workspace = %config.workspace_dir.display(),
        agent = %config.agent_path.display(),
        "Configuration loaded successfully"
    );

    Ok(config)
}

pub fn get_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".voxbridge").join("config.json"))
}

fn read_config_file(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .map_err(ConfigError::IoError)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = serde_json::from_str(&content)
        .map_err(ConfigError::InvalidJson)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Applies environment overrides through `lookup`. Empty values are ignored;
/// unparsable values keep the lower layer and log a warning.
pub fn merge_env_variables<F>(mut config: Config, lookup: F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    config.session_timeout_minutes = parse_or_keep(
        &get,
        "SESSION_TIMEOUT_MINUTES",
        config.session_timeout_minutes,
    );
    config.cleanup_interval_secs =
        parse_or_keep(&get, "CLEANUP_INTERVAL_SECS", config.cleanup_interval_secs);
    config.request_timeout_secs =
        parse_or_keep(&get, "REQUEST_TIMEOUT_SECS", config.request_timeout_secs);
    config.heartbeat_interval_secs = parse_or_keep(
        &get,
        "HEARTBEAT_INTERVAL_SECS",
        config.heartbeat_interval_secs,
    );

    config.retry.enabled = parse_or_keep(&get, "RETRY_ENABLED", config.retry.enabled);
    config.retry.max_attempts =
        parse_or_keep(&get, "RETRY_MAX_ATTEMPTS", config.retry.max_attempts);
    config.retry.initial_delay_ms =
        parse_or_keep(&get, "RETRY_INITIAL_DELAY_MS", config.retry.initial_delay_ms);
    config.retry.multiplier = parse_or_keep(&get, "RETRY_MULTIPLIER", config.retry.multiplier);
    config.retry.max_delay_ms =
        parse_or_keep(&get, "RETRY_MAX_DELAY_MS", config.retry.max_delay_ms);

    if let Some(value) = get("WORKSPACE_DIR") {
        config.workspace_dir = PathBuf::from(value);
    }
    if let Some(value) = get("AGENT_PATH") {
        config.agent_path = PathBuf::from(value);
    }
    if let Some(value) = get("WHISPER_PATH") {
        config.whisper_path = PathBuf::from(value);
    }
    if let Some(value) = get("WHISPER_MODEL") {
        config.whisper_model = value;
    }
    if let Some(value) = get("KOKORO_TTS_PATH") {
        config.tts_path = PathBuf::from(value);
    }
    if let Some(value) = get("KOKORO_TTS_MODEL_PATH") {
        config.tts_model_path = PathBuf::from(value);
    }
    if let Some(value) = get("KOKORO_TTS_VOICES_PATH") {
        config.tts_voices_path = PathBuf::from(value);
    }
    if let Some(value) = get("KOKORO_TTS_VOICE") {
        config.tts_voice = value;
    }
    config.tts_speed = parse_or_keep(&get, "KOKORO_TTS_SPEED", config.tts_speed);

    config
}

fn parse_or_keep<T, G>(get: &G, key: &str, current: T) -> T
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key = key, value = %raw, "Ignoring unparsable environment value");
                current
            }
        },
        None => current,
    }
}
