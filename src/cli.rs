use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{CommandFactory, Parser, Subcommand};
use inquire::{InquireError, Text};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::agent::CliAgentInvoker;
use crate::config::{Config, load_config};
use crate::media::{SpeechSynthesizer, Transcriber};
use crate::orchestrator::Orchestrator;
use crate::session::{CleanupScheduler, SessionStore};
use crate::utils::context::RequestContext;

#[derive(Parser)]
#[command(name = "voxbridge")]
#[command(about = "voxbridge - voice sessions for a coding agent CLI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Enable verbose logging (DEBUG level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a JSON config file (default: ~/.voxbridge/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Display version information
    Version,

    /// Ask the agent a single question in a throwaway session
    Ask {
        question: String,

        /// Directory the agent runs in
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },

    /// Interactive conversation with heartbeat and idle eviction running
    Chat {
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },

    /// Transcribe an audio file with whisper
    Transcribe { audio_file: PathBuf },

    /// Synthesize speech with kokoro-tts
    Speak {
        text: String,

        #[arg(short, long, default_value = "speech.wav")]
        output: PathBuf,
    },

    /// Report text-to-speech availability as JSON
    TtsHealth,
}

pub async fn run(cli: Cli) -> Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help().ok();
        println!();
        return Ok(());
    };

    match command {
        Commands::Version => {
            print_version();
            Ok(())
        }
        Commands::Ask {
            question,
            workspace,
        } => {
            let config = load_config(workspace, cli.config)?;
            ask_once(&config, &question).await
        }
        Commands::Chat { workspace } => {
            let config = load_config(workspace, cli.config)?;
            chat(&config).await
        }
        Commands::Transcribe { audio_file } => {
            let config = load_config(None, cli.config)?;
            transcribe(&config, &audio_file).await
        }
        Commands::Speak { text, output } => {
            let config = load_config(None, cli.config)?;
            speak(&config, &text, &output).await
        }
        Commands::TtsHealth => {
            let config = load_config(None, cli.config)?;
            let health = SpeechSynthesizer::from_config(&config).health();
            println!("{}", serde_json::to_string_pretty(&health)?);
            Ok(())
        }
    }
}

pub fn extract_command_from_error(error_msg: &str) -> String {
    // e.g. "error: unrecognized subcommand 'invalid_command'"
    if let Some(start) = error_msg.find('\'') {
        if let Some(end) = error_msg[start + 1..].find('\'') {
            return error_msg[start + 1..start + 1 + end].to_string();
        }
    }
    "unknown".to_string()
}

fn print_version() {
    println!("voxbridge {}", env!("CARGO_PKG_VERSION"));
}

fn build_orchestrator(config: &Config, store: Arc<SessionStore>) -> Orchestrator {
    let invoker = Arc::new(CliAgentInvoker::new(config.agent_path.clone()));
    Orchestrator::from_config(config, store, invoker)
}

/// A request context that Ctrl-C cancels while the guard is alive
struct Interruptible {
    ctx: RequestContext,
    listener: tokio::task::JoinHandle<()>,
}

impl Interruptible {
    fn new(timeout: Option<Duration>) -> Self {
        let ctx = match timeout {
            Some(timeout) => RequestContext::with_timeout(timeout),
            None => RequestContext::background(),
        };
        let on_signal = ctx.clone();
        let listener = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Interrupt received, cancelling request");
                on_signal.cancel();
            }
        });
        Self { ctx, listener }
    }
}

impl Drop for Interruptible {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn ask_once(config: &Config, question: &str) -> Result<()> {
    let orchestrator = build_orchestrator(config, Arc::new(SessionStore::new()));
    let session_id = orchestrator.start_session().await?;

    let request = Interruptible::new(Some(orchestrator.request_timeout()));
    let result = orchestrator.ask(&session_id, question, &request.ctx).await;
    orchestrator.end_session(&session_id).await.ok();

    let answer = result?;
    println!("{}", answer);
    Ok(())
}

async fn chat(config: &Config) -> Result<()> {
    let store = Arc::new(SessionStore::new());
    let scheduler = CleanupScheduler::new(
        Arc::clone(&store),
        config.session_timeout(),
        config.cleanup_interval(),
    );
    scheduler.start().await;

    let orchestrator = Arc::new(build_orchestrator(config, store));
    let session_id = orchestrator.start_session().await?;

    let shutdown = CancellationToken::new();
    let heartbeat = tokio::spawn(heartbeat_loop(
        Arc::clone(&orchestrator),
        session_id.clone(),
        config.heartbeat_interval(),
        shutdown.clone(),
    ));

    println!(
        "Chatting with {} in {} (type /quit or press Esc to leave)",
        config.agent_path.display(),
        config.workspace_dir.display()
    );

    let outcome = chat_loop(&orchestrator, &session_id).await;

    shutdown.cancel();
    heartbeat.await.ok();

    let turns = match orchestrator.get_session(&session_id).await {
        Ok(session) => session.conversation_log.len() / 2,
        Err(_) => 0,
    };
    if let Err(e) = orchestrator.end_session(&session_id).await {
        debug!(error = %e, "Session already gone at exit");
    }
    scheduler.stop().await;

    println!("Session ended after {} turn(s)", turns);
    outcome
}

async fn chat_loop(orchestrator: &Orchestrator, session_id: &str) -> Result<()> {
    loop {
        let input = tokio::task::spawn_blocking(|| Text::new("You:").prompt())
            .await
            .context("Prompt task failed")?;

        let line = match input {
            Ok(line) => line,
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => {
                return Ok(());
            }
            Err(e) => return Err(e).context("Failed to read input"),
        };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "/quit" || question == "/exit" {
            return Ok(());
        }

        let request = Interruptible::new(Some(orchestrator.request_timeout()));
        match orchestrator.ask(session_id, question, &request.ctx).await {
            Ok(answer) => println!("\n{}\n", answer),
            Err(e) if e.is_not_found() => {
                eprintln!("Session expired.");
                return Ok(());
            }
            Err(e) => {
                debug!(error = %e, "Ask failed");
                eprintln!("error: {}", e.sanitized_message());
            }
        }
    }
}

async fn heartbeat_loop(
    orchestrator: Arc<Orchestrator>,
    session_id: String,
    period: Duration,
    shutdown: CancellationToken,
) {
    let now = tokio::time::Instant::now();
    let mut ticker = tokio::time::interval_at(now.checked_add(period).unwrap_or(now), period);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = orchestrator.heartbeat(&session_id).await {
                    warn!(session_id = %session_id, error = %e, "Heartbeat failed, stopping");
                    break;
                }
            }
        }
    }
}

async fn transcribe(config: &Config, audio_file: &Path) -> Result<()> {
    let audio = tokio::fs::read(audio_file)
        .await
        .with_context(|| format!("Failed to read audio file: {}", audio_file.display()))?;
    let filename = audio_file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let request = Interruptible::new(None);
    let text = Transcriber::from_config(config)
        .transcribe(&request.ctx, Bytes::from(audio), &filename)
        .await?;
    println!("{}", text);
    Ok(())
}

async fn speak(config: &Config, text: &str, output: &Path) -> Result<()> {
    let request = Interruptible::new(Some(config.request_timeout()));
    let generated = SpeechSynthesizer::from_config(config)
        .synthesize(&request.ctx, text)
        .await?;

    if tokio::fs::rename(&generated, output).await.is_err() {
        // Different filesystem: copy, then drop the temp file
        let copied = tokio::fs::copy(&generated, output).await;
        tokio::fs::remove_file(&generated).await.ok();
        copied.with_context(|| format!("Failed to write {}", output.display()))?;
    }

    println!("Wrote {}", output.display());
    Ok(())
}
