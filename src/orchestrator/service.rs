//! The four externally visible session operations
//!
//! [`Orchestrator`] composes the [`SessionStore`] and an [`AgentInvoker`]
//! with input validation, deadline handling and the optional retry policy.
//! The store lock is never held while the agent subprocess runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{Level, debug, error, info, warn};

use crate::agent::{AgentAnswer, AgentInvoker};
use crate::config::Config;
use crate::orchestrator::retry::RetryPolicy;
use crate::session::{Message, Session, SessionStore};
use crate::utils::context::{DoneReason, RequestContext};
use crate::utils::error::{BridgeError, Result};

/// Default per-request deadline for [`Orchestrator::ask_with_timeout`]
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct Orchestrator {
    store: Arc<SessionStore>,
    invoker: Arc<dyn AgentInvoker>,
    working_dir: PathBuf,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl Orchestrator {
    /// Creates an orchestrator with retries disabled and the default
    /// request timeout.
    pub fn new(
        store: Arc<SessionStore>,
        invoker: Arc<dyn AgentInvoker>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            invoker,
            working_dir: working_dir.into(),
            retry: RetryPolicy::disabled(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Wires workspace, retry policy and request timeout from `config`.
    pub fn from_config(
        config: &Config,
        store: Arc<SessionStore>,
        invoker: Arc<dyn AgentInvoker>,
    ) -> Self {
        Self::new(store, invoker, config.workspace_dir.clone())
            .with_retry(config.retry_policy())
            .with_request_timeout(config.request_timeout())
    }

    /// Replaces the retry policy. [`RetryPolicy::disabled`] makes every
    /// ask invoke the agent exactly once.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Deadline used by [`ask_with_timeout`](Self::ask_with_timeout)
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Shared store, e.g. for wiring a [`CleanupScheduler`](crate::session::CleanupScheduler)
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Directory every agent invocation runs in
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Creates a session. The agent is not contacted until the first ask.
    ///
    /// # Returns
    /// The new session's id, to be passed to every other operation.
    pub async fn start_session(&self) -> Result<String> {
        let session = self.store.create().await?;
        info!(session_id = %session.id, "Session started");
        Ok(session.id)
    }

    /// Asks `question` within `session_id`, bounded by `ctx`.
    ///
    /// On success the conversation log gains the question and the answer,
    /// in that order. On failure the session is left untouched.
    ///
    /// # Arguments
    /// * `session_id` - Session returned by [`start_session`](Self::start_session)
    /// * `question` - Non-blank question text
    /// * `ctx` - Bounds the whole ask, retries and backoff included
    ///
    /// # Returns
    /// The agent's answer, `NotFound` for an unknown session, `InvalidInput`
    /// for a blank question, and `Timeout` whenever `ctx` is already done or
    /// completes before an answer can be recorded.
    pub async fn ask(
        &self,
        session_id: &str,
        question: &str,
        ctx: &RequestContext,
    ) -> Result<String> {
        let session = self.store.get(session_id).await?;

        if question.trim().is_empty() {
            return Err(BridgeError::invalid_input("question must not be empty"));
        }

        if let Some(reason) = ctx.reason() {
            let err = expired(reason);
            log_failure(session_id, &err);
            return Err(err);
        }

        debug!(
            session_id = %session_id,
            resume = session.has_agent_handle(),
            question = %question,
            "Asking agent"
        );

        let invoker = &*self.invoker;
        let working_dir = self.working_dir.as_path();
        let handle = session.agent_handle.as_str();

        let result = self
            .retry
            .run(ctx, move |attempt| {
                if attempt > 1 {
                    debug!(attempt = attempt, "Re-invoking agent");
                }
                invoker.ask(ctx, handle, question, working_dir)
            })
            .await
            .map_err(BridgeError::from)
            .and_then(|answer| match ctx.reason() {
                // An answer that lands after the deadline is discarded
                Some(reason) => Err(expired(reason)),
                None => Ok(answer),
            });

        match result {
            Ok(answer) => {
                self.record_exchange(&session, question, &answer).await;
                info!(
                    session_id = %session_id,
                    question_len = question.len(),
                    answer_len = answer.answer.len(),
                    "Agent answered"
                );
                Ok(answer.answer)
            }
            Err(err) => {
                log_failure(session_id, &err);
                Err(err)
            }
        }
    }

    /// [`ask`](Self::ask) under a fresh context using the configured
    /// request timeout.
    pub async fn ask_with_timeout(&self, session_id: &str, question: &str) -> Result<String> {
        let ctx = RequestContext::with_timeout(self.request_timeout);
        self.ask(session_id, question, &ctx).await
    }

    /// Refreshes the session's activity timestamp.
    ///
    /// # Returns
    /// * `Ok(())` - The session is live and its idle clock restarted
    /// * `Err(BridgeError::NotFound)` - Unknown, ended or already evicted
    pub async fn heartbeat(&self, session_id: &str) -> Result<()> {
        self.store.update_activity(session_id).await?;
        debug!(session_id = %session_id, "Heartbeat");
        Ok(())
    }

    /// Removes the session. No subprocess outlives a single ask, so there
    /// is nothing else to tear down.
    pub async fn end_session(&self, session_id: &str) -> Result<()> {
        self.store.delete(session_id).await?;
        info!(session_id = %session_id, "Session ended");
        Ok(())
    }

    /// Copy of the session, `NotFound` when it is not live
    pub async fn get_session(&self, session_id: &str) -> Result<Session> {
        self.store.get(session_id).await
    }

    /// Copies of all live sessions, in no particular order
    pub async fn list_sessions(&self) -> Vec<Session> {
        self.store.list().await
    }

    /// Best-effort bookkeeping after a successful ask. Failures (typically
    /// the session being ended or evicted mid-request) are logged only.
    async fn record_exchange(&self, session: &Session, question: &str, answer: &AgentAnswer) {
        let id = session.id.as_str();

        if !answer.handle.is_empty() && answer.handle != session.agent_handle {
            if let Err(e) = self.store.set_agent_handle(id, &answer.handle).await {
                warn!(session_id = %id, error = %e, "Failed to persist agent handle");
            }
        }

        let entries = vec![
            Message::user(question),
            Message::assistant(answer.answer.clone()),
        ];
        if let Err(e) = self.store.append_log(id, entries).await {
            warn!(session_id = %id, error = %e, "Failed to append conversation log");
        }

        if let Err(e) = self.store.update_activity(id).await {
            warn!(session_id = %id, error = %e, "Failed to refresh session activity");
        }
    }
}

fn expired(reason: DoneReason) -> BridgeError {
    BridgeError::timeout(format!("ask ({})", reason))
}

fn log_failure(session_id: &str, err: &BridgeError) {
    let level = err.severity();
    if level == Level::ERROR {
        error!(session_id = %session_id, code = err.code(), error = %err, "Ask failed");
    } else if level == Level::WARN {
        warn!(session_id = %session_id, code = err.code(), error = %err, "Ask failed");
    } else {
        info!(session_id = %session_id, code = err.code(), error = %err, "Ask failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every call and replays scripted results
    struct ScriptedInvoker {
        results: Mutex<Vec<std::result::Result<AgentAnswer, AgentError>>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedInvoker {
        fn new(results: Vec<std::result::Result<AgentAnswer, AgentError>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into_iter().rev().collect()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AgentInvoker for ScriptedInvoker {
        async fn ask(
            &self,
            _ctx: &RequestContext,
            agent_handle: &str,
            question: &str,
            _working_dir: &Path,
        ) -> std::result::Result<AgentAnswer, AgentError> {
            self.calls
                .lock()
                .unwrap()
                .push((agent_handle.to_string(), question.to_string()));
            self.results
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(AgentError::agent_reported("script exhausted")))
        }
    }

    fn orchestrator(invoker: Arc<ScriptedInvoker>) -> Orchestrator {
        Orchestrator::new(Arc::new(SessionStore::new()), invoker, ".")
    }

    #[tokio::test]
    async fn test_ask_records_exchange_and_handle() {
        let invoker = ScriptedInvoker::new(vec![
            Ok(AgentAnswer::new("first", "h-1")),
            Ok(AgentAnswer::new("second", "h-1")),
        ]);
        let orch = orchestrator(invoker.clone());
        let id = orch.start_session().await.unwrap();
        let ctx = RequestContext::with_timeout(Duration::from_secs(5));

        assert_eq!(orch.ask(&id, "one", &ctx).await.unwrap(), "first");
        assert_eq!(orch.ask(&id, "two", &ctx).await.unwrap(), "second");

        let calls = invoker.calls();
        assert_eq!(calls[0], (String::new(), "one".to_string()));
        assert_eq!(calls[1], ("h-1".to_string(), "two".to_string()));

        let session = orch.get_session(&id).await.unwrap();
        assert_eq!(session.agent_handle, "h-1");
        assert_eq!(session.conversation_log.len(), 4);
        assert!(session.conversation_log[0].is_user());
        assert_eq!(session.conversation_log[3].content, "second");
    }

    #[tokio::test]
    async fn test_empty_question_is_invalid_input() {
        let invoker = ScriptedInvoker::new(vec![]);
        let orch = orchestrator(invoker.clone());
        let id = orch.start_session().await.unwrap();

        let err = orch.ask_with_timeout(&id, "   ").await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidInput { .. }));
        assert!(invoker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failure_leaves_log_untouched() {
        let invoker = ScriptedInvoker::new(vec![Err(AgentError::process_failed(1, "boom"))]);
        let orch = orchestrator(invoker);
        let id = orch.start_session().await.unwrap();

        let err = orch.ask_with_timeout(&id, "hello").await.unwrap_err();
        assert!(matches!(err, BridgeError::ProcessFailed { .. }));

        let session = orch.get_session(&id).await.unwrap();
        assert!(session.conversation_log.is_empty());
        assert!(!session.has_agent_handle());
    }

    #[tokio::test]
    async fn test_done_context_never_invokes() {
        let invoker = ScriptedInvoker::new(vec![Ok(AgentAnswer::new("answer", "h-1"))]);
        let orch = orchestrator(invoker.clone());
        let id = orch.start_session().await.unwrap();

        let ctx = RequestContext::background();
        ctx.cancel();
        let err = orch.ask(&id, "hello", &ctx).await.unwrap_err();

        assert!(err.is_timeout());
        assert!(invoker.calls().is_empty());
        assert!(orch.get_session(&id).await.unwrap().conversation_log.is_empty());
    }

    /// Answers after `delay` without looking at the context
    struct SlowInvoker {
        delay: Duration,
    }

    #[async_trait]
    impl AgentInvoker for SlowInvoker {
        async fn ask(
            &self,
            _ctx: &RequestContext,
            _agent_handle: &str,
            _question: &str,
            _working_dir: &Path,
        ) -> std::result::Result<AgentAnswer, AgentError> {
            tokio::time::sleep(self.delay).await;
            Ok(AgentAnswer::new("late", "h-late"))
        }
    }

    #[tokio::test]
    async fn test_answer_after_deadline_is_not_recorded() {
        let orch = Orchestrator::new(
            Arc::new(SessionStore::new()),
            Arc::new(SlowInvoker {
                delay: Duration::from_millis(150),
            }),
            ".",
        );
        let id = orch.start_session().await.unwrap();

        let ctx = RequestContext::with_timeout(Duration::from_millis(30));
        let err = orch.ask(&id, "hello", &ctx).await.unwrap_err();
        assert!(err.is_timeout());

        let session = orch.get_session(&id).await.unwrap();
        assert!(session.conversation_log.is_empty());
        assert!(!session.has_agent_handle());
    }

    #[tokio::test]
    async fn test_empty_returned_handle_keeps_previous() {
        let invoker = ScriptedInvoker::new(vec![
            Ok(AgentAnswer::new("a", "h-9")),
            Ok(AgentAnswer::new("b", "")),
        ]);
        let orch = orchestrator(invoker);
        let id = orch.start_session().await.unwrap();

        orch.ask_with_timeout(&id, "q1").await.unwrap();
        orch.ask_with_timeout(&id, "q2").await.unwrap();

        assert_eq!(orch.get_session(&id).await.unwrap().agent_handle, "h-9");
    }

    #[tokio::test]
    async fn test_heartbeat_and_end() {
        let orch = orchestrator(ScriptedInvoker::new(vec![]));
        let id = orch.start_session().await.unwrap();

        orch.heartbeat(&id).await.unwrap();
        orch.end_session(&id).await.unwrap();

        assert!(orch.heartbeat(&id).await.unwrap_err().is_not_found());
        assert!(orch.end_session(&id).await.unwrap_err().is_not_found());
        assert!(orch.list_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_unbounded_request_timeout_does_not_panic() {
        let invoker = ScriptedInvoker::new(vec![Ok(AgentAnswer::new("ok", "h"))]);
        let orch = orchestrator(invoker).with_request_timeout(Duration::MAX);
        let id = orch.start_session().await.unwrap();

        assert_eq!(orch.ask_with_timeout(&id, "hello").await.unwrap(), "ok");
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.request_timeout_secs = 7;
        config.workspace_dir = PathBuf::from("/tmp/project");

        let orch = Orchestrator::from_config(
            &config,
            Arc::new(SessionStore::new()),
            ScriptedInvoker::new(vec![]),
        );
        assert_eq!(orch.request_timeout(), Duration::from_secs(7));
        assert_eq!(orch.working_dir(), Path::new("/tmp/project"));
        assert!(orch.retry.is_enabled());
    }
}
