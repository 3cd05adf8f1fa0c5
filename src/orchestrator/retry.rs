//! Exponential back-off retry around single agent invocations

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::agent::AgentError;
use crate::orchestrator::classify::{ErrorClass, classify};
use crate::utils::context::{DoneReason, RequestContext};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first; `1` disables retries
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Multiplier applied after each failed retry
    pub multiplier: f64,
    /// Cap on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 1
    }

    /// Delay before retry number `retry` (0-indexed)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let delay_ms = base_ms * self.multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// Runs `op` until it succeeds, fails permanently, or the attempt
    /// ceiling is reached. `op` receives the 1-based attempt number.
    ///
    /// Back-off sleeps are bounded by `ctx`; if it completes while waiting,
    /// the matching cancellation error is returned without another attempt.
    pub async fn run<T, F, Fut>(&self, ctx: &RequestContext, mut op: F) -> Result<T, AgentError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AgentError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if classify(&err) == ErrorClass::Permanent || attempt >= max_attempts {
                return Err(err);
            }

            let delay = self.delay_for_retry(attempt - 1);
            warn!(
                attempt = attempt,
                max_attempts = max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient agent failure, retrying with backoff"
            );

            tokio::select! {
                biased;
                reason = ctx.done() => {
                    return Err(match reason {
                        DoneReason::Cancelled => AgentError::Cancelled,
                        DoneReason::DeadlineExceeded => AgentError::DeadlineExceeded,
                    });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_default_policy_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert!(policy.is_enabled());
        assert!(!RetryPolicy::disabled().is_enabled());
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for_retry(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for_retry(30), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let calls = AtomicU32::new(0);
        let ctx = RequestContext::with_timeout(Duration::from_secs(5));

        let result = fast_policy(3)
            .run(&ctx, |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(AgentError::spawn_failed("fork failed"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let ctx = RequestContext::with_timeout(Duration::from_secs(5));

        let result: Result<(), _> = fast_policy(5)
            .run(&ctx, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AgentError::agent_reported("invalid api key")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ceiling_is_respected() {
        let calls = AtomicU32::new(0);
        let ctx = RequestContext::with_timeout(Duration::from_secs(5));

        let result: Result<(), _> = fast_policy(4)
            .run(&ctx, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AgentError::spawn_failed("fork failed")) }
            })
            .await;

        assert!(matches!(result, Err(AgentError::SpawnFailed { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_context_expiry_during_backoff() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_secs(30),
            multiplier: 1.0,
            max_delay: Duration::from_secs(30),
        };
        let ctx = RequestContext::with_timeout(Duration::from_millis(50));

        let result: Result<(), _> = policy
            .run(&ctx, |_| async { Err(AgentError::spawn_failed("fork failed")) })
            .await;

        assert_eq!(result.unwrap_err(), AgentError::DeadlineExceeded);
    }
}
