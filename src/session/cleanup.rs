//! Inactivity-based session eviction
//!
//! The [`CleanupScheduler`] periodically asks the [`SessionStore`] to drop
//! sessions whose last activity is older than the idle threshold. It holds
//! no lock of its own over sessions; all synchronization happens inside
//! the store.

use crate::session::store::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default idle threshold (10 minutes)
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default scan interval (1 minute)
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// How long `stop()` waits for the loop to exit before giving up on it
const STOP_GRACE: Duration = Duration::from_secs(5);

struct RunningLoop {
    handle: JoinHandle<()>,
    shutdown: CancellationToken,
}

/// Periodic evictor. `Stopped -> Running` on [`start`](Self::start),
/// `Running -> Stopped` on [`stop`](Self::stop).
pub struct CleanupScheduler {
    store: Arc<SessionStore>,
    idle_threshold: Duration,
    interval: Duration,
    running: Mutex<Option<RunningLoop>>,
}

impl CleanupScheduler {
    pub fn new(store: Arc<SessionStore>, idle_threshold: Duration, interval: Duration) -> Self {
        Self {
            store,
            idle_threshold,
            interval,
            running: Mutex::new(None),
        }
    }

    /// Runs a single eviction pass
    pub async fn run_once(&self) -> CleanupResult {
        evict_pass(&self.store, self.idle_threshold).await
    }

    /// Spawns the background loop. Returns `false` if it was already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("Cleanup scheduler already running");
            return false;
        }

        let store = Arc::clone(&self.store);
        let idle_threshold = self.idle_threshold;
        let period = self.interval;
        let shutdown = CancellationToken::new();
        let loop_shutdown = shutdown.clone();

        info!(
            interval_secs = period.as_secs(),
            idle_threshold_secs = idle_threshold.as_secs(),
            "Starting session cleanup scheduler"
        );

        let handle = tokio::spawn(async move {
            // First tick fires one full period after start.
            let now = tokio::time::Instant::now();
            let mut ticker = tokio::time::interval_at(now.checked_add(period).unwrap_or(now), period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = loop_shutdown.cancelled() => {
                        info!("Cleanup scheduler received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        evict_pass(&store, idle_threshold).await;
                    }
                }
            }
        });

        *running = Some(RunningLoop { handle, shutdown });
        true
    }

    /// Signals the loop to exit and waits for it. Safe to call repeatedly
    /// and before `start()` was ever called.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        running.shutdown.cancel();
        match tokio::time::timeout(STOP_GRACE, running.handle).await {
            Ok(Ok(())) => info!("Cleanup scheduler stopped"),
            Ok(Err(e)) => warn!(error = %e, "Cleanup scheduler task ended abnormally"),
            Err(_) => warn!("Cleanup scheduler did not stop within grace period"),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

async fn evict_pass(store: &SessionStore, idle_threshold: Duration) -> CleanupResult {
    let sessions_evicted = store.evict_inactive(idle_threshold).await;
    let sessions_remaining = store.count().await;

    if sessions_evicted > 0 {
        info!(
            sessions_evicted = sessions_evicted,
            sessions_remaining = sessions_remaining,
            "Removed inactive sessions"
        );
    } else {
        debug!(sessions_remaining = sessions_remaining, "No inactive sessions");
    }

    CleanupResult {
        sessions_evicted,
        sessions_remaining,
    }
}

/// Result of one eviction pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupResult {
    pub sessions_evicted: usize,
    /// Live sessions right after the pass
    pub sessions_remaining: usize,
}
