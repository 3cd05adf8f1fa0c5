use crate::session::types::{Message, Session};
use crate::utils::error::{BridgeError, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Authoritative in-memory registry of live sessions.
///
/// Every read returns a clone taken while the lock is held, so callers can
/// never observe or mutate the map's contents directly. The lock is only
/// held for the map access itself, never across subprocess work.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session with a fresh v4 UUID and returns a copy of it.
    ///
    /// A UUID collision with a live session is reported as `Internal`
    /// rather than overwriting the existing entry.
    ///
    /// # Returns
    /// * `Ok(Session)` - Copy of the new session, empty handle and log
    /// * `Err(BridgeError::Internal)` - The generated id was already live
    pub async fn create(&self) -> Result<Session> {
        let id = Uuid::new_v4().to_string();
        let session = Session::new(id.clone());

        let mut guard = self.sessions.write().await;
        if guard.contains_key(&id) {
            return Err(BridgeError::internal(format!(
                "generated session id {} is already in use",
                id
            )));
        }
        guard.insert(id, session.clone());
        debug!(session_id = %session.id, live_sessions = guard.len(), "Session created");
        Ok(session)
    }

    /// Retrieves a copy of the session.
    ///
    /// **Lock Scope Pattern**: read lock, clone, release on return.
    ///
    /// # Arguments
    /// * `id` - Session identifier
    ///
    /// # Returns
    /// * `Ok(Session)` - Independent copy; mutating it does not touch the store
    /// * `Err(BridgeError::NotFound)` - No live session has this id
    pub async fn get(&self, id: &str) -> Result<Session> {
        let guard = self.sessions.read().await;
        guard.get(id).cloned().ok_or_else(|| BridgeError::not_found(id))
    }

    /// Sets `last_activity` to now.
    pub async fn update_activity(&self, id: &str) -> Result<()> {
        let mut guard = self.sessions.write().await;
        let session = guard.get_mut(id).ok_or_else(|| BridgeError::not_found(id))?;
        session.last_activity = Utc::now();
        Ok(())
    }

    /// Records the agent CLI's conversation handle. Writing the same value
    /// again is a no-op.
    pub async fn set_agent_handle(&self, id: &str, handle: &str) -> Result<()> {
        let mut guard = self.sessions.write().await;
        let session = guard.get_mut(id).ok_or_else(|| BridgeError::not_found(id))?;
        if session.agent_handle != handle {
            session.agent_handle = handle.to_string();
        }
        Ok(())
    }

    /// Appends all entries in one write-lock acquisition, so readers see
    /// either none or all of them.
    pub async fn append_log(&self, id: &str, entries: Vec<Message>) -> Result<()> {
        let mut guard = self.sessions.write().await;
        let session = guard.get_mut(id).ok_or_else(|| BridgeError::not_found(id))?;
        session.conversation_log.extend(entries);
        Ok(())
    }

    /// Removes the session.
    ///
    /// # Returns
    /// * `Ok(())` - The session existed and is gone
    /// * `Err(BridgeError::NotFound)` - Unknown id, including a second delete
    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut guard = self.sessions.write().await;
        match guard.remove(id) {
            Some(_) => {
                debug!(session_id = %id, live_sessions = guard.len(), "Session deleted");
                Ok(())
            }
            None => Err(BridgeError::not_found(id)),
        }
    }

    /// Copies of every live session, in no particular order.
    pub async fn list(&self) -> Vec<Session> {
        let guard = self.sessions.read().await;
        guard.values().cloned().collect()
    }

    /// Removes every session idle for strictly longer than `max_idle` and
    /// returns how many were removed.
    ///
    /// # Arguments
    /// * `max_idle` - Idle threshold; a session idle for exactly this long stays
    pub async fn evict_inactive(&self, max_idle: Duration) -> usize {
        let Ok(max_idle) = chrono::Duration::from_std(max_idle) else {
            // Longer than chrono can represent: nothing can have been idle that long.
            return 0;
        };

        let mut guard = self.sessions.write().await;
        let now = Utc::now();
        let before = guard.len();
        guard.retain(|id, session| {
            let keep = session.idle_for(now) <= max_idle;
            if !keep {
                debug!(
                    session_id = %id,
                    idle_secs = session.idle_for(now).num_seconds(),
                    "Evicting inactive session"
                );
            }
            keep
        });
        before - guard.len()
    }

    /// Number of live sessions
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn backdate_activity(&self, id: &str, by: chrono::Duration) {
        if let Some(session) = self.sessions.write().await.get_mut(id) {
            session.last_activity = session.last_activity - by;
        }
    }
}
