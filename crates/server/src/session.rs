//! Live session registry
//!
//! Tracks every connected session, enforces the session limit and fans the
//! process shutdown signal out to all session tasks.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;

use voice_bridge_core::Phase;

use crate::ServerError;

struct Entry {
    connected_at: DateTime<Utc>,
    phase: watch::Receiver<Phase>,
}

/// Snapshot of one live session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub phase: Phase,
    pub connected_at: DateTime<Utc>,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Entry>>,
    max_sessions: usize,
    shutdown: watch::Sender<bool>,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
            shutdown,
        }
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn has_capacity(&self) -> bool {
        !self.is_shutting_down() && self.count() < self.max_sessions
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Track a connected session
    pub fn register(&self, session_id: &str, phase: watch::Receiver<Phase>) -> Result<(), ServerError> {
        let mut sessions = self.sessions.write();

        if self.is_shutting_down() || sessions.len() >= self.max_sessions {
            return Err(ServerError::AtCapacity);
        }
        if sessions.contains_key(session_id) {
            return Err(ServerError::Session(format!("duplicate session id {}", session_id)));
        }

        sessions.insert(
            session_id.to_string(),
            Entry {
                connected_at: Utc::now(),
                phase,
            },
        );
        tracing::debug!(session_id = %session_id, active = sessions.len(), "Session registered");
        Ok(())
    }

    pub fn unregister(&self, session_id: &str) {
        let mut sessions = self.sessions.write();
        if sessions.remove(session_id).is_some() {
            tracing::debug!(session_id = %session_id, active = sessions.len(), "Session unregistered");
        }
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        self.sessions
            .read()
            .iter()
            .map(|(id, entry)| SessionInfo {
                session_id: id.clone(),
                phase: *entry.phase.borrow(),
                connected_at: entry.connected_at,
            })
            .collect()
    }

    /// Receiver that flips to `true` when the process is shutting down
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Tell every session to stop; new sessions are refused from here on
    pub fn shutdown_all(&self) {
        self.shutdown.send_replace(true);
        tracing::info!(active = self.count(), "Stopping all sessions");
    }

    /// Wait until every session unregistered or `grace` elapsed.
    ///
    /// Returns the number of sessions still registered.
    pub async fn drain(&self, grace: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + grace;
        while self.count() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        self.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase() -> watch::Receiver<Phase> {
        watch::channel(Phase::Idle).1
    }

    #[test]
    fn test_register_respects_limit() {
        let registry = SessionRegistry::new(2);
        registry.register("a", phase()).unwrap();
        registry.register("b", phase()).unwrap();
        assert!(!registry.has_capacity());
        assert!(matches!(registry.register("c", phase()), Err(ServerError::AtCapacity)));

        registry.unregister("a");
        assert!(registry.has_capacity());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = SessionRegistry::new(4);
        registry.register("a", phase()).unwrap();
        assert!(matches!(registry.register("a", phase()), Err(ServerError::Session(_))));
    }

    #[test]
    fn test_list_reports_phase() {
        let registry = SessionRegistry::new(4);
        let (tx, rx) = watch::channel(Phase::Idle);
        registry.register("a", rx).unwrap();
        tx.send_replace(Phase::Speaking);

        let sessions = registry.list();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].phase, Phase::Speaking);
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_sessions() {
        let registry = SessionRegistry::new(4);
        let mut signal = registry.shutdown_signal();
        registry.register("a", phase()).unwrap();

        registry.shutdown_all();
        signal.changed().await.unwrap();
        assert!(*signal.borrow());
        assert!(!registry.has_capacity());
        assert!(registry.register("b", phase()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_times_out() {
        let registry = SessionRegistry::new(4);
        registry.register("a", phase()).unwrap();
        assert_eq!(registry.drain(Duration::from_millis(100)).await, 1);

        registry.unregister("a");
        assert_eq!(registry.drain(Duration::from_millis(100)).await, 0);
    }
}
