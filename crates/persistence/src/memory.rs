//! In-process session store

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use voice_bridge_core::{Message, TurnLatency};

use crate::sessions::{LatencyRecord, SessionRecord, SessionStore};
use crate::{Personality, PersistenceError};

pub struct InMemorySessionStore {
    max_history: usize,
    sessions: RwLock<HashMap<String, SessionRecord>>,
    personality: RwLock<Option<Personality>>,
    latency: RwLock<Vec<LatencyRecord>>,
}

impl InMemorySessionStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history,
            sessions: RwLock::new(HashMap::new()),
            personality: RwLock::new(None),
            latency: RwLock::new(Vec::new()),
        }
    }

    pub fn set_active_personality(&self, personality: Option<Personality>) {
        *self.personality.write() = personality;
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Every latency record stored so far
    pub fn latency_records(&self) -> Vec<LatencyRecord> {
        self.latency.read().clone()
    }

    pub(crate) fn insert(&self, record: SessionRecord) {
        self.sessions.write().insert(record.session_id.clone(), record);
    }

    /// Bump the turn counter and build the telemetry row
    pub(crate) fn next_latency_record(&self, session_id: &str, latency: &TurnLatency) -> Option<LatencyRecord> {
        let mut sessions = self.sessions.write();
        let session = sessions.get_mut(session_id)?;
        session.turn_count += 1;
        session.updated_at = Utc::now();

        Some(LatencyRecord {
            session_id: session_id.to_string(),
            conversation_id: None,
            turn_number: session.turn_count,
            stt_endpoint_ms: latency.stt_endpoint_ms,
            llm_first_token_ms: latency.llm_first_token_ms,
            tts_first_frame_ms: latency.tts_first_frame_ms,
            total_latency_ms: latency.total_latency_ms,
        })
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(voice_bridge_core::DEFAULT_MAX_HISTORY)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, personality_id: Option<String>) -> Result<SessionRecord, PersistenceError> {
        let record = SessionRecord::new(personality_id);
        self.insert(record.clone());
        tracing::info!(session_id = %record.session_id, "Session created");
        Ok(record)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, PersistenceError> {
        Ok(self.sessions.read().get(session_id).cloned())
    }

    async fn append_message(&self, session_id: &str, message: &Message) -> Result<(), PersistenceError> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| PersistenceError::SessionNotFound(session_id.to_string()))?;

        session.history.push(message.clone());
        if session.history.len() > self.max_history {
            let excess = session.history.len() - self.max_history;
            session.history.drain(..excess);
        }
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn destroy_session(&self, session_id: &str) -> Result<(), PersistenceError> {
        if self.sessions.write().remove(session_id).is_some() {
            tracing::info!(session_id = %session_id, "Session destroyed");
        }
        Ok(())
    }

    async fn active_personality(&self) -> Result<Option<Personality>, PersistenceError> {
        Ok(self.personality.read().clone())
    }

    async fn record_latency(
        &self,
        session_id: &str,
        latency: &TurnLatency,
    ) -> Result<Option<LatencyRecord>, PersistenceError> {
        let record = self.next_latency_record(session_id, latency);
        if let Some(record) = &record {
            self.latency.write().push(record.clone());
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latency(total: u64) -> TurnLatency {
        TurnLatency {
            stt_endpoint_ms: Some(total),
            llm_first_token_ms: None,
            tts_first_frame_ms: None,
            total_latency_ms: total,
        }
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let store = InMemorySessionStore::default();
        let record = store.create_session(Some("p1".into())).await.unwrap();
        assert_eq!(store.session_count(), 1);

        let fetched = store.get_session(&record.session_id).await.unwrap().unwrap();
        assert_eq!(fetched.personality_id.as_deref(), Some("p1"));

        store.destroy_session(&record.session_id).await.unwrap();
        assert!(store.get_session(&record.session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_capped() {
        let store = InMemorySessionStore::new(20);
        let id = store.create_session(None).await.unwrap().session_id;
        for i in 0..25 {
            store.append_message(&id, &Message::user(format!("m{}", i))).await.unwrap();
        }
        let history = store.get_session(&id).await.unwrap().unwrap().history;
        assert_eq!(history.len(), 20);
        assert_eq!(history[0].content, "m5");
    }

    #[tokio::test]
    async fn test_append_to_unknown_session_fails() {
        let store = InMemorySessionStore::default();
        let err = store.append_message("nope", &Message::user("x")).await.unwrap_err();
        assert!(matches!(err, PersistenceError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_latency_turn_numbers_increment() {
        let store = InMemorySessionStore::default();
        let id = store.create_session(None).await.unwrap().session_id;

        let first = store.record_latency(&id, &latency(100)).await.unwrap().unwrap();
        let second = store.record_latency(&id, &latency(300)).await.unwrap().unwrap();
        assert_eq!(first.turn_number, 1);
        assert_eq!(second.turn_number, 2);
        assert_eq!(second.total_latency_ms, 300);
        assert_eq!(store.latency_records().len(), 2);

        assert!(store.record_latency("unknown", &latency(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_active_personality() {
        let store = InMemorySessionStore::default();
        assert!(store.active_personality().await.unwrap().is_none());

        store.set_active_personality(Some(Personality {
            instructions: "Be brief".into(),
            ..Default::default()
        }));
        assert_eq!(
            store.active_personality().await.unwrap().map(|p| p.instructions),
            Some("Be brief".to_string())
        );
    }
}
