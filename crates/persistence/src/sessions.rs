//! Session store contract

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use voice_bridge_core::{Message, TurnLatency};

use crate::{Personality, PersistenceError};

/// Stored view of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub personality_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub turn_count: u32,
    pub history: Vec<Message>,
}

impl SessionRecord {
    pub fn new(personality_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            personality_id,
            created_at: now,
            updated_at: now,
            turn_count: 0,
            history: Vec::new(),
        }
    }
}

/// One row of latency telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyRecord {
    pub session_id: String,
    pub conversation_id: Option<String>,
    pub turn_number: u32,
    pub stt_endpoint_ms: Option<u64>,
    pub llm_first_token_ms: Option<u64>,
    pub tts_first_frame_ms: Option<u64>,
    pub total_latency_ms: u64,
}

/// Session store trait for abstraction
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session with a fresh id
    async fn create_session(&self, personality_id: Option<String>) -> Result<SessionRecord, PersistenceError>;

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, PersistenceError>;

    async fn append_message(&self, session_id: &str, message: &Message) -> Result<(), PersistenceError>;

    async fn destroy_session(&self, session_id: &str) -> Result<(), PersistenceError>;

    /// Currently active personality, if any
    async fn active_personality(&self) -> Result<Option<Personality>, PersistenceError>;

    /// Store a finalized turn; returns `None` for an unknown session
    async fn record_latency(
        &self,
        session_id: &str,
        latency: &TurnLatency,
    ) -> Result<Option<LatencyRecord>, PersistenceError>;
}
