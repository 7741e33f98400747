//! PostgREST-backed session store
//!
//! Session state is authoritative in memory; rows are mirrored to the
//! `session_state` and `latency_telemetry` tables and the active personality
//! is read from `personality_config`. Remote write failures are logged, not
//! returned, so a degraded database never breaks a conversation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use voice_bridge_config::StoreProviderConfig;
use voice_bridge_core::{Message, TurnLatency};

use crate::memory::InMemorySessionStore;
use crate::sessions::{LatencyRecord, SessionRecord, SessionStore};
use crate::{Personality, PersistenceError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct SessionStateRow<'a> {
    session_id: &'a str,
    personality_id: Option<&'a str>,
    speaking_rate: f32,
    recent_turns: Vec<Message>,
    retrieved_chunk_ids: Vec<String>,
}

pub struct RestSessionStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    local: InMemorySessionStore,
}

impl RestSessionStore {
    pub fn new(config: &StoreProviderConfig, max_history: usize) -> Result<Self, PersistenceError> {
        let base_url = config
            .url
            .as_deref()
            .map(|url| format!("{}/rest/v1", url.trim_end_matches('/')))
            .ok_or_else(|| PersistenceError::Connection("providers.store.url not set".to_string()))?;

        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            local: InMemorySessionStore::new(max_history),
        })
    }

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.request(method, format!("{}/{}", self.base_url, table));
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }
        request
    }

    async fn insert<T: Serialize + ?Sized>(&self, table: &str, row: &T) -> Result<(), PersistenceError> {
        let response = self
            .request(reqwest::Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PersistenceError::Query(format!("{}: HTTP {}: {}", table, status, body)));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for RestSessionStore {
    async fn create_session(&self, personality_id: Option<String>) -> Result<SessionRecord, PersistenceError> {
        let record = self.local.create_session(personality_id).await?;

        let row = SessionStateRow {
            session_id: &record.session_id,
            personality_id: record.personality_id.as_deref(),
            speaking_rate: 1.0,
            recent_turns: Vec::new(),
            retrieved_chunk_ids: Vec::new(),
        };
        if let Err(e) = self.insert("session_state", &row).await {
            tracing::error!(session_id = %record.session_id, error = %e, "Error saving session to database");
        }

        Ok(record)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, PersistenceError> {
        self.local.get_session(session_id).await
    }

    async fn append_message(&self, session_id: &str, message: &Message) -> Result<(), PersistenceError> {
        self.local.append_message(session_id, message).await
    }

    async fn destroy_session(&self, session_id: &str) -> Result<(), PersistenceError> {
        self.local.destroy_session(session_id).await
    }

    async fn active_personality(&self) -> Result<Option<Personality>, PersistenceError> {
        let response = self
            .request(reqwest::Method::GET, "personality_config")
            .query(&[("select", "*"), ("is_active", "eq.true"), ("limit", "1")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PersistenceError::Query(format!(
                "personality_config: HTTP {}",
                response.status()
            )));
        }

        let rows: Vec<Personality> = response
            .json()
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        Ok(rows.into_iter().next())
    }

    async fn record_latency(
        &self,
        session_id: &str,
        latency: &TurnLatency,
    ) -> Result<Option<LatencyRecord>, PersistenceError> {
        let Some(record) = self.local.next_latency_record(session_id, latency) else {
            return Ok(None);
        };

        if let Err(e) = self.insert("latency_telemetry", &record).await {
            tracing::error!(session_id = %session_id, error = %e, "Error recording latency");
        }
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_url() {
        assert!(RestSessionStore::new(&StoreProviderConfig::default(), 20).is_err());
    }

    #[test]
    fn test_session_row_shape() {
        let row = SessionStateRow {
            session_id: "s1",
            personality_id: None,
            speaking_rate: 1.0,
            recent_turns: Vec::new(),
            retrieved_chunk_ids: Vec::new(),
        };
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["speaking_rate"], 1.0);
        assert!(value["recent_turns"].as_array().unwrap().is_empty());
        assert!(value["personality_id"].is_null());
    }

    #[tokio::test]
    async fn test_unreachable_database_does_not_break_session() {
        let config = StoreProviderConfig {
            url: Some("http://127.0.0.1:9".into()),
            api_key: None,
        };
        let store = RestSessionStore::new(&config, 20).unwrap();

        let record = store.create_session(None).await.unwrap();
        store
            .append_message(&record.session_id, &Message::user("hi"))
            .await
            .unwrap();
        let latency = TurnLatency {
            stt_endpoint_ms: Some(10),
            llm_first_token_ms: Some(20),
            tts_first_frame_ms: Some(30),
            total_latency_ms: 60,
        };
        let stored = store.record_latency(&record.session_id, &latency).await.unwrap();
        assert_eq!(stored.map(|r| r.turn_number), Some(1));
        assert!(store.active_personality().await.is_err());
    }
}
