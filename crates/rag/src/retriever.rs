//! Cached retriever implementing the ContextRetrieval contract

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use voice_bridge_config::RagConfig;
use voice_bridge_core::{ContextRetrieval, ContextSnippet};

use crate::cache::{cache_key, RetrievalCache};
use crate::RagError;

/// Raw vector-search hit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    #[serde(default, deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default, rename = "abstract")]
    pub summary: Option<String>,
    #[serde(default)]
    pub fast_facts: Option<Vec<String>>,
    #[serde(default)]
    pub quote: Option<String>,
}

fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

impl RetrievedChunk {
    /// Convert to a prompt snippet keeping at most `max_facts` facts
    pub fn into_snippet(self, max_facts: usize) -> ContextSnippet {
        let mut facts = self.fast_facts.unwrap_or_default();
        facts.truncate(max_facts);
        ContextSnippet {
            source: self.company,
            section: self.section,
            summary: self.summary,
            facts,
            quote: self.quote,
        }
    }
}

/// Embedding + vector search backend
#[async_trait]
pub trait RetrievalService: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, RagError>;
}

/// Ids of chunks retrieved per session, newest `limit` kept
#[derive(Debug)]
pub struct SessionChunkTracker {
    limit: usize,
    sessions: Mutex<HashMap<String, Vec<String>>>,
}

impl SessionChunkTracker {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, session_id: &str, ids: impl IntoIterator<Item = String>) {
        let mut sessions = self.sessions.lock();
        let list = sessions.entry(session_id.to_string()).or_default();
        list.extend(ids);
        if list.len() > self.limit {
            let excess = list.len() - self.limit;
            list.drain(..excess);
        }
    }

    pub fn chunk_ids(&self, session_id: &str) -> Vec<String> {
        self.sessions.lock().get(session_id).cloned().unwrap_or_default()
    }

    pub fn clear(&self, session_id: &str) {
        self.sessions.lock().remove(session_id);
    }
}

/// Wraps a [`RetrievalService`] with the result cache and chunk tracking.
///
/// One instance is shared by every session.
pub struct CachedRetriever<S> {
    service: S,
    cache: RetrievalCache,
    chunks: SessionChunkTracker,
    query_prefix_chars: usize,
    max_facts: usize,
}

impl<S: RetrievalService> CachedRetriever<S> {
    pub fn new(service: S, config: &RagConfig) -> Self {
        Self {
            service,
            cache: RetrievalCache::new(Duration::from_millis(config.cache_ttl_ms), config.cache_capacity),
            chunks: SessionChunkTracker::new(config.session_chunk_limit),
            query_prefix_chars: config.query_prefix_chars,
            max_facts: config.max_facts,
        }
    }

    pub fn cache(&self) -> &RetrievalCache {
        &self.cache
    }

    pub fn session_chunks(&self, session_id: &str) -> Vec<String> {
        self.chunks.chunk_ids(session_id)
    }

    /// Drop every cached result; called on process shutdown
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[async_trait]
impl<S: RetrievalService> ContextRetrieval for CachedRetriever<S> {
    async fn fetch_context(&self, query: &str, session_id: &str, top_k: usize) -> Vec<ContextSnippet> {
        let key = cache_key(session_id, query, self.query_prefix_chars);
        if let Some(snippets) = self.cache.get(&key) {
            tracing::debug!(session_id = %session_id, "Retrieval cache hit");
            return snippets;
        }

        let chunks = match self.service.search(query, top_k).await {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Context retrieval failed");
                return Vec::new();
            }
        };

        self.chunks
            .record(session_id, chunks.iter().map(|c| c.id.clone()));

        let snippets: Vec<ContextSnippet> = chunks
            .into_iter()
            .map(|c| c.into_snippet(self.max_facts))
            .collect();
        self.cache.insert(key, snippets.clone());

        snippets
    }

    fn clear_session(&self, session_id: &str) {
        self.chunks.clear(session_id);
    }
}

/// Stand-in used when retrieval is disabled; every turn gets no context
#[derive(Debug, Default, Clone, Copy)]
pub struct NoContext;

#[async_trait]
impl ContextRetrieval for NoContext {
    async fn fetch_context(&self, _query: &str, _session_id: &str, _top_k: usize) -> Vec<ContextSnippet> {
        Vec::new()
    }

    fn clear_session(&self, _session_id: &str) {}
}
