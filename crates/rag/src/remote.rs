//! HTTP retrieval: OpenAI-compatible embeddings + PostgREST vector RPC

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use voice_bridge_config::{GenerationProviderConfig, RagConfig, StoreProviderConfig};

use crate::retriever::{RetrievalService, RetrievedChunk};
use crate::RagError;

const MATCH_RPC: &str = "match_document_chunks";

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct MatchRequest<'a> {
    query_embedding: &'a [f32],
    match_count: usize,
    match_threshold: f32,
}

pub struct HttpRetrievalService {
    client: reqwest::Client,
    embeddings_url: String,
    embeddings_key: Option<String>,
    embedding_model: String,
    rpc_url: Option<String>,
    store_key: Option<String>,
    match_threshold: f32,
}

impl HttpRetrievalService {
    pub fn new(
        generation: &GenerationProviderConfig,
        store: &StoreProviderConfig,
        rag: &RagConfig,
    ) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(generation.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            embeddings_url: format!("{}/embeddings", generation.base_url.trim_end_matches('/')),
            embeddings_key: generation.api_key.clone(),
            embedding_model: generation.embedding_model.clone(),
            rpc_url: store
                .url
                .as_ref()
                .map(|url| format!("{}/rest/v1/rpc/{}", url.trim_end_matches('/'), MATCH_RPC)),
            store_key: store.api_key.clone(),
            match_threshold: rag.match_threshold,
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut request = self.client.post(&self.embeddings_url).json(&EmbeddingRequest {
            model: &self.embedding_model,
            input: text,
        });
        if let Some(key) = &self.embeddings_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(RagError::Embedding(format!("HTTP {}", response.status())));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| RagError::Embedding("empty embedding response".to_string()))
    }
}

#[async_trait]
impl RetrievalService for HttpRetrievalService {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, RagError> {
        let rpc_url = self
            .rpc_url
            .as_deref()
            .ok_or_else(|| RagError::NotConfigured("providers.store.url".to_string()))?;

        let embedding = self.embed(query).await?;

        let mut request = self.client.post(rpc_url).json(&MatchRequest {
            query_embedding: &embedding,
            match_count: top_k,
            match_threshold: self.match_threshold,
        });
        if let Some(key) = &self.store_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::VectorStore(format!("HTTP {}: {}", status, body)));
        }

        let chunks: Vec<RetrievedChunk> = response
            .json()
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        tracing::debug!(matches = chunks.len(), "Vector search complete");
        Ok(chunks)
    }
}
