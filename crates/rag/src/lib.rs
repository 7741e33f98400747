//! Context retrieval for prompt augmentation
//!
//! Features:
//! - Embedding + vector search over HTTP (`HttpRetrievalService`)
//! - Time-boxed result cache keyed by session and query prefix
//! - Per-session record of retrieved chunk ids

pub mod cache;
pub mod remote;
pub mod retriever;

pub use cache::{cache_key, CacheStats, RetrievalCache};
pub use remote::HttpRetrievalService;
pub use retriever::{CachedRetriever, NoContext, RetrievalService, RetrievedChunk, SessionChunkTracker};

use thiserror::Error;

/// Retrieval errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        RagError::Connection(err.to_string())
    }
}

impl From<RagError> for voice_bridge_core::Error {
    fn from(err: RagError) -> Self {
        voice_bridge_core::UpstreamError::Retrieval(err.to_string()).into()
    }
}
