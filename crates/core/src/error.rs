//! Error types for the voice bridge

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the voice bridge
#[derive(Error, Debug)]
pub enum Error {
    // Connection-level failures; these terminate the session
    #[error("Transport error: {0}")]
    Transport(String),

    // Failures of an external capability provider; contained to the turn
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Capability provider failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("transcription: {0}")]
    Transcription(String),

    #[error("generation: {0}")]
    Generation(String),

    #[error("synthesis: {0}")]
    Synthesis(String),

    #[error("retrieval: {0}")]
    Retrieval(String),
}

impl UpstreamError {
    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::Transcription(_) => "stt",
            UpstreamError::Generation(_) => "llm",
            UpstreamError::Synthesis(_) => "tts",
            UpstreamError::Retrieval(_) => "rag",
        }
    }

    /// Generic, client-safe message for this failure
    pub fn client_message(&self) -> &'static str {
        match self {
            UpstreamError::Transcription(_) => "STT error occurred",
            UpstreamError::Generation(_) => "LLM error occurred",
            UpstreamError::Synthesis(_) => "TTS error occurred",
            UpstreamError::Retrieval(_) => "Context retrieval error occurred",
        }
    }
}
