//! Language model integration
//!
//! - `PromptBuilder`: system prompt + recent history + context-prefixed user turn
//! - `OpenAiGenerator`: streaming chat completions over SSE

pub mod openai;
pub mod prompt;
pub mod sse;

pub use openai::OpenAiGenerator;
pub use prompt::PromptBuilder;
pub use sse::{SseDecoder, SseEvent};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Network(err.to_string())
    }
}

impl From<LlmError> for voice_bridge_core::Error {
    fn from(err: LlmError) -> Self {
        voice_bridge_core::UpstreamError::Generation(err.to_string()).into()
    }
}
