//! Real-time voice turn pipeline
//!
//! This crate provides:
//! - The per-session `PipelineOrchestrator` (listen, think, speak, barge-in)
//! - The client wire protocol
//! - Streaming STT over a realtime websocket
//! - Streaming TTS over an HTTP byte stream

pub mod metrics;
pub mod orchestrator;
pub mod protocol;
pub mod stt;
pub mod tts;

pub use orchestrator::{Capabilities, OrchestratorConfig, PipelineOrchestrator};
pub use protocol::{ClientControl, ClientInput, Outbound, ServerEvent, StatusMessage};
pub use stt::RealtimeTranscriber;
pub use tts::HttpSynthesizer;

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("STT error: {0}")]
    Stt(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Session store error: {0}")]
    Store(String),

    #[error("Channel closed")]
    ChannelClosed,
}

impl From<voice_bridge_persistence::PersistenceError> for PipelineError {
    fn from(err: voice_bridge_persistence::PersistenceError) -> Self {
        PipelineError::Store(err.to_string())
    }
}

impl From<PipelineError> for voice_bridge_core::Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Stt(msg) => voice_bridge_core::UpstreamError::Transcription(msg).into(),
            PipelineError::Tts(msg) => voice_bridge_core::UpstreamError::Synthesis(msg).into(),
            PipelineError::Store(msg) => voice_bridge_core::Error::Persistence(msg),
            PipelineError::ChannelClosed => voice_bridge_core::Error::Transport("channel closed".to_string()),
        }
    }
}
