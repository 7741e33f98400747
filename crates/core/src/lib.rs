//! Core traits and types for the voice bridge
//!
//! This crate provides foundational types used across all other crates:
//! - PCM framing, resampling and activity detection
//! - Error types
//! - Capability adapter traits (transcription, generation, synthesis, retrieval)
//! - Conversation history and per-session phase state
//! - Turn latency bookkeeping

pub mod audio;
pub mod context;
pub mod conversation;
pub mod error;
pub mod latency;
pub mod session;
pub mod traits;

pub use audio::{
    detect_activity, mean_amplitude, resample_nearest, AudioFrame, AudioFramer,
    DEFAULT_ACTIVITY_THRESHOLD, DEFAULT_FRAME_MS, DEFAULT_SAMPLE_RATE,
};
pub use context::{format_context_for_prompt, ContextSnippet};
pub use conversation::{History, Message, Role, DEFAULT_MAX_HISTORY};
pub use error::{Error, Result, UpstreamError};
pub use latency::{TurnLatency, TurnLatencyTracker, TurnMetrics};
pub use session::{Phase, SessionState};
pub use traits::{
    ContextRetrieval, Generation, GenerationEvent, GenerationSender, GenerationStream, Synthesis,
    SynthesisEvent, SynthesisStream, TranscriptEvent, Transcription, TranscriptionStream,
};
