//! Capability adapter traits
//!
//! Every external provider is consumed through one of these traits so
//! vendors can be swapped and tests can script them in-process.
//!
//! ```text
//! Speech:
//!   - Transcription: audio frames in, ordered TranscriptEvents out
//!   - Synthesis: text in, ordered SynthesisEvents (audio chunks) out
//!
//! Language model:
//!   - Generation: prompt in, ordered GenerationEvents (tokens) out
//!
//! Retrieval:
//!   - ContextRetrieval: query in, context snippets out (never fails)
//! ```
//!
//! Adapters report progress as typed events on a single ordered channel per
//! call rather than through callbacks. A closed channel without a terminal
//! event is treated by consumers as an error.

mod llm;
mod retriever;
mod speech;

pub use llm::{Generation, GenerationEvent, GenerationSender, GenerationStream};
pub use retriever::ContextRetrieval;
pub use speech::{
    Synthesis, SynthesisEvent, SynthesisStream, TranscriptEvent, Transcription,
    TranscriptionStream,
};
