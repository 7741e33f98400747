//! Streaming Speech-to-Text

mod streaming;

pub use streaming::RealtimeTranscriber;
