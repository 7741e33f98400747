//! Streaming Text-to-Speech

mod streaming;

pub use streaming::HttpSynthesizer;
