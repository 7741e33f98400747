//! Speech capability traits

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::AudioFrame;
use crate::error::UpstreamError;

/// Event emitted by a transcription connection.
///
/// Per utterance: zero or more `Partial`, then exactly one `Final`.
/// `Endpoint` is an out-of-band hint. `Error` ends the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    Partial(String),
    Final(String),
    Endpoint,
    Error(String),
}

/// A live transcription connection.
///
/// Dropping (or [`close`](Self::close)-ing) the stream tears down the
/// upstream connection.
#[derive(Debug)]
pub struct TranscriptionStream {
    audio_tx: mpsc::Sender<AudioFrame>,
    events: mpsc::Receiver<TranscriptEvent>,
}

impl TranscriptionStream {
    pub fn new(audio_tx: mpsc::Sender<AudioFrame>, events: mpsc::Receiver<TranscriptEvent>) -> Self {
        Self { audio_tx, events }
    }

    /// Push one frame; fire-and-forget
    pub fn send_audio(&self, frame: AudioFrame) {
        if let Err(e) = self.audio_tx.try_send(frame) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    tracing::debug!("Transcription audio queue full, frame dropped");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    tracing::debug!("Transcription connection closed, frame dropped");
                }
            }
        }
    }

    /// Next event; `None` once the connection is gone
    pub async fn next_event(&mut self) -> Option<TranscriptEvent> {
        self.events.recv().await
    }

    /// Tear down the connection
    pub fn close(self) {
        drop(self.audio_tx);
    }
}

/// Streaming speech recognition provider
#[async_trait]
pub trait Transcription: Send + Sync {
    /// Open a new recognition connection
    async fn connect(&self) -> Result<TranscriptionStream, UpstreamError>;

    /// Provider name for logs
    fn name(&self) -> &str;
}

/// Event emitted by one synthesis call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    /// PCM chunk, in playback order
    Audio(Vec<u8>),
    Complete,
    Error(String),
}

pub type SynthesisStream = mpsc::Receiver<SynthesisEvent>;

/// Streaming speech synthesis provider
pub trait Synthesis: Send + Sync {
    /// Start synthesizing `text`; the call runs in the background and
    /// reports through the returned stream, ending with `Complete` or `Error`.
    fn stream_synthesis(&self, text: String) -> SynthesisStream;
}
