//! Speech synthesis over an HTTP byte stream
//!
//! The response body is raw `pcm_s16le`; chunks are forwarded in arrival
//! order as they are read.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use voice_bridge_config::SynthesisProviderConfig;
use voice_bridge_core::{Synthesis, SynthesisEvent, SynthesisStream};

use crate::PipelineError;

const EVENT_BUFFER: usize = 64;

#[derive(Serialize)]
struct Voice<'a> {
    mode: &'static str,
    id: &'a str,
}

#[derive(Serialize)]
struct OutputFormat {
    container: &'static str,
    encoding: &'static str,
    sample_rate: u32,
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    model_id: &'a str,
    transcript: &'a str,
    voice: Voice<'a>,
    output_format: OutputFormat,
    language: &'a str,
}

struct Inner {
    client: reqwest::Client,
    config: SynthesisProviderConfig,
    sample_rate: u32,
}

#[derive(Clone)]
pub struct HttpSynthesizer {
    inner: Arc<Inner>,
}

impl HttpSynthesizer {
    pub fn new(config: &SynthesisProviderConfig, sample_rate: u32) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Tts(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                config: config.clone(),
                sample_rate,
            }),
        })
    }
}

impl Inner {
    fn request_body<'a>(&'a self, text: &'a str) -> SynthesisRequest<'a> {
        SynthesisRequest {
            model_id: &self.config.model_id,
            transcript: text,
            voice: Voice {
                mode: "id",
                id: &self.config.voice_id,
            },
            output_format: OutputFormat {
                container: "raw",
                encoding: "pcm_s16le",
                sample_rate: self.sample_rate,
            },
            language: &self.config.language,
        }
    }

    async fn run(&self, text: &str, tx: &mpsc::Sender<SynthesisEvent>) -> Result<(), PipelineError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| PipelineError::Tts("api key not configured".to_string()))?;

        let response = self
            .client
            .post(&self.config.url)
            .header("X-API-Key", api_key)
            .header("Cartesia-Version", &self.config.api_version)
            .json(&self.request_body(text))
            .send()
            .await
            .map_err(|e| PipelineError::Tts(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::Tts(format!("HTTP {}", response.status())));
        }

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| PipelineError::Tts(e.to_string()))?;
            if chunk.is_empty() {
                continue;
            }
            if tx.send(SynthesisEvent::Audio(chunk.to_vec())).await.is_err() {
                return Err(PipelineError::ChannelClosed);
            }
        }
        Ok(())
    }
}

impl Synthesis for HttpSynthesizer {
    fn stream_synthesis(&self, text: String) -> SynthesisStream {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let inner = self.inner.clone();

        tokio::spawn(async move {
            match inner.run(&text, &tx).await {
                Ok(()) => {
                    let _ = tx.send(SynthesisEvent::Complete).await;
                }
                Err(PipelineError::ChannelClosed) => {
                    tracing::debug!("Synthesis consumer dropped");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Synthesis failed");
                    let _ = tx.send(SynthesisEvent::Error(e.to_string())).await;
                }
            }
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let config = SynthesisProviderConfig {
            voice_id: "voice-1".into(),
            ..Default::default()
        };
        let synth = HttpSynthesizer::new(&config, 24_000).unwrap();
        let body = serde_json::to_value(synth.inner.request_body("Hi there!")).unwrap();

        assert_eq!(body["model_id"], "sonic-english");
        assert_eq!(body["transcript"], "Hi there!");
        assert_eq!(body["voice"]["mode"], "id");
        assert_eq!(body["voice"]["id"], "voice-1");
        assert_eq!(body["output_format"]["container"], "raw");
        assert_eq!(body["output_format"]["encoding"], "pcm_s16le");
        assert_eq!(body["output_format"]["sample_rate"], 24_000);
        assert_eq!(body["language"], "en");
    }

    #[tokio::test]
    async fn test_missing_key_reports_error() {
        let synth = HttpSynthesizer::new(&SynthesisProviderConfig::default(), 24_000).unwrap();
        let mut stream = synth.stream_synthesis("hello".into());
        assert!(matches!(stream.recv().await, Some(SynthesisEvent::Error(_))));
        assert!(stream.recv().await.is_none());
    }
}
