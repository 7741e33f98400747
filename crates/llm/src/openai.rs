//! OpenAI-compatible streaming chat completion

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use voice_bridge_config::GenerationProviderConfig;
use voice_bridge_core::{Generation, GenerationSender, GenerationStream, Message};

use crate::sse::{SseDecoder, SseEvent};
use crate::LlmError;

const EVENT_BUFFER: usize = 64;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

struct Inner {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

/// Streaming generator backed by `/chat/completions`
#[derive(Clone)]
pub struct OpenAiGenerator {
    inner: Arc<Inner>,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationProviderConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
                api_key: config.api_key.clone(),
                model: config.model.clone(),
                max_tokens: config.max_tokens,
                temperature: config.temperature,
            }),
        })
    }
}

impl Inner {
    async fn run(&self, messages: Vec<Message>, sender: &mut GenerationSender) -> Result<(), LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::NotConfigured("providers.generation.api_key".to_string()))?;

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages: &messages,
                stream: true,
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for event in decoder.push(&chunk) {
                let data = match event {
                    SseEvent::Done => return Ok(()),
                    SseEvent::Data(data) => data,
                };

                let parsed: StreamChunk = match serde_json::from_str(&data) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        tracing::debug!(error = %e, "Skipping unparseable SSE chunk");
                        continue;
                    }
                };

                let content = parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content)
                    .unwrap_or_default();

                if !sender.token(&content).await {
                    tracing::debug!("Generation consumer dropped, stopping stream");
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}

impl Generation for OpenAiGenerator {
    fn stream_completion(&self, messages: Vec<Message>) -> GenerationStream {
        let (mut sender, stream) = GenerationSender::channel(EVENT_BUFFER);
        let inner = self.inner.clone();

        tokio::spawn(async move {
            match inner.run(messages, &mut sender).await {
                Ok(()) => sender.complete().await,
                Err(e) => {
                    tracing::error!(model = %inner.model, error = %e, "Generation failed");
                    sender.fail(e.to_string()).await;
                }
            }
        });

        stream
    }

    fn model_name(&self) -> &str {
        &self.inner.model
    }
}
