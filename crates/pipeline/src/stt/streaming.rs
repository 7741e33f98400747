//! Realtime transcription over a websocket
//!
//! Audio goes up as `{"audio_data": "<base64 pcm>"}`; results come back as
//! JSON tagged by `message_type`. Closing the stream sends
//! `{"terminate_session": true}` before the socket is closed.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use voice_bridge_config::TranscriptionProviderConfig;
use voice_bridge_core::{AudioFrame, TranscriptEvent, Transcription, TranscriptionStream, UpstreamError};

const AUDIO_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
struct RealtimeMessage {
    #[serde(default)]
    message_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Map one upstream message to transcript events
fn parse_message(raw: &str) -> Vec<TranscriptEvent> {
    let message: RealtimeMessage = match serde_json::from_str(raw) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unparseable transcription message");
            return Vec::new();
        }
    };

    if let Some(error) = message.error {
        return vec![TranscriptEvent::Error(error)];
    }

    let text = message.text.filter(|t| !t.trim().is_empty());
    match (message.message_type.as_deref(), text) {
        (Some("PartialTranscript"), Some(text)) => vec![TranscriptEvent::Partial(text)],
        (Some("FinalTranscript"), Some(text)) => {
            vec![TranscriptEvent::Endpoint, TranscriptEvent::Final(text)]
        }
        (Some("SessionBegins"), _) => {
            tracing::info!(upstream_session = ?message.session_id, "Transcription session started");
            Vec::new()
        }
        (Some("SessionTerminated"), _) => {
            tracing::info!("Transcription session terminated");
            Vec::new()
        }
        _ => Vec::new(),
    }
}

fn audio_message(frame: &AudioFrame) -> String {
    serde_json::json!({ "audio_data": BASE64.encode(frame.as_bytes()) }).to_string()
}

pub struct RealtimeTranscriber {
    url: String,
    api_key: Option<String>,
    sample_rate: u32,
}

impl RealtimeTranscriber {
    pub fn new(config: &TranscriptionProviderConfig, sample_rate: u32) -> Self {
        Self {
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            sample_rate,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}?sample_rate={}", self.url, self.sample_rate)
    }
}

#[async_trait]
impl Transcription for RealtimeTranscriber {
    async fn connect(&self) -> Result<TranscriptionStream, UpstreamError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| UpstreamError::Transcription("api key not configured".to_string()))?;

        let mut request = self
            .endpoint()
            .into_client_request()
            .map_err(|e| UpstreamError::Transcription(e.to_string()))?;
        let auth = HeaderValue::from_str(api_key).map_err(|e| UpstreamError::Transcription(e.to_string()))?;
        request.headers_mut().insert("authorization", auth);

        let (socket, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| UpstreamError::Transcription(e.to_string()))?;
        tracing::info!("Transcription connection opened");

        let (mut sink, mut source) = socket.split();
        let (audio_tx, mut audio_rx) = mpsc::channel::<AudioFrame>(AUDIO_BUFFER);
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = audio_rx.recv() => match frame {
                        Some(frame) => {
                            if let Err(e) = sink.send(WsMessage::Text(audio_message(&frame))).await {
                                let _ = event_tx.send(TranscriptEvent::Error(e.to_string())).await;
                                break;
                            }
                        }
                        None => {
                            let terminate = serde_json::json!({ "terminate_session": true }).to_string();
                            let _ = sink.send(WsMessage::Text(terminate)).await;
                            let _ = sink.close().await;
                            break;
                        }
                    },
                    message = source.next() => match message {
                        Some(Ok(WsMessage::Text(raw))) => {
                            for event in parse_message(&raw) {
                                if event_tx.send(event).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "Transcription connection error");
                            let _ = event_tx.send(TranscriptEvent::Error(e.to_string())).await;
                            break;
                        }
                    },
                }
            }
            tracing::info!("Transcription connection closed");
        });

        Ok(TranscriptionStream::new(audio_tx, event_rx))
    }

    fn name(&self) -> &str {
        "realtime-ws"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_emits_endpoint_then_final() {
        let events = parse_message(r#"{"message_type":"FinalTranscript","text":"hello there"}"#);
        assert_eq!(
            events,
            vec![TranscriptEvent::Endpoint, TranscriptEvent::Final("hello there".into())]
        );
    }

    #[test]
    fn test_blank_text_ignored() {
        assert!(parse_message(r#"{"message_type":"PartialTranscript","text":"  "}"#).is_empty());
        assert!(parse_message(r#"{"message_type":"FinalTranscript","text":""}"#).is_empty());
    }

    #[test]
    fn test_partial_and_session_messages() {
        assert_eq!(
            parse_message(r#"{"message_type":"PartialTranscript","text":"hel"}"#),
            vec![TranscriptEvent::Partial("hel".into())]
        );
        assert!(parse_message(r#"{"message_type":"SessionBegins","session_id":"x"}"#).is_empty());
        assert!(parse_message("garbage").is_empty());
    }

    #[test]
    fn test_upstream_error_message() {
        assert_eq!(
            parse_message(r#"{"error":"Not authorized"}"#),
            vec![TranscriptEvent::Error("Not authorized".into())]
        );
    }

    #[test]
    fn test_audio_message_is_base64() {
        let msg = audio_message(&AudioFrame::new(vec![1, 2, 3]));
        assert_eq!(msg, r#"{"audio_data":"AQID"}"#);
    }

    #[tokio::test]
    async fn test_connect_without_key_fails() {
        let transcriber = RealtimeTranscriber::new(&TranscriptionProviderConfig::default(), 24_000);
        assert_eq!(
            transcriber.endpoint(),
            "wss://api.assemblyai.com/v2/realtime/ws?sample_rate=24000"
        );
        assert!(matches!(
            transcriber.connect().await,
            Err(UpstreamError::Transcription(_))
        ));
    }
}
