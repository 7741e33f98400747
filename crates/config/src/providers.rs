//! External capability provider settings
//!
//! Credentials are expected from the environment, e.g.
//! `VOICE_BRIDGE__PROVIDERS__GENERATION__API_KEY`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub transcription: TranscriptionProviderConfig,

    #[serde(default)]
    pub generation: GenerationProviderConfig,

    #[serde(default)]
    pub synthesis: SynthesisProviderConfig,

    /// Session, personality and telemetry store
    #[serde(default)]
    pub store: StoreProviderConfig,
}

/// Realtime speech recognition over websocket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionProviderConfig {
    #[serde(default = "default_transcription_url")]
    pub url: String,

    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_transcription_url() -> String {
    "wss://api.assemblyai.com/v2/realtime/ws".to_string()
}

impl Default for TranscriptionProviderConfig {
    fn default() -> Self {
        Self {
            url: default_transcription_url(),
            api_key: None,
        }
    }
}

/// OpenAI-compatible chat completion and embedding endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationProviderConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_max_tokens() -> u32 {
    200
}
fn default_temperature() -> f32 {
    0.3
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for GenerationProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            api_key: None,
            model: default_model(),
            embedding_model: default_embedding_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// HTTP byte-stream speech synthesis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisProviderConfig {
    #[serde(default = "default_synthesis_url")]
    pub url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_model_id")]
    pub model_id: String,

    #[serde(default)]
    pub voice_id: String,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_synthesis_url() -> String {
    "https://api.cartesia.ai/tts/bytes".to_string()
}
fn default_api_version() -> String {
    "2024-06-10".to_string()
}
fn default_model_id() -> String {
    "sonic-english".to_string()
}
fn default_language() -> String {
    "en".to_string()
}

impl Default for SynthesisProviderConfig {
    fn default() -> Self {
        Self {
            url: default_synthesis_url(),
            api_key: None,
            api_version: default_api_version(),
            model_id: default_model_id(),
            voice_id: String::new(),
            language: default_language(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// PostgREST-style store; unset url keeps everything in memory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreProviderConfig {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,
}
