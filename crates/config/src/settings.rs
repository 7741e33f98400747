//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{AudioConfig, ConfigError, PipelineConfig, ProvidersConfig, RagConfig};

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Load from `config/` files and `VOICE_BRIDGE__*` environment variables
    pub fn load(env: Option<&str>) -> Result<Self, ConfigError> {
        load_settings(env)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.audio.validate()?;
        self.pipeline.validate()?;
        self.rag.validate()?;

        let missing: Vec<&str> = [
            ("providers.transcription.api_key", &self.providers.transcription.api_key),
            ("providers.generation.api_key", &self.providers.generation.api_key),
            ("providers.synthesis.api_key", &self.providers.synthesis.api_key),
        ]
        .into_iter()
        .filter(|(_, key)| key.as_deref().map_or(true, str::is_empty))
        .map(|(field, _)| field)
        .collect();

        // Missing credentials surface as upstream errors per turn, not at start-up
        if !missing.is_empty() {
            tracing::warn!("Provider credentials not configured: {}", missing.join(", "));
        }
        if self.providers.synthesis.voice_id.is_empty() {
            tracing::warn!("providers.synthesis.voice_id is not set");
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// WebSocket upgrade path
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Maximum concurrent sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// CORS allowed origins; empty allows any
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3001
}
fn default_ws_path() -> String {
    "/webrtc".to_string()
}
fn default_max_sessions() -> usize {
    100
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            max_sessions: default_max_sessions(),
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.ws_path.starts_with('/') {
            return Err(ConfigError::invalid("server.ws_path", "must start with '/'"));
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::invalid("server.max_sessions", "must be at least 1"));
        }
        Ok(())
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Install the Prometheus recorder and serve `/metrics`
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "voice_bridge=info,tower_http=debug".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (`VOICE_BRIDGE__` prefix)
/// 2. `config/{env}` (if env specified)
/// 3. `config/default`
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder().add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("VOICE_BRIDGE")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.validate()?;

    Ok(settings)
}
