//! Configuration management for the voice bridge
//!
//! Supports loading configuration from:
//! - YAML/TOML files under `config/`
//! - Environment variables (`VOICE_BRIDGE__` prefix, `__` separator)

pub mod pipeline;
pub mod providers;
pub mod settings;

pub use pipeline::{AudioConfig, PipelineConfig, RagConfig};
pub use providers::{
    GenerationProviderConfig, ProvidersConfig, StoreProviderConfig, SynthesisProviderConfig,
    TranscriptionProviderConfig,
};
pub use settings::{load_settings, ObservabilityConfig, ServerConfig, Settings};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for voice_bridge_core::Error {
    fn from(err: ConfigError) -> Self {
        voice_bridge_core::Error::Config(err.to_string())
    }
}
