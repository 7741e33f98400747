//! Audio, turn pipeline and retrieval tunables

use serde::{Deserialize, Serialize};
use voice_bridge_core::{
    DEFAULT_ACTIVITY_THRESHOLD, DEFAULT_FRAME_MS, DEFAULT_MAX_HISTORY, DEFAULT_SAMPLE_RATE,
};

use crate::ConfigError;

/// PCM format and barge-in detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz, shared by client audio, STT and TTS
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Frame duration in milliseconds
    #[serde(default = "default_frame_ms")]
    pub frame_ms: u32,

    /// Mean absolute amplitude above which a frame counts as speech
    #[serde(default = "default_activity_threshold")]
    pub activity_threshold: f64,
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}
fn default_frame_ms() -> u32 {
    DEFAULT_FRAME_MS
}
fn default_activity_threshold() -> f64 {
    DEFAULT_ACTIVITY_THRESHOLD
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            frame_ms: default_frame_ms(),
            activity_threshold: default_activity_threshold(),
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::invalid("audio.sample_rate", "must be positive"));
        }
        if self.frame_ms == 0 {
            return Err(ConfigError::invalid("audio.frame_ms", "must be positive"));
        }
        // 24 kHz * 20 ms = 480 samples; 44.1 kHz * 15 ms is not whole
        if (self.sample_rate as u64 * self.frame_ms as u64) % 1000 != 0 {
            return Err(ConfigError::invalid(
                "audio.frame_ms",
                format!(
                    "{} ms at {} Hz is not a whole number of samples",
                    self.frame_ms, self.sample_rate
                ),
            ));
        }
        if self.activity_threshold < 0.0 {
            return Err(ConfigError::invalid("audio.activity_threshold", "must not be negative"));
        }
        Ok(())
    }
}

/// Turn orchestration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Tokens buffered before the first synthesis call of a turn
    #[serde(default = "default_token_batch_threshold")]
    pub token_batch_threshold: usize,

    /// History messages included in the prompt
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// History messages retained per session
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Context snippets requested per turn
    #[serde(default = "default_context_top_k")]
    pub context_top_k: usize,

    /// Turn latency above which a warning is logged
    #[serde(default = "default_latency_budget_ms")]
    pub latency_budget_ms: u64,

    /// Fallback system prompt when no personality is active
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_token_batch_threshold() -> usize {
    15
}
fn default_history_window() -> usize {
    10
}
fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY
}
fn default_context_top_k() -> usize {
    3
}
fn default_latency_budget_ms() -> u64 {
    220
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            token_batch_threshold: default_token_batch_threshold(),
            history_window: default_history_window(),
            max_history: default_max_history(),
            context_top_k: default_context_top_k(),
            latency_budget_ms: default_latency_budget_ms(),
            system_prompt: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_batch_threshold == 0 {
            return Err(ConfigError::invalid(
                "pipeline.token_batch_threshold",
                "must be at least 1",
            ));
        }
        if self.max_history == 0 {
            return Err(ConfigError::invalid("pipeline.max_history", "must be at least 1"));
        }
        if self.history_window > self.max_history {
            return Err(ConfigError::invalid(
                "pipeline.history_window",
                format!(
                    "window {} exceeds retained history {}",
                    self.history_window, self.max_history
                ),
            ));
        }
        Ok(())
    }
}

/// Retrieval cache and vector search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Enable context retrieval
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Freshness window of cached results
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// Maximum cached queries
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Query characters that make up the cache key
    #[serde(default = "default_query_prefix_chars")]
    pub query_prefix_chars: usize,

    /// Retrieved chunk ids remembered per session
    #[serde(default = "default_session_chunk_limit")]
    pub session_chunk_limit: usize,

    /// Minimum similarity for vector matches
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,

    /// Facts kept per snippet
    #[serde(default = "default_max_facts")]
    pub max_facts: usize,
}

fn default_true() -> bool {
    true
}
fn default_cache_ttl_ms() -> u64 {
    300_000
}
fn default_cache_capacity() -> usize {
    100
}
fn default_query_prefix_chars() -> usize {
    50
}
fn default_session_chunk_limit() -> usize {
    50
}
fn default_match_threshold() -> f32 {
    0.7
}
fn default_max_facts() -> usize {
    3
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_ttl_ms: default_cache_ttl_ms(),
            cache_capacity: default_cache_capacity(),
            query_prefix_chars: default_query_prefix_chars(),
            session_chunk_limit: default_session_chunk_limit(),
            match_threshold: default_match_threshold(),
            max_facts: default_max_facts(),
        }
    }
}

impl RagConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_capacity == 0 {
            return Err(ConfigError::invalid("rag.cache_capacity", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(ConfigError::invalid("rag.match_threshold", "must be within 0.0..=1.0"));
        }
        Ok(())
    }
}
