//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;
use std::time::Duration;

use voice_bridge_config::Settings;
use voice_bridge_core::ContextRetrieval;
use voice_bridge_llm::OpenAiGenerator;
use voice_bridge_pipeline::{Capabilities, HttpSynthesizer, OrchestratorConfig, RealtimeTranscriber};
use voice_bridge_rag::{CachedRetriever, HttpRetrievalService, NoContext};

use crate::session::SessionRegistry;
use crate::ServerError;

/// Time sessions get to finish after shutdown is signalled
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub capabilities: Capabilities,
    pub sessions: Arc<SessionRegistry>,
    orchestrator: Arc<OrchestratorConfig>,
    retrieval_cache: Option<Arc<CachedRetriever<HttpRetrievalService>>>,
}

impl AppState {
    /// State around caller-provided capabilities
    pub fn new(config: Settings, capabilities: Capabilities) -> Self {
        Self {
            orchestrator: Arc::new(OrchestratorConfig::from(&config)),
            sessions: Arc::new(SessionRegistry::new(config.server.max_sessions)),
            config: Arc::new(config),
            capabilities,
            retrieval_cache: None,
        }
    }

    /// Wire the configured providers
    pub fn from_settings(config: Settings) -> Result<Self, ServerError> {
        let providers = &config.providers;
        let sample_rate = config.audio.sample_rate;

        let transcription = Arc::new(RealtimeTranscriber::new(&providers.transcription, sample_rate));
        let generation = Arc::new(OpenAiGenerator::new(&providers.generation)?);
        let synthesis = Arc::new(HttpSynthesizer::new(&providers.synthesis, sample_rate)?);
        let store = voice_bridge_persistence::init(&providers.store, config.pipeline.max_history)?;

        let (retrieval, retrieval_cache): (Arc<dyn ContextRetrieval>, _) = if config.rag.enabled {
            let service = HttpRetrievalService::new(&providers.generation, &providers.store, &config.rag)?;
            let cached = Arc::new(CachedRetriever::new(service, &config.rag));
            (cached.clone() as Arc<dyn ContextRetrieval>, Some(cached))
        } else {
            tracing::info!("Context retrieval disabled");
            (Arc::new(NoContext) as Arc<dyn ContextRetrieval>, None)
        };

        let capabilities = Capabilities {
            transcription,
            generation,
            synthesis,
            retrieval,
            store,
        };

        let mut state = Self::new(config, capabilities);
        state.retrieval_cache = retrieval_cache;
        Ok(state)
    }

    /// Per-session pipeline settings
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        self.orchestrator.as_ref().clone()
    }

    /// Stop every session, wait for them to tear down, then drop caches
    pub async fn shutdown(&self) {
        self.sessions.shutdown_all();

        let remaining = self.sessions.drain(SHUTDOWN_GRACE).await;
        if remaining > 0 {
            tracing::warn!(remaining, "Sessions still open after shutdown grace period");
        }

        if let Some(cache) = &self.retrieval_cache {
            cache.clear_cache();
        }
        tracing::info!("Application state shut down");
    }
}
