//! Persistence layer for the voice bridge
//!
//! Provides storage for:
//! - Session records and their message history
//! - The active assistant personality and its compiled system prompt
//! - Per-turn latency telemetry
//!
//! `InMemorySessionStore` keeps everything in process. `RestSessionStore`
//! mirrors writes to a PostgREST endpoint on top of it.

pub mod error;
pub mod memory;
pub mod personality;
pub mod rest;
pub mod sessions;

pub use error::PersistenceError;
pub use memory::InMemorySessionStore;
pub use personality::{compile_system_prompt, Personality, DEFAULT_SYSTEM_PROMPT};
pub use rest::RestSessionStore;
pub use sessions::{LatencyRecord, SessionRecord, SessionStore};

use std::sync::Arc;
use voice_bridge_config::StoreProviderConfig;

/// Pick the store implementation for the configured provider
pub fn init(config: &StoreProviderConfig, max_history: usize) -> Result<Arc<dyn SessionStore>, PersistenceError> {
    match config.url.as_deref() {
        Some(url) if !url.is_empty() => {
            tracing::info!(url = %url, "Using REST session store");
            Ok(Arc::new(RestSessionStore::new(config, max_history)?))
        }
        _ => {
            tracing::info!("No store url configured, using in-memory session store");
            Ok(Arc::new(InMemorySessionStore::new(max_history)))
        }
    }
}
