//! Context retrieval trait

use async_trait::async_trait;

use crate::context::ContextSnippet;

/// Context provider for prompt augmentation.
///
/// Failures degrade to an empty result; a turn always proceeds.
#[async_trait]
pub trait ContextRetrieval: Send + Sync {
    async fn fetch_context(&self, query: &str, session_id: &str, top_k: usize) -> Vec<ContextSnippet>;

    /// Forget per-session retrieval state
    fn clear_session(&self, session_id: &str);
}
