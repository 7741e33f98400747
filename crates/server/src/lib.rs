//! Voice Bridge Server
//!
//! Serves the client WebSocket plus health, readiness and metrics endpoints.

pub mod http;
pub mod metrics;
pub mod session;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use metrics::init_metrics;
pub use session::{SessionInfo, SessionRegistry};
pub use state::AppState;

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Session limit reached")]
    AtCapacity,

    #[error("Session error: {0}")]
    Session(String),

    #[error("Startup error: {0}")]
    Startup(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::AtCapacity => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Session(_) => axum::http::StatusCode::CONFLICT,
            ServerError::Startup(_) | ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<voice_bridge_config::ConfigError> for ServerError {
    fn from(err: voice_bridge_config::ConfigError) -> Self {
        ServerError::Startup(err.to_string())
    }
}

impl From<voice_bridge_llm::LlmError> for ServerError {
    fn from(err: voice_bridge_llm::LlmError) -> Self {
        ServerError::Startup(err.to_string())
    }
}

impl From<voice_bridge_rag::RagError> for ServerError {
    fn from(err: voice_bridge_rag::RagError) -> Self {
        ServerError::Startup(err.to_string())
    }
}

impl From<voice_bridge_persistence::PersistenceError> for ServerError {
    fn from(err: voice_bridge_persistence::PersistenceError) -> Self {
        ServerError::Startup(err.to_string())
    }
}

impl From<voice_bridge_pipeline::PipelineError> for ServerError {
    fn from(err: voice_bridge_pipeline::PipelineError) -> Self {
        ServerError::Startup(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_status_codes() {
        assert_eq!(StatusCode::from(ServerError::AtCapacity), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            StatusCode::from(ServerError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
