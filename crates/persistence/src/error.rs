//! Persistence error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

impl From<reqwest::Error> for PersistenceError {
    fn from(e: reqwest::Error) -> Self {
        PersistenceError::Connection(e.to_string())
    }
}

impl From<PersistenceError> for voice_bridge_core::Error {
    fn from(e: PersistenceError) -> Self {
        voice_bridge_core::Error::Persistence(e.to_string())
    }
}
