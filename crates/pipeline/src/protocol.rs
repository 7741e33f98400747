//! Client wire protocol
//!
//! Text frames carry JSON tagged by `type`; binary frames carry raw PCM.

use serde::{Deserialize, Serialize};

/// Greeting sent with `connected`
pub const CONNECTED_MESSAGE: &str = "Edge bridge ready";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusMessage {
    Listening,
    Thinking,
    Speaking,
    Ready,
}

/// Server -> client JSON events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected {
        #[serde(rename = "sessionId")]
        session_id: String,
        message: String,
    },
    TranscriptPartial {
        text: String,
    },
    TranscriptFinal {
        text: String,
    },
    Status {
        message: StatusMessage,
    },
    ResponseToken {
        text: String,
    },
    AudioInterrupted,
    AudioEnd,
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn status(message: StatusMessage) -> Self {
        ServerEvent::Status { message }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error { message: message.into() }
    }
}

/// Client -> server control messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientControl {
    StartRecording,
    StopRecording,
}

/// Anything the transport hands to a session
#[derive(Debug, Clone, PartialEq)]
pub enum ClientInput {
    Audio(Vec<u8>),
    Text(String),
}

/// Anything a session hands back to the transport
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Event(ServerEvent),
    Audio(Vec<u8>),
}

impl From<ServerEvent> for Outbound {
    fn from(event: ServerEvent) -> Self {
        Outbound::Event(event)
    }
}
