//! WebSocket Handler
//!
//! One socket carries one session. Binary frames are PCM audio, text frames
//! are JSON control messages. A writer task serializes everything the session
//! emits; the session itself runs on its own task.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use voice_bridge_pipeline::{ClientInput, Outbound, PipelineOrchestrator, ServerEvent};

use crate::metrics;
use crate::state::AppState;
use crate::ServerError;

const OUTBOUND_BUFFER: usize = 256;
const INBOUND_BUFFER: usize = 64;

/// Upgrade handler; refuses with 503 when the server is full
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Result<Response, StatusCode> {
    if !state.sessions.has_capacity() {
        tracing::warn!(
            active = state.sessions.count(),
            max = state.sessions.max_sessions(),
            "Rejecting connection, session limit reached"
        );
        metrics::record_session_rejected();
        return Err(ServerError::AtCapacity.into());
    }

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state)))
}

fn encode(outbound: Outbound) -> Option<Message> {
    match outbound {
        Outbound::Audio(bytes) => Some(Message::Binary(bytes)),
        Outbound::Event(event) => match serde_json::to_string(&event) {
            Ok(json) => Some(Message::Text(json)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize server event");
                None
            }
        },
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(OUTBOUND_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(outbound) = out_rx.recv().await {
            let Some(message) = encode(outbound) else {
                continue;
            };
            if sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let reject_tx = out_tx.clone();
    let orchestrator =
        match PipelineOrchestrator::connect(state.capabilities.clone(), state.orchestrator_config(), out_tx).await {
            Ok(orchestrator) => orchestrator,
            Err(e) => {
                tracing::error!(error = %e, "Failed to start session");
                let _ = reject_tx.send(ServerEvent::error("Session could not be started").into()).await;
                drop(reject_tx);
                let _ = writer.await;
                return;
            }
        };

    let session_id = orchestrator.session_id().to_string();
    if let Err(e) = state.sessions.register(&session_id, orchestrator.phase_watch()) {
        tracing::warn!(session_id = %session_id, error = %e, "Session refused after upgrade");
        let _ = reject_tx.send(ServerEvent::error("Server is at capacity").into()).await;
        drop(reject_tx);
        orchestrator.teardown().await;
        let _ = writer.await;
        return;
    }
    drop(reject_tx);
    metrics::record_session_started();

    let (in_tx, in_rx) = mpsc::channel::<ClientInput>(INBOUND_BUFFER);
    let mut pipeline = tokio::spawn(orchestrator.run(in_rx, state.sessions.shutdown_signal()));
    let mut pipeline_done = false;

    loop {
        let message = tokio::select! {
            message = stream.next() => message,
            result = &mut pipeline => {
                if let Err(e) = result {
                    tracing::error!(session_id = %session_id, error = %e, "Session task failed");
                }
                pipeline_done = true;
                break;
            }
        };

        let input = match message {
            Some(Ok(Message::Binary(bytes))) => ClientInput::Audio(bytes),
            Some(Ok(Message::Text(text))) => ClientInput::Text(text),
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::debug!(session_id = %session_id, error = %e, "WebSocket receive error");
                break;
            }
        };

        if in_tx.send(input).await.is_err() {
            break;
        }
    }

    drop(in_tx);
    if !pipeline_done {
        if let Err(e) = pipeline.await {
            tracing::error!(session_id = %session_id, error = %e, "Session task failed");
        }
    }
    let _ = writer.await;

    state.sessions.unregister(&session_id);
    metrics::record_active_sessions(state.sessions.count());
    tracing::info!(session_id = %session_id, "Client disconnected");
}
