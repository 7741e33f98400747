//! Prometheus metrics endpoint and connection-level metrics

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

use crate::state::AppState;
use crate::ServerError;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder; later calls return the same handle
pub fn init_metrics() -> Result<PrometheusHandle, ServerError> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Startup(format!("metrics recorder: {}", e)))?;
    register_default_metrics();

    Ok(METRICS_HANDLE.get_or_init(|| handle).clone())
}

pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

fn register_default_metrics() {
    gauge!("voice_bridge_sessions_active").set(0.0);
    counter!("voice_bridge_sessions_started_total").absolute(0);
    counter!("voice_bridge_sessions_rejected_total").absolute(0);

    for kind in ["stt", "llm", "tts", "rag"] {
        counter!("voice_bridge_upstream_errors_total", "kind" => kind).absolute(0);
    }
}

pub fn record_session_started() {
    counter!("voice_bridge_sessions_started_total").increment(1);
}

/// Upgrade refused because the server is at capacity
pub fn record_session_rejected() {
    counter!("voice_bridge_sessions_rejected_total").increment(1);
}

pub fn record_active_sessions(count: usize) {
    gauge!("voice_bridge_sessions_active").set(count as f64);
}

/// Prometheus text exposition
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    record_active_sessions(state.sessions.count());

    match get_metrics_handle() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "Metrics not enabled".to_string(),
        ),
    }
}
