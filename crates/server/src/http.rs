//! HTTP Endpoints

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::websocket::ws_handler;

/// Service name reported by `/health`
pub const SERVICE_NAME: &str = "edge-bridge";

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let ws_path = state.config.server.ws_path.clone();
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/sessions", get(list_sessions))
        .route("/metrics", get(metrics_handler))
        .route(&ws_path, get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// 503 once shutdown has begun
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.sessions.count();
    let max_sessions = state.sessions.max_sessions();

    if state.sessions.is_shutting_down() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "shutting_down", "sessions": sessions })),
        );
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ready",
            "sessions": sessions,
            "max_sessions": max_sessions,
            "at_capacity": sessions >= max_sessions,
        })),
    )
}

async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.sessions.list();
    Json(serde_json::json!({
        "count": sessions.len(),
        "sessions": sessions,
    }))
}
