//! Voice Bridge Server Entry Point

use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voice_bridge_config::{load_settings, Settings};
use voice_bridge_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Environment overlay, e.g. config/production.toml
    let env = std::env::var("VOICE_BRIDGE_ENV").ok();
    let config = load_settings(env.as_deref())?;

    init_tracing(&config);

    tracing::info!("Starting Voice Bridge Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(env = ?env, "Loaded configuration");

    if config.observability.metrics_enabled {
        init_metrics()?;
        tracing::info!("Initialized Prometheus metrics at /metrics");
    }

    let state = AppState::from_settings(config.clone())?;
    tracing::info!(
        max_sessions = config.server.max_sessions,
        ws_path = %config.server.ws_path,
        "Initialized application state"
    );

    let app = create_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    state.shutdown().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then tell live sessions to stop
async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    // Upgraded sockets are not tracked by the HTTP server
    state.sessions.shutdown_all();
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.observability.log_level.clone().into());

    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
}
