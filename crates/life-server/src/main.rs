//! Server hosting one Game of Life world for rendering clients.

mod api;
mod telemetry;
mod ws;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use life_core::ServerConfig;
use life_world::SimulationEngine;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

const CONFIG_ENV: &str = "LIFE_SERVER_CONFIG";
const UPDATE_CHANNEL_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = load_config()?;

    // Initialize telemetry
    telemetry::init_telemetry(config.otel_endpoint.as_deref())?;

    info!("Starting life server on {}:{}", config.bind_address, config.port);

    // Initialize the world
    let engine = Arc::new(SimulationEngine::new(config.engine)?);
    engine.build(config.engine.rows, config.engine.cols, false)?;
    engine.randomize()?;

    let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
    ws::bridge_events(&engine, updates.clone(), config.stop_on_extinction);

    let state = api::AppState::new(engine, updates);
    if config.autostart {
        state.start_cycle(None)?;
    }

    // Start server
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Server listening on {}", addr);

    axum::serve(listener, app(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.shutdown().await;

    // Shutdown telemetry
    telemetry::shutdown_telemetry();

    Ok(())
}

fn app(state: api::AppState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/ws", get(ws::ws_handler))
        .route("/api/world", get(api::get_world))
        .route("/api/world/status", get(api::get_status))
        .route("/api/world/build", post(api::build_world))
        .route("/api/world/randomize", post(api::randomize_world))
        .route("/api/world/start", post(api::start_cycle))
        .route("/api/world/stop", post(api::stop_cycle))
        .route("/api/world/edits", post(api::apply_edits))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Defaults, overlaid by the JSON file named in `LIFE_SERVER_CONFIG` if set
fn load_config() -> Result<ServerConfig> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config file {}", path))?;
            ServerConfig::from_json(&json)
                .with_context(|| format!("invalid config file {}", path))
        }
        Err(_) => Ok(ServerConfig::default()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
