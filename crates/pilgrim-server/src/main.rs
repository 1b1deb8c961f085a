//! # pilgrim-server
//!
//! HTTP server for the pilgrim geofencing service.
//!
//! This binary provides:
//! - REST API for zones, tracking, position input and visit history
//! - OpenAPI document at `/api/openapi.json`
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package pilgrim-server
//!
//! # Production
//! PILGRIM_ENV=production PILGRIM_CONFIG=/etc/pilgrim/pilgrim.toml ./pilgrim-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;

use anyhow::Context;
use pilgrim_core::PilgrimConfig;
use pilgrim_server::{api, logging, state::AppState};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(logging::is_production())?;

    info!("Starting pilgrim-server");

    let config = PilgrimConfig::load(None).context("Failed to load configuration")?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server.host or server.port")?;

    let state = AppState::new(config).context("Failed to initialise application state")?;
    info!(
        zones = state.tracker.zone_count(),
        visits = state.recorder.len(),
        "Application state ready"
    );

    let app = api::create_router(state.shared())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("pilgrim-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
