//! Attendance Feed - Binary Entry Point
//!
//! Serves the live feed to dashboards over WebSocket, optionally fed from an
//! SSE endpoint and/or the synthetic load generator.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use attendance_feed::api::{create_router, AppState};
use attendance_feed::utils::init_tracing;
use attendance_feed::{FeedConfig, FeedService, NAME, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = FeedConfig::from_env().context("invalid configuration")?;
    info!(name = NAME, version = VERSION, bind = %config.bind_addr, "starting");

    let feed = FeedService::new(config.clone());

    match config.endpoint.as_deref() {
        Some(endpoint) => {
            feed.connect(endpoint)
                .with_context(|| format!("failed to connect to {}", endpoint))?;
        }
        None => warn!(
            "{} not set, serving synthetic load only",
            FeedConfig::ENDPOINT_VAR
        ),
    }

    if config.autostart_load {
        feed.start_load(config.default_load_rate);
    }

    let state = Arc::new(AppState::new(feed.clone()));
    let app = create_router(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    feed.teardown();
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
