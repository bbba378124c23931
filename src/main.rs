//! Pixelhub Server - Entry Point
//!
//! Starts the hub coordinator and the HTTP/WebSocket server with graceful
//! shutdown support.

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pixelhub::api::{drain_sessions, ApiServer};
use pixelhub::config::{Config, LogConfig};
use pixelhub::{Canvas, Hub};

#[tokio::main]
async fn main() -> pixelhub::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log);
    info!("Starting Pixelhub Server");

    // Start the hub coordinator
    let canvas = Arc::new(Canvas::default());
    info!("Canvas ready ({}x{})", canvas.width(), canvas.height());
    let (hub, hub_handle) = Hub::new(&config.hub, canvas);
    let hub_task = tokio::spawn(hub.run());

    // Create API server
    let api_server = ApiServer::new(config.server.clone(), config.hub.clone(), hub_handle.clone());
    let sessions = api_server.sessions();

    let (shutdown_tx, api_shutdown) = watch::channel(false);
    let api_task = tokio::spawn(async move {
        if let Err(e) = api_server.run(api_shutdown).await {
            error!("API server error: {}", e);
        }
    });

    info!("Server started on {}", config.addr());

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    // Stop accepting requests, then close every client connection
    let _ = shutdown_tx.send(true);
    if let Err(e) = hub_handle.shutdown().await {
        warn!("Hub shutdown request failed: {}", e);
    }

    if let Err(e) = hub_task.await {
        error!("Hub task failed: {}", e);
    }

    // Sessions outlive the server task; let them send their close frames
    if !drain_sessions(&sessions, config.hub.write_wait).await {
        warn!("Dropping client sessions that did not close in time");
    }

    if let Err(e) = api_task.await {
        error!("API server task failed: {}", e);
    }

    info!("Pixelhub Server stopped");
    Ok(())
}

/// Install the global tracing subscriber
fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("pixelhub={},tower_http=debug", log.level).into());
    let registry = tracing_subscriber::registry().with(filter);

    if log.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
