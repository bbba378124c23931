//! API server using Axum

use std::time::{Duration, Instant};

use axum::Router;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::config::{HubConfig, ServerConfig};
use crate::error::{HubError, Result};
use crate::hub::HubHandle;

use super::middleware::{cors_layer, RequestLogging};
use super::routes;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub hub_config: HubConfig,
    pub started_at: Instant,
    /// Live client sessions, waited on during shutdown
    pub sessions: TaskTracker,
}

/// API server
pub struct ApiServer {
    config: ServerConfig,
    state: AppState,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: ServerConfig, hub_config: HubConfig, hub: HubHandle) -> Self {
        let state = AppState {
            hub,
            hub_config,
            started_at: Instant::now(),
            sessions: TaskTracker::new(),
        };

        Self { config, state }
    }

    /// Tracker for the client sessions this server upgrades
    pub fn sessions(&self) -> TaskTracker {
        self.state.sessions.clone()
    }

    /// Build the router with all middleware applied
    pub fn build_router(&self) -> Router {
        let cors = cors_layer(&self.config.cors_origins);

        routes::create_router(self.state.clone())
            .layer(axum::middleware::from_fn(RequestLogging::log_request))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server until `shutdown` flips
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let router = self.build_router();

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("API server listening on {}", listener.local_addr()?);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| HubError::Internal(e.to_string()))?;

        info!("API server shut down");
        Ok(())
    }
}

/// Wait up to `grace` for every live session to finish
///
/// Call once the hub has stopped: each session then only has its close
/// frame left to write. Returns false if some were still running.
pub async fn drain_sessions(sessions: &TaskTracker, grace: Duration) -> bool {
    sessions.close();

    let live = sessions.len();
    if live > 0 {
        info!("Waiting for {} client sessions to close", live);
    }

    match timeout(grace, sessions.wait()).await {
        Ok(()) => true,
        Err(_) => {
            warn!(
                "{} client sessions still open after {:?}",
                sessions.len(),
                grace
            );
            false
        }
    }
}
