//! Canvas hub WebSocket endpoint
//!
//! Upgrades the connection and hands the socket to a hub session. Also
//! reports how many clients are connected.

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::api::server::AppState;
use crate::error::HubError;
use crate::hub::run_session;

/// WebSocket handler for the shared canvas
pub async fn canvas_ws(
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            warn!("WebSocket upgrade error: {}", rejection);
            return HubError::UpgradeFailed(rejection.body_text()).into_response();
        }
    };

    let hub = state.hub.clone();
    let config = state.hub_config.clone();
    let sessions = state.sessions.clone();

    ws.max_message_size(config.max_message_size)
        .on_upgrade(move |socket| sessions.track_future(run_session(socket, hub, config)))
}

/// Connected client count and hub status
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let status = if state.hub.is_running() {
        "active"
    } else {
        "stopped"
    };

    (
        StatusCode::OK,
        Json(json!({
            "connected_clients": state.hub.client_count(),
            "status": status,
            "uptime_seconds": state.started_at.elapsed().as_secs(),
        })),
    )
}
