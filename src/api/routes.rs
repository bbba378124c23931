//! API route definitions

use axum::routing::get;
use axum::Router;

use super::handlers;
use super::server::AppState;
use super::websocket;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::health::home))
        .route("/health", get(handlers::health::health_check))
        // Hub endpoints
        .route("/ws", get(websocket::canvas::canvas_ws))
        .route("/ws/stats", get(websocket::canvas::stats))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::HubConfig;
    use crate::hub::{Canvas, Hub};

    async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn state(hub: crate::hub::HubHandle) -> AppState {
        AppState {
            hub,
            hub_config: HubConfig::default(),
            started_at: Instant::now(),
            sessions: tokio_util::task::TaskTracker::new(),
        }
    }

    #[tokio::test]
    async fn test_health_and_home() {
        let (_hub, handle) = Hub::new(&HubConfig::default(), Arc::new(Canvas::default()));
        let router = create_router(state(handle));

        let (status, body) = get_json(router.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = get_json(router, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_stats_reports_active_hub() {
        let (_hub, handle) = Hub::new(&HubConfig::default(), Arc::new(Canvas::default()));
        let router = create_router(state(handle));

        let (status, body) = get_json(router, "/ws/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connected_clients"], 0);
        assert_eq!(body["status"], "active");
    }

    #[tokio::test]
    async fn test_stats_reports_stopped_hub() {
        let (hub, handle) = Hub::new(&HubConfig::default(), Arc::new(Canvas::default()));
        drop(hub);
        let router = create_router(state(handle));

        let (_, body) = get_json(router, "/ws/stats").await;
        assert_eq!(body["status"], "stopped");
    }

    #[tokio::test]
    async fn test_plain_get_on_ws_is_rejected_with_json_error() {
        let (_hub, handle) = Hub::new(&HubConfig::default(), Arc::new(Canvas::default()));
        let router = create_router(state(handle.clone()));

        let (status, body) = get_json(router, "/ws").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("WebSocket upgrade failed"));
        assert_eq!(handle.client_count(), 0);
    }
}
