//! Health check endpoint

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// Service banner
pub async fn home() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "message": "Welcome to the pixel hub",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "message": "Server is running"
        })),
    )
}
