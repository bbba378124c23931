use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unified error type for the pixel hub
#[derive(Error, Debug)]
pub enum HubError {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Connection errors
    #[error("WebSocket upgrade failed: {0}")]
    UpgradeFailed(String),

    // Coordinator errors
    #[error("Hub is not running")]
    HubClosed,

    #[error("Hub intake is saturated")]
    Saturated,

    // Wire errors
    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for hub operations
pub type Result<T> = std::result::Result<T, HubError>;

impl HubError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            HubError::InvalidConfig(_) | HubError::UpgradeFailed(_) | HubError::Json(_) => {
                StatusCode::BAD_REQUEST
            }

            // 503 Service Unavailable
            HubError::HubClosed | HubError::Saturated => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            HubError::Io(_) | HubError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}
