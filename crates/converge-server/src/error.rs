//! Error types for the HTTP layer.
//!
//! [`ApiError`] maps every failure of a handler onto an HTTP status and a
//! `{"error": ..., "status": ...}` JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use converge_relay::RelayError;
use converge_sync::SyncError;

/// Errors that can occur while serving a request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request body or query is malformed.
    #[error("{0}")]
    Validation(String),

    /// No route or resource matches the request.
    #[error("not found: {0}")]
    NotFound(String),

    /// Push, pull or state failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The relay room could not be joined.
    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) | Self::Sync(SyncError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Sync(SyncError::Engine(_) | SyncError::Log(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Relay(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        if status.is_server_error() {
            tracing::warn!(error = %self, status = status.as_u16(), "Request failed");
        }

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
