//! REST endpoint handlers for the sync API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/push` | Merge and persist pushed runs |
//! | `POST` | `/api/pull` | Runs the requester is missing |
//! | `GET` | `/api/state` | Frontier and version vector |
//! | `GET` | `/health` | Liveness and room count |
//!
//! Bodies are read as raw bytes and parsed here so that malformed JSON is
//! reported in the same `{error, status}` shape as every other failure.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::Uri;
use converge_sync::{PullRequest, PullResponse, PushRequest, PushResponse};
use converge_types::SyncState;

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// POST /api/push
// ---------------------------------------------------------------------------

/// Merge pushed runs into the document and append the new ones to the log.
pub async fn push(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<PushResponse>, ApiError> {
    let json: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::Validation(format!("invalid JSON body: {e}")))?;
    let request = PushRequest::from_json(&json)?;
    let response = state.sync.lock().await.push(&request).await?;
    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// POST /api/pull
// ---------------------------------------------------------------------------

/// Return the runs beyond the requester's `known_peers`.
///
/// An empty body is treated as `{"known_peers": {}}`.
pub async fn pull(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<PullResponse>, ApiError> {
    let request = if body.is_empty() {
        PullRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::Validation(format!("invalid pull request: {e}")))?
    };
    let response = state.sync.lock().await.pull(&request).await?;
    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// GET /api/state
// ---------------------------------------------------------------------------

/// Return the document's frontier and version vector.
pub async fn sync_state(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SyncState>, ApiError> {
    let current = state.sync.lock().await.state().await?;
    Ok(Json(current))
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// Liveness probe.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "rooms": state.rooms.room_count().await,
        "started_at": state.started_at.to_rfc3339(),
    }))
}

/// Fallback for unknown routes.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_owned())
}
