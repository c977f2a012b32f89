//! Axum router construction for the sync and relay server.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for browser replicas and observers.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router.
///
/// The router includes:
/// - `POST /api/push` -- merge and persist runs
/// - `POST /api/pull` -- runs the requester is missing
/// - `GET /api/state` -- frontier and version vector
/// - `GET /ws` -- relay room socket
/// - `GET /health` -- liveness
///
/// Any other path answers 404 with a JSON error body.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Sync API
        .route("/api/push", post(handlers::push))
        .route("/api/pull", post(handlers::pull))
        .route("/api/state", get(handlers::sync_state))
        // Relay
        .route("/ws", get(ws::ws_room))
        // Liveness
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
