//! Sync API and relay server for Converge.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **Sync endpoints** (`/api/push`, `/api/pull`, `/api/state`) backed by
//!   one [`SyncService`](converge_sync::SyncService) and its persistent log
//! - **Relay socket** (`/ws`) joining live observers to star or gossip
//!   rooms from [`converge_relay`]
//! - **Health probe** (`/health`)
//!
//! Errors are returned as `{"error": ..., "status": ...}` JSON.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, serve, start_server};
pub use state::{AppState, NodeService};
