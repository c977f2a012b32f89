//! Shared application state for the sync and relay server.
//!
//! The document is served by a single [`SyncService`]; the mutex around it
//! serializes push, pull and state requests so the service acts as the one
//! sequential actor for that document. Relay rooms live in the
//! [`RoomRegistry`], each owned by its own task.

use chrono::{DateTime, Utc};
use converge_engine::Document;
use converge_log::Backend;
use converge_relay::RoomRegistry;
use converge_sync::SyncService;
use tokio::sync::Mutex;

/// The sync service as wired by the server: reference engine, runtime backend.
pub type NodeService = SyncService<Document, Backend>;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`](std::sync::Arc) and injected via Axum's `State`
/// extractor.
#[derive(Debug)]
pub struct AppState {
    /// The document and its log writer.
    pub sync: Mutex<NodeService>,
    /// Live relay rooms.
    pub rooms: RoomRegistry,
    /// When this process started serving.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create application state around an opened service.
    pub fn new(service: NodeService, rooms: RoomRegistry) -> Self {
        Self {
            sync: Mutex::new(service),
            rooms,
            started_at: Utc::now(),
        }
    }
}
