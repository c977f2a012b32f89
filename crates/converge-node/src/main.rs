//! Converge node binary.
//!
//! Wires the persistent event log, the document engine, the push/pull
//! sync service and the ephemeral relay into one HTTP/WebSocket server.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `converge-config.yaml`
//! 3. Connect the storage backend
//! 4. Open the event log
//! 5. Create the document
//! 6. Replay the log into the document
//! 7. Create the relay room registry
//! 8. Start the server

mod config;
mod error;

use std::path::PathBuf;
use std::sync::Arc;

use converge_engine::Document;
use converge_log::{Backend, DragonflyBackend, EventLog, MemoryBackend};
use converge_relay::RoomRegistry;
use converge_server::AppState;
use converge_sync::SyncService;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{DEFAULT_CONFIG_PATH, NodeConfig, StorageBackend, StorageConfig};
use crate::error::NodeError;

/// Application entry point for a Converge node.
///
/// # Errors
///
/// Returns an error if any initialization step or the server fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("converge-node starting");

    // 2. Load configuration.
    let config = load_config()?;
    info!(
        peer_id = config.engine.peer_id,
        backend = ?config.storage.backend,
        namespace = config.storage.log.namespace,
        chunk_size = config.storage.log.chunk_size,
        "Configuration loaded"
    );

    // 3. Connect the storage backend.
    let backend = connect_backend(&config.storage).await?;
    info!(backend = ?backend, "Storage backend ready");

    // 4. Open the event log.
    let log = EventLog::new(backend, config.storage.log.clone()).map_err(NodeError::from)?;

    // 5. Create the document.
    let document = Document::with_config(config.engine.peer_id.clone(), &config.engine.document());

    // 6. Replay the log into the document.
    let service = SyncService::open(document, log)
        .await
        .map_err(NodeError::from)?;
    info!(
        records = service.log().local_version(),
        "Event log replayed"
    );

    // 7. Create the relay room registry.
    let rooms = RoomRegistry::new(config.relay.clone());
    info!(
        fanout = config.relay.fanout,
        default_topology = ?config.relay.default_topology,
        "Relay ready"
    );

    // 8. Start the server.
    let state = Arc::new(AppState::new(service, rooms));
    info!(
        host = config.server.host,
        port = config.server.port,
        "Starting server"
    );
    converge_server::start_server(&config.server, state)
        .await
        .map_err(NodeError::from)?;

    info!("converge-node stopped");
    Ok(())
}

/// Load configuration from `CONVERGE_CONFIG` or the default path.
///
/// Falls back to defaults when the file does not exist.
fn load_config() -> Result<NodeConfig, NodeError> {
    let path = std::env::var("CONVERGE_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    Ok(NodeConfig::load(&path)?)
}

async fn connect_backend(storage: &StorageConfig) -> Result<Backend, NodeError> {
    match storage.backend {
        StorageBackend::Memory => Ok(Backend::Memory(MemoryBackend::with_limits(
            storage.limits(),
        ))),
        StorageBackend::Dragonfly => {
            info!(url = storage.dragonfly_url, "Connecting to Dragonfly");
            let backend = DragonflyBackend::connect(&storage.dragonfly_url).await?;
            Ok(Backend::Dragonfly(backend))
        }
    }
}
