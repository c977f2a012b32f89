//! HTTP server lifecycle management.
//!
//! [`start_server`] binds the configured address; [`serve`] runs the
//! router on an already bound listener (tests bind port 0). Both stop on
//! `Ctrl-C` after in-flight requests finish.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::router::build_router;
use crate::state::AppState;

/// Listen address of the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// The host address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// The TCP port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 8080,
        }
    }
}

/// Bind `config.host:config.port` and serve until `Ctrl-C`.
///
/// # Errors
///
/// Returns [`ServerError::Address`] if the host and port do not form a
/// socket address, [`ServerError::Bind`] if the port cannot be bound, or
/// [`ServerError::Serve`] if the accept loop fails.
pub async fn start_server(config: &ServerConfig, state: Arc<AppState>) -> Result<(), ServerError> {
    let raw = format!("{}:{}", config.host, config.port);
    let addr: SocketAddr = raw
        .parse()
        .map_err(|source| ServerError::Address { addr: raw, source })?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    serve(listener, state).await
}

/// Serve the router on `listener` until `Ctrl-C`, then drain open
/// requests and return.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<(), ServerError> {
    let addr = listener.local_addr().map_err(ServerError::Serve)?;
    info!(%addr, "Converge server listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)?;

    info!(%addr, "Converge server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl-C handler unavailable; serving until killed");
        std::future::pending::<()>().await;
    }
}

/// Failures of [`start_server`] and [`serve`].
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// `host:port` is not a socket address.
    #[error("invalid listen address {addr:?}: {source}")]
    Address {
        /// The rejected `host:port`.
        addr: String,
        /// The parse error.
        source: std::net::AddrParseError,
    },

    /// The listen port could not be bound.
    #[error("bind failed on {addr}: {source}")]
    Bind {
        /// The address that was tried.
        addr: SocketAddr,
        /// The I/O error.
        source: std::io::Error,
    },

    /// The accept loop failed.
    #[error("serve error: {0}")]
    Serve(std::io::Error),
}
