//! Error types for the node binary.
//!
//! [`NodeError`] is the top-level error type that wraps all possible
//! failure modes during startup and serving.

use crate::config::ConfigError;

/// Top-level error for the node binary.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// Connecting to or replaying the persistent log failed.
    #[error("log error: {source}")]
    Log {
        /// The underlying log error.
        #[from]
        source: converge_log::LogError,
    },

    /// Opening the sync service failed.
    #[error("sync error: {source}")]
    Sync {
        /// The underlying sync error.
        #[from]
        source: converge_sync::SyncError,
    },

    /// The HTTP server failed to bind or serve.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: converge_server::ServerError,
    },
}
