//! Error types for the sync layer.

use converge_engine::EngineError;
use converge_log::LogError;

/// Errors from a push, pull, or state request.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The request is malformed; nothing was touched.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The document engine rejected the call; nothing was applied.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Reading or writing the persistent log failed.
    #[error("Log error: {0}")]
    Log(#[from] LogError),
}

/// Errors from the HTTP sync client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request could not be sent or the response not decoded.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("Server returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Server-provided message.
        message: String,
    },

    /// Applying pulled events locally failed.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}
