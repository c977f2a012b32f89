//! Error types for the persistent event log.
//!
//! All errors are propagated via [`LogError`], which wraps the backend,
//! serialization, and engine errors with the index or key that failed.

use converge_engine::EngineError;

/// Errors that can occur while reading or writing the event log.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A record could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Replaying a record into the document failed.
    #[error("Engine error while replaying: {0}")]
    Engine(#[from] EngineError),

    /// The cursor points past a record that does not exist.
    #[error("Missing log record at index {index}")]
    MissingRecord {
        /// Index of the missing record.
        index: u64,
    },

    /// The count cursor holds something other than an unsigned integer.
    #[error("Corrupt count cursor: {0}")]
    CorruptCursor(String),

    /// A commit carried more writes than one atomic batch allows.
    #[error("Batch of {size} writes exceeds the limit of {max}")]
    BatchTooLarge {
        /// Writes in the rejected batch.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// A single op serializes larger than the value size limit.
    #[error("Record of {size} bytes exceeds the limit of {max}")]
    ValueTooLarge {
        /// Serialized size.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// Another writer held the append lease for every attempt.
    #[error("Append lease unavailable after {attempts} attempts")]
    LeaseUnavailable {
        /// Attempts made.
        attempts: u32,
    },

    /// The lease expired or passed to another writer before a commit.
    #[error("Append lease lost before commit")]
    LeaseLost,

    /// Another writer moved the count cursor before a commit.
    #[error("Count cursor moved away from {expected} before commit")]
    CursorMoved {
        /// Cursor value the writer caught up to.
        expected: u64,
    },

    /// The record index space is exhausted.
    #[error("Log index overflow")]
    IndexOverflow,

    /// A commit failed on purpose (test fault injection).
    #[error("Injected commit failure")]
    InjectedFault,

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
