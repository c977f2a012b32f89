//! Persistent event log for the Converge sync layer.
//!
//! Every authored [`EventRun`](converge_types::EventRun) is stored so a
//! cold-started replica can rebuild its document by replay. The log lives in
//! a key/value store that limits both the size of one value and the number of
//! keys one atomic commit may write.
//!
//! # Layout
//!
//! ```text
//! append(runs)
//!     |
//!     +-- chunk ----------> pieces of <= chunk_size ops, halved until they fit
//!     |
//!     +-- take lease -----> {ns}:meta:lease  (SET NX PX)
//!     |
//!     +-- catch up -------> replay [local_version, count)
//!     |
//!     +-- commit batches -> {ns}:event:0000000000 ...
//!                           {ns}:meta:count   (final batch only)
//!                           each batch fenced on lease owner + cursor
//! ```
//!
//! # Modules
//!
//! - [`log`] -- `EventLog`: replay, catch-up, append
//! - [`chunk`] -- Run splitting and size fitting
//! - [`backend`] -- `LogBackend` trait, storage limits, runtime `Backend`
//! - [`memory`] -- Shared in-memory backend with fault injection
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) backend
//! - [`keys`] -- Key layout
//! - [`error`] -- Shared error types

pub mod backend;
pub mod chunk;
pub mod dragonfly;
pub mod error;
pub mod keys;
pub mod log;
pub mod memory;

// Re-export primary types for convenience.
pub use backend::{Backend, CommitFence, LogBackend, StorageLimits};
pub use dragonfly::DragonflyBackend;
pub use error::LogError;
pub use keys::LogKeys;
pub use log::{AppendReceipt, EventLog, LogConfig};
pub use memory::MemoryBackend;
