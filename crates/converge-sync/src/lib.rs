//! Version-vector push/pull sync for the Converge sync layer.
//!
//! Two replicas converge by exchanging only the runs the other side lacks:
//!
//! ```text
//! Replica                                  Server (SyncService)
//!    |-- push {events} ---------------------->| merge_remote, append to log
//!    |<------------------ {ok, merge_ops} ----|
//!    |-- pull {known_peers} ----------------->| get_pending(known_peers)
//!    |<------------ {events, server_frontier} |
//! ```
//!
//! # Modules
//!
//! - [`protocol`] -- Request and response bodies
//! - [`service`] -- Server-side sequential actor over engine + log
//! - [`replica`] -- Client-side outbox and pull application
//! - [`client`] -- HTTP client (`reqwest`)
//! - [`error`] -- Shared error types

pub mod client;
pub mod error;
pub mod protocol;
pub mod replica;
pub mod service;

// Re-export primary types for convenience.
pub use client::{SyncClient, SyncReport};
pub use error::{ClientError, SyncError};
pub use protocol::{PullRequest, PullResponse, PushRequest, PushResponse};
pub use replica::{PullOutcome, Replica};
pub use service::SyncService;
