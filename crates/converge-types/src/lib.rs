//! Shared wire and data model types for the Converge sync layer.
//!
//! This crate is the single source of truth for every type exchanged
//! between replicas, the sync server, the persistent event log, and live
//! observers. Types flow downstream to `TypeScript` via `ts-rs` for browser
//! clients.
//!
//! # Modules
//!
//! - [`value`] -- Cell scalars and column/value pairs
//! - [`ids`] -- Event identity and version vectors
//! - [`ops`] -- Row mutations and their materialized merge effects
//! - [`event`] -- Causal events, run compaction, sync state
//! - [`ephemeral`] -- Last-writer-wins ephemeral entries

pub mod ephemeral;
pub mod event;
pub mod ids;
pub mod ops;
pub mod value;

// Re-export all public types at crate root for convenience.
pub use ephemeral::{
    EphemeralEntry, EphemeralRemoteEntry, NsEntries, flatten_entries, nest_entries,
};
pub use event::{Event, EventRun, RunError, SyncState, compact_events};
pub use ids::{EventId, PeerVersion, VersionVector};
pub use ops::{MergeOp, RowOp};
pub use value::{KeyValue, Value};
