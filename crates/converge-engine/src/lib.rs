//! Document engine for the Converge sync layer.
//!
//! The sync, log, and relay crates only talk to a document through the
//! [`DocumentEngine`] trait. [`Document`] is the reference implementation: a
//! replicated row store whose conflict resolution is a pluggable
//! [`ConflictPolicy`], with a bounded buffer for runs that arrive ahead of
//! their causal dependencies.
//!
//! # Modules
//!
//! - [`document`] -- The reference engine
//! - [`policy`] -- Conflict policies over `(lamport, peer)` stamps
//! - [`table`] -- Materialized rows and merge-op generation
//! - [`gap`] -- Bounded buffer for out-of-order runs
//! - [`ephemeral`] -- Last-writer-wins ephemeral registers

pub mod document;
pub mod ephemeral;
pub mod gap;
pub mod policy;
pub mod table;

use converge_types::{
    EphemeralEntry, EphemeralRemoteEntry, Event, EventRun, KeyValue, MergeOp, RunError,
    SyncState, Value, VersionVector,
};

pub use document::{Document, DocumentConfig};
pub use ephemeral::EphemeralStore;
pub use gap::GapBuffer;
pub use policy::{ConflictPolicy, LamportThenPeer, Stamp};

/// Failures of a document engine call. A failed call has no effect.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A remote run is structurally invalid.
    #[error("invalid event run: {0}")]
    InvalidRun(#[from] RunError),

    /// The local peer has authored `u32::MAX` events.
    #[error("counter space exhausted for peer {peer}")]
    CounterOverflow {
        /// Local peer id.
        peer: String,
    },

    /// The lamport clock cannot advance further.
    #[error("lamport clock exhausted")]
    LamportOverflow,
}

/// Operations a replica performs on its document.
///
/// Implementations must make `merge_remote` idempotent per `(peer, counter)`
/// and commutative across peers.
pub trait DocumentEngine: Send {
    /// The peer that authors local events.
    fn peer_id(&self) -> &str;

    /// Author an insert of `row_id` with initial `values`.
    fn insert(
        &mut self,
        tbl: &str,
        row_id: &str,
        values: Vec<KeyValue>,
    ) -> Result<Event, EngineError>;

    /// Author a single-cell update.
    fn update(
        &mut self,
        tbl: &str,
        row_id: &str,
        col: &str,
        val: Value,
    ) -> Result<Event, EngineError>;

    /// Author a row delete.
    fn delete(&mut self, tbl: &str, row_id: &str) -> Result<Event, EngineError>;

    /// Apply remote runs and return the visible changes they caused.
    ///
    /// Every run is validated before any is applied.
    fn merge_remote(&mut self, runs: &[EventRun]) -> Result<Vec<MergeOp>, EngineError>;

    /// Whether an identical run is waiting on missing dependencies.
    fn is_held(&self, run: &EventRun) -> bool;

    /// Every applied event not implied by `known`, compacted into runs.
    fn get_pending(&self, known: &VersionVector) -> Vec<EventRun>;

    /// Applied heads and version vector.
    fn sync_state(&self) -> SyncState;

    /// Highest contiguous counter applied per peer.
    fn version_vector(&self) -> VersionVector;

    /// Write a local ephemeral value.
    fn ephemeral_set(
        &mut self,
        ns: &str,
        key: &str,
        val: Value,
        timestamp: u64,
    ) -> EphemeralRemoteEntry;

    /// Read one ephemeral entry.
    fn ephemeral_get(&self, ns: &str, key: &str) -> Option<EphemeralEntry>;

    /// Read every entry of a namespace.
    fn ephemeral_get_all(&self, ns: &str) -> Vec<EphemeralEntry>;

    /// Merge remote ephemeral entries, returning the ones that changed state.
    fn ephemeral_merge(
        &mut self,
        entries: Vec<EphemeralRemoteEntry>,
    ) -> Vec<EphemeralRemoteEntry>;
}
