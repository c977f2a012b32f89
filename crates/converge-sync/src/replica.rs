//! Client side of the sync protocol.

use converge_engine::{DocumentEngine, EngineError};
use converge_types::{
    Event, EventId, KeyValue, MergeOp, Value, VersionVector, compact_events,
};

use crate::protocol::{PullRequest, PullResponse, PushRequest};

/// What applying a pull changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullOutcome {
    /// Visible changes from the pulled runs.
    pub merge_ops: Vec<MergeOp>,
    /// Server heads the replica still does not cover after merging.
    pub diverged: Vec<EventId>,
}

/// A document plus the locally authored events not yet acknowledged by the
/// server.
#[derive(Debug)]
pub struct Replica<E: DocumentEngine> {
    engine: E,
    outbox: Vec<Event>,
}

impl<E: DocumentEngine> Replica<E> {
    /// Wrap an engine with an empty outbox.
    pub const fn new(engine: E) -> Self {
        Self {
            engine,
            outbox: Vec::new(),
        }
    }

    /// The document.
    pub const fn engine(&self) -> &E {
        &self.engine
    }

    /// Events waiting for acknowledgement.
    pub fn outbox(&self) -> &[Event] {
        &self.outbox
    }

    /// Author an insert and queue it.
    pub fn insert(
        &mut self,
        tbl: &str,
        row_id: &str,
        values: Vec<KeyValue>,
    ) -> Result<Event, EngineError> {
        let event = self.engine.insert(tbl, row_id, values)?;
        self.outbox.push(event.clone());
        Ok(event)
    }

    /// Author an update and queue it.
    pub fn update(
        &mut self,
        tbl: &str,
        row_id: &str,
        col: &str,
        val: Value,
    ) -> Result<Event, EngineError> {
        let event = self.engine.update(tbl, row_id, col, val)?;
        self.outbox.push(event.clone());
        Ok(event)
    }

    /// Author a delete and queue it.
    pub fn delete(&mut self, tbl: &str, row_id: &str) -> Result<Event, EngineError> {
        let event = self.engine.delete(tbl, row_id)?;
        self.outbox.push(event.clone());
        Ok(event)
    }

    /// The queued events as a compacted push body.
    pub fn push_request(&self) -> PushRequest {
        PushRequest {
            events: compact_events(&self.outbox),
        }
    }

    /// Drop every queued event covered by an acknowledged push.
    pub fn ack_push(&mut self, sent: &PushRequest) {
        let acked: VersionVector = sent.events.iter().filter_map(|run| run.last_id()).collect();
        self.outbox.retain(|event| !acked.contains(&event.id));
    }

    /// A pull body describing everything the replica has applied.
    pub fn pull_request(&self) -> PullRequest {
        PullRequest {
            known_peers: self.engine.version_vector(),
        }
    }

    /// Merge pulled runs and report server heads still not covered.
    ///
    /// A non-empty `diverged` means some pulled runs wait on dependencies
    /// the replica has not seen; a later pull fills the gap.
    pub fn apply_pull(&mut self, response: &PullResponse) -> Result<PullOutcome, EngineError> {
        let merge_ops = self.engine.merge_remote(&response.events)?;
        let known = self.engine.version_vector();
        let diverged = response
            .server_frontier
            .iter()
            .filter(|head| !known.contains(head))
            .cloned()
            .collect();
        Ok(PullOutcome {
            merge_ops,
            diverged,
        })
    }
}
