//! Causal events and their run-compacted transport form.
//!
//! An [`Event`] is one authored [`RowOp`] with its identity, causal
//! dependencies, and lamport clock. Events of one peer travel and are stored
//! as an [`EventRun`]: op `i` of a run has counter `counter_start + i` and
//! lamport `lamport_start + i`. The run's `deps` apply to its first op only;
//! every later op depends on the op right before it.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{EventId, PeerVersion};
use crate::ops::RowOp;

/// Structural problems with an [`EventRun`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    /// A run must carry at least one op.
    #[error("event run from {peer} has no ops")]
    Empty {
        /// Authoring peer.
        peer: String,
    },

    /// Counters start at 1.
    #[error("event run from {peer} starts at counter 0")]
    ZeroCounter {
        /// Authoring peer.
        peer: String,
    },

    /// The run's counters or lamports would not fit in 32 bits.
    #[error("event run from {peer} overflows its counter or lamport range")]
    Overflow {
        /// Authoring peer.
        peer: String,
    },

    /// The peer id is empty.
    #[error("event run has an empty peer id")]
    EmptyPeer,
}

/// One authored, immutable row mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Event {
    /// Unique identity.
    pub id: EventId,
    /// Causal frontier known to the author at creation time.
    pub deps: Vec<EventId>,
    /// Lamport clock, greater than every dependency's.
    pub lamport: u32,
    /// The mutation.
    pub op: RowOp,
}

/// A contiguous run of one peer's events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EventRun {
    /// Authoring peer.
    pub peer: String,
    /// Counter of the first op.
    pub counter_start: u32,
    /// Lamport clock of the first op.
    pub lamport_start: u32,
    /// Causal dependencies of the first op.
    pub deps: Vec<EventId>,
    /// Ops in counter order.
    pub ops: Vec<RowOp>,
}

impl EventRun {
    /// Number of ops in the run.
    pub const fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the run has no ops (never valid on the wire).
    pub const fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Counter of the op at `offset`, if it fits in 32 bits.
    pub fn counter_at(&self, offset: usize) -> Option<u32> {
        u32::try_from(offset)
            .ok()
            .and_then(|o| self.counter_start.checked_add(o))
    }

    /// Lamport clock of the op at `offset`, if it fits in 32 bits.
    pub fn lamport_at(&self, offset: usize) -> Option<u32> {
        u32::try_from(offset)
            .ok()
            .and_then(|o| self.lamport_start.checked_add(o))
    }

    /// Counter of the last op.
    pub fn last_counter(&self) -> Option<u32> {
        self.ops
            .len()
            .checked_sub(1)
            .and_then(|last| self.counter_at(last))
    }

    /// Identity of the last op.
    pub fn last_id(&self) -> Option<EventId> {
        self.last_counter()
            .map(|counter| EventId::new(self.peer.clone(), counter))
    }

    /// Check the structural invariants of a run received from outside.
    pub fn validate(&self) -> Result<(), RunError> {
        if self.peer.is_empty() {
            return Err(RunError::EmptyPeer);
        }
        if self.ops.is_empty() {
            return Err(RunError::Empty {
                peer: self.peer.clone(),
            });
        }
        if self.counter_start == 0 {
            return Err(RunError::ZeroCounter {
                peer: self.peer.clone(),
            });
        }
        let last = self.ops.len().saturating_sub(1);
        if self.counter_at(last).is_none() || self.lamport_at(last).is_none() {
            return Err(RunError::Overflow {
                peer: self.peer.clone(),
            });
        }
        Ok(())
    }

    /// Dependencies of the op at `offset`.
    ///
    /// The first op carries the run's deps; every later op depends only on
    /// its predecessor in the run.
    pub fn deps_at(&self, offset: usize) -> Vec<EventId> {
        if offset == 0 {
            return self.deps.clone();
        }
        offset
            .checked_sub(1)
            .and_then(|prev| self.counter_at(prev))
            .map(|counter| vec![EventId::new(self.peer.clone(), counter)])
            .unwrap_or_default()
    }

    /// Expand the run into individual events.
    pub fn events(&self) -> Result<Vec<Event>, RunError> {
        self.validate()?;
        let mut events = Vec::with_capacity(self.ops.len());
        for (offset, op) in self.ops.iter().enumerate() {
            let (Some(counter), Some(lamport)) = (self.counter_at(offset), self.lamport_at(offset))
            else {
                return Err(RunError::Overflow {
                    peer: self.peer.clone(),
                });
            };
            events.push(Event {
                id: EventId::new(self.peer.clone(), counter),
                deps: self.deps_at(offset),
                lamport,
                op: op.clone(),
            });
        }
        Ok(events)
    }

    /// Whether `event` can be appended to this run without losing causal
    /// information.
    fn accepts(&self, event: &Event) -> bool {
        let len = self.ops.len();
        event.id.peer == self.peer
            && self.counter_at(len) == Some(event.id.counter)
            && self.lamport_at(len) == Some(event.lamport)
            && event.deps.iter().all(|dep| self.implies(dep, event.id.counter))
    }

    /// Whether `dep` is already implied for an op at `counter` in this run.
    fn implies(&self, dep: &EventId, counter: u32) -> bool {
        if dep.peer == self.peer {
            return dep.counter < counter;
        }
        self.deps
            .iter()
            .any(|known| known.peer == dep.peer && known.counter >= dep.counter)
    }
}

impl From<&Event> for EventRun {
    fn from(event: &Event) -> Self {
        Self {
            peer: event.id.peer.clone(),
            counter_start: event.id.counter,
            lamport_start: event.lamport,
            deps: event.deps.clone(),
            ops: vec![event.op.clone()],
        }
    }
}

/// Collapse a counter-ordered sequence of events into runs.
///
/// Consecutive events of one peer share a run while their counters and
/// lamports are contiguous and their deps are implied by the run's starting
/// deps plus the preceding own event. Anything else starts a new run, so
/// expanding the result with [`EventRun::events`] loses no causality.
pub fn compact_events<'a>(events: impl IntoIterator<Item = &'a Event>) -> Vec<EventRun> {
    let mut runs: Vec<EventRun> = Vec::new();
    for event in events {
        if let Some(run) = runs.last_mut() {
            if run.accepts(event) {
                run.ops.push(event.op.clone());
                continue;
            }
        }
        runs.push(EventRun::from(event));
    }
    runs
}

/// A replica's exposable sync position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SyncState {
    /// Latest applied event id per peer.
    pub frontier: Vec<EventId>,
    /// Version vector as a list.
    pub versions: Vec<PeerVersion>,
}
