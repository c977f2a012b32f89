//! Reference document: per-peer event logs, materialized tables, and the
//! causal gap buffer.

use std::collections::BTreeMap;

use converge_types::{
    EphemeralEntry, EphemeralRemoteEntry, Event, EventId, EventRun, KeyValue, MergeOp, RowOp,
    SyncState, Value, VersionVector, compact_events,
};
use serde::Deserialize;
use tracing::warn;

use crate::ephemeral::EphemeralStore;
use crate::gap::{DEFAULT_GAP_CAPACITY, GapBuffer};
use crate::policy::{ConflictPolicy, LamportThenPeer, Stamp};
use crate::table::Tables;
use crate::{DocumentEngine, EngineError};

/// Tunables for a [`Document`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Maximum number of out-of-order runs held while waiting for deps.
    pub gap_buffer_capacity: usize,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            gap_buffer_capacity: DEFAULT_GAP_CAPACITY,
        }
    }
}

/// What to do with an incoming run right now.
enum Readiness {
    /// Every op is already applied.
    Known,
    /// Apply ops from this offset onwards.
    Apply(usize),
    /// A counter gap or an unmet dependency; hold it.
    Hold,
}

/// A replicated row store owned by one peer.
#[derive(Debug)]
pub struct Document<P: ConflictPolicy = LamportThenPeer> {
    peer: String,
    policy: P,
    /// Applied events per peer; `logs[p][i]` has counter `i + 1`.
    logs: BTreeMap<String, Vec<Event>>,
    versions: VersionVector,
    max_lamport: u32,
    tables: Tables,
    gap: GapBuffer,
    ephemeral: EphemeralStore,
}

impl Document<LamportThenPeer> {
    /// Create an empty document for `peer` with the default policy.
    pub fn new(peer: impl Into<String>) -> Self {
        Self::with_policy(peer, LamportThenPeer, &DocumentConfig::default())
    }

    /// Create an empty document with explicit tunables.
    pub fn with_config(peer: impl Into<String>, config: &DocumentConfig) -> Self {
        Self::with_policy(peer, LamportThenPeer, config)
    }
}

impl<P: ConflictPolicy> Document<P> {
    /// Create an empty document resolving conflicts with `policy`.
    pub fn with_policy(peer: impl Into<String>, policy: P, config: &DocumentConfig) -> Self {
        Self {
            peer: peer.into(),
            policy,
            logs: BTreeMap::new(),
            versions: VersionVector::new(),
            max_lamport: 0,
            tables: Tables::new(),
            gap: GapBuffer::new(config.gap_buffer_capacity),
            ephemeral: EphemeralStore::new(),
        }
    }

    /// Visible value of one cell.
    pub fn cell(&self, tbl: &str, row_id: &str, col: &str) -> Option<Value> {
        self.tables.cell(&self.policy, tbl, row_id, col)
    }

    /// Visible cells of one row, `None` when the row is absent or deleted.
    pub fn row(&self, tbl: &str, row_id: &str) -> Option<Vec<KeyValue>> {
        self.tables.row(&self.policy, tbl, row_id)
    }

    /// Visible row ids of a table.
    pub fn row_ids(&self, tbl: &str) -> Vec<String> {
        self.tables.row_ids(&self.policy, tbl)
    }

    /// Number of runs waiting on missing dependencies.
    pub fn buffered_runs(&self) -> usize {
        self.gap.len()
    }

    /// Highest lamport clock applied so far.
    pub const fn max_lamport(&self) -> u32 {
        self.max_lamport
    }

    fn author(&mut self, op: RowOp) -> Result<Event, EngineError> {
        let counter = self
            .versions
            .get(&self.peer)
            .checked_add(1)
            .ok_or_else(|| EngineError::CounterOverflow {
                peer: self.peer.clone(),
            })?;
        let lamport = self
            .max_lamport
            .checked_add(1)
            .ok_or(EngineError::LamportOverflow)?;
        let event = Event {
            id: EventId::new(self.peer.clone(), counter),
            deps: self.versions.to_frontier(),
            lamport,
            op,
        };
        self.apply_event(event.clone());
        Ok(event)
    }

    fn apply_event(&mut self, event: Event) -> Vec<MergeOp> {
        let stamp = Stamp::new(event.lamport, event.id.peer.clone());
        let ops = self.tables.apply(&self.policy, &event.op, &stamp);
        self.versions.observe(&event.id.peer, event.id.counter);
        self.max_lamport = self.max_lamport.max(event.lamport);
        self.logs
            .entry(event.id.peer.clone())
            .or_default()
            .push(event);
        ops
    }

    fn readiness(&self, run: &EventRun) -> Readiness {
        let known = self.versions.get(&run.peer);
        if run.last_counter().is_none_or(|last| last <= known) {
            return Readiness::Known;
        }
        let Some(next) = known.checked_add(1) else {
            return Readiness::Known;
        };
        if run.counter_start > next {
            return Readiness::Hold;
        }
        let offset = usize::try_from(next.saturating_sub(run.counter_start)).unwrap_or(usize::MAX);
        if offset == 0 && !run.deps.iter().all(|dep| self.versions.contains(dep)) {
            return Readiness::Hold;
        }
        Readiness::Apply(offset)
    }

    fn apply_run(
        &mut self,
        run: &EventRun,
        offset: usize,
        out: &mut Vec<MergeOp>,
    ) -> Result<(), EngineError> {
        for event in run.events()?.into_iter().skip(offset) {
            out.extend(self.apply_event(event));
        }
        Ok(())
    }

    fn integrate(&mut self, run: EventRun, out: &mut Vec<MergeOp>) -> Result<(), EngineError> {
        match self.readiness(&run) {
            Readiness::Known => Ok(()),
            Readiness::Apply(offset) => {
                self.apply_run(&run, offset, out)?;
                self.retry_held(out)
            }
            Readiness::Hold => {
                if let Some(evicted) = self.gap.hold(run) {
                    warn!(
                        peer = %evicted.peer,
                        counter_start = evicted.counter_start,
                        "gap buffer full, dropping oldest held run"
                    );
                }
                Ok(())
            }
        }
    }

    fn retry_held(&mut self, out: &mut Vec<MergeOp>) -> Result<(), EngineError> {
        loop {
            let mut progressed = false;
            for run in self.gap.drain() {
                match self.readiness(&run) {
                    Readiness::Known => {}
                    Readiness::Apply(offset) => {
                        self.apply_run(&run, offset, out)?;
                        progressed = true;
                    }
                    Readiness::Hold => {
                        self.gap.hold(run);
                    }
                }
            }
            if !progressed {
                return Ok(());
            }
        }
    }
}

impl<P: ConflictPolicy> DocumentEngine for Document<P> {
    fn peer_id(&self) -> &str {
        &self.peer
    }

    fn insert(
        &mut self,
        tbl: &str,
        row_id: &str,
        values: Vec<KeyValue>,
    ) -> Result<Event, EngineError> {
        self.author(RowOp::Insert {
            tbl: tbl.to_owned(),
            row_id: row_id.to_owned(),
            values,
        })
    }

    fn update(
        &mut self,
        tbl: &str,
        row_id: &str,
        col: &str,
        val: Value,
    ) -> Result<Event, EngineError> {
        self.author(RowOp::Update {
            tbl: tbl.to_owned(),
            row_id: row_id.to_owned(),
            col: col.to_owned(),
            val,
        })
    }

    fn delete(&mut self, tbl: &str, row_id: &str) -> Result<Event, EngineError> {
        self.author(RowOp::Delete {
            tbl: tbl.to_owned(),
            row_id: row_id.to_owned(),
        })
    }

    fn merge_remote(&mut self, runs: &[EventRun]) -> Result<Vec<MergeOp>, EngineError> {
        for run in runs {
            run.validate()?;
        }
        let mut out = Vec::new();
        for run in runs {
            self.integrate(run.clone(), &mut out)?;
        }
        Ok(out)
    }

    fn is_held(&self, run: &EventRun) -> bool {
        self.gap.contains(run)
    }

    fn get_pending(&self, known: &VersionVector) -> Vec<EventRun> {
        self.logs
            .iter()
            .flat_map(|(peer, events)| {
                let from = usize::try_from(known.get(peer)).unwrap_or(usize::MAX);
                compact_events(events.get(from..).unwrap_or_default())
            })
            .collect()
    }

    fn sync_state(&self) -> SyncState {
        SyncState {
            frontier: self.versions.to_frontier(),
            versions: self.versions.to_peer_versions(),
        }
    }

    fn version_vector(&self) -> VersionVector {
        self.versions.clone()
    }

    fn ephemeral_set(
        &mut self,
        ns: &str,
        key: &str,
        val: Value,
        timestamp: u64,
    ) -> EphemeralRemoteEntry {
        let peer = self.peer.clone();
        self.ephemeral
            .set(ns, key, val, timestamp, &peer)
            .into_remote(ns)
    }

    fn ephemeral_get(&self, ns: &str, key: &str) -> Option<EphemeralEntry> {
        self.ephemeral.get(ns, key).cloned()
    }

    fn ephemeral_get_all(&self, ns: &str) -> Vec<EphemeralEntry> {
        self.ephemeral.get_all(ns).into_values().collect()
    }

    fn ephemeral_merge(
        &mut self,
        entries: Vec<EphemeralRemoteEntry>,
    ) -> Vec<EphemeralRemoteEntry> {
        self.ephemeral.merge(entries)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn age_update(
        counter_start: u32,
        lamport_start: u32,
        deps: Vec<EventId>,
        age: i32,
    ) -> EventRun {
        EventRun {
            peer: "a".to_owned(),
            counter_start,
            lamport_start,
            deps,
            ops: vec![RowOp::Update {
                tbl: "t".to_owned(),
                row_id: "r".to_owned(),
                col: "age".to_owned(),
                val: Value::Int(age),
            }],
        }
    }

    #[test]
    fn local_events_depend_on_the_whole_frontier() {
        let mut doc = Document::new("a");
        doc.merge_remote(&[EventRun {
            peer: "b".to_owned(),
            counter_start: 1,
            lamport_start: 7,
            deps: vec![],
            ops: vec![RowOp::Delete {
                tbl: "t".to_owned(),
                row_id: "x".to_owned(),
            }],
        }])
        .unwrap();
        let first = doc.delete("t", "y").unwrap();
        assert_eq!(first.lamport, 8);
        assert_eq!(first.deps, vec![EventId::new("b", 1)]);
        let second = doc.delete("t", "z").unwrap();
        assert_eq!(
            second.deps,
            vec![EventId::new("a", 1), EventId::new("b", 1)]
        );
    }

    #[test]
    fn counter_gap_is_held_until_filled() {
        let mut doc = Document::new("b");
        let insert = EventRun {
            peer: "a".to_owned(),
            counter_start: 1,
            lamport_start: 1,
            deps: vec![],
            ops: vec![RowOp::Insert {
                tbl: "t".to_owned(),
                row_id: "r".to_owned(),
                values: vec![KeyValue::new("age", 1)],
            }],
        };
        let later = age_update(2, 2, vec![EventId::new("a", 1)], 2);

        assert!(doc.merge_remote(std::slice::from_ref(&later)).unwrap().is_empty());
        assert_eq!(doc.buffered_runs(), 1);
        assert!(doc.is_held(&later));
        assert_eq!(doc.version_vector().get("a"), 0);

        let ops = doc.merge_remote(&[insert]).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(doc.buffered_runs(), 0);
        assert!(!doc.is_held(&later));
        assert_eq!(doc.cell("t", "r", "age"), Some(Value::Int(2)));
    }

    #[test]
    fn foreign_dependency_is_held_until_known() {
        let mut doc = Document::new("c");
        let mut waiting = age_update(1, 5, vec![EventId::new("b", 1)], 9);
        waiting.ops.insert(
            0,
            RowOp::Insert {
                tbl: "t".to_owned(),
                row_id: "r".to_owned(),
                values: vec![],
            },
        );
        doc.merge_remote(&[waiting]).unwrap();
        assert_eq!(doc.buffered_runs(), 1);

        let dep = EventRun {
            peer: "b".to_owned(),
            counter_start: 1,
            lamport_start: 1,
            deps: vec![],
            ops: vec![RowOp::Delete {
                tbl: "t".to_owned(),
                row_id: "other".to_owned(),
            }],
        };
        doc.merge_remote(&[dep]).unwrap();
        assert_eq!(doc.buffered_runs(), 0);
        assert_eq!(doc.cell("t", "r", "age"), Some(Value::Int(9)));
    }

    #[test]
    fn overlapping_run_applies_only_unknown_suffix() {
        let mut doc = Document::new("b");
        let mut run = age_update(1, 1, vec![], 1);
        doc.merge_remote(&[run.clone()]).unwrap();

        run.ops.push(RowOp::Update {
            tbl: "t".to_owned(),
            row_id: "r".to_owned(),
            col: "age".to_owned(),
            val: Value::Int(2),
        });
        doc.merge_remote(&[run]).unwrap();
        assert_eq!(doc.version_vector().get("a"), 2);
        assert_eq!(doc.max_lamport(), 2);
    }

    #[test]
    fn invalid_run_rejects_the_whole_call() {
        let mut doc = Document::new("b");
        let good = age_update(1, 1, vec![], 1);
        let mut bad = age_update(1, 1, vec![], 1);
        bad.ops.clear();
        assert!(doc.merge_remote(&[good, bad]).is_err());
        assert!(doc.version_vector().is_empty());
    }

    #[test]
    fn ephemeral_set_stamps_own_peer() {
        let mut doc = Document::new("me");
        let entry = doc.ephemeral_set("presence", "cursor", Value::Int(4), 100);
        assert_eq!(entry.peer, "me");
        assert_eq!(entry.ns, "presence");
        assert_eq!(doc.ephemeral_get_all("presence").len(), 1);
    }
}
