//! Server side of the sync protocol.
//!
//! A [`SyncService`] owns one document and one writer of the shared log and
//! is the single sequential actor for that document. Every operation first
//! catches up with records other writers appended, so in-memory state is
//! never older than the log when a request is answered.

use std::time::Instant;

use converge_engine::DocumentEngine;
use converge_log::{EventLog, LogBackend};
use converge_types::{EventRun, SyncState};
use tracing::{debug, info};

use crate::error::SyncError;
use crate::protocol::{PullRequest, PullResponse, PushRequest, PushResponse};

/// One document plus its persistent log.
#[derive(Debug)]
pub struct SyncService<E: DocumentEngine, B: LogBackend> {
    engine: E,
    log: EventLog<B>,
    /// Merged runs whose append failed; written with the next push.
    unpersisted: Vec<EventRun>,
}

impl<E: DocumentEngine, B: LogBackend> SyncService<E, B> {
    /// Wrap an engine and a log without replaying.
    pub const fn new(engine: E, log: EventLog<B>) -> Self {
        Self {
            engine,
            log,
            unpersisted: Vec::new(),
        }
    }

    /// Wrap an engine and a log, rebuilding the engine from the log.
    pub async fn open(mut engine: E, mut log: EventLog<B>) -> Result<Self, SyncError> {
        log.replay_all(&mut engine).await?;
        Ok(Self::new(engine, log))
    }

    /// The document.
    pub const fn engine(&self) -> &E {
        &self.engine
    }

    /// Merged runs still waiting to be persisted.
    pub fn unpersisted_runs(&self) -> usize {
        self.unpersisted.len()
    }

    /// The log writer.
    pub const fn log(&self) -> &EventLog<B> {
        &self.log
    }

    /// Merge records other writers appended since the last request.
    pub async fn catch_up(&mut self) -> Result<u64, SyncError> {
        Ok(self.log.catch_up(&mut self.engine).await?)
    }

    /// Merge pushed runs, persist the new ones, and report the change count.
    ///
    /// A run already waiting in the gap buffer was persisted when it first
    /// arrived and is not written again.
    ///
    /// An invalid run fails the whole push before anything is applied. A
    /// storage failure after a successful merge keeps the merge in memory,
    /// queues the runs for the next push, and reports the error.
    pub async fn push(&mut self, request: &PushRequest) -> Result<PushResponse, SyncError> {
        request.validate()?;
        let started = Instant::now();
        self.catch_up().await?;

        let known = self.engine.version_vector();
        let fresh: Vec<EventRun> = request
            .events
            .iter()
            .filter(|run| {
                run.last_counter()
                    .is_some_and(|last| last > known.get(&run.peer))
                    && !self.engine.is_held(run)
            })
            .cloned()
            .collect();

        let merge_ops = self.engine.merge_remote(&request.events)?;
        let mut to_store = std::mem::take(&mut self.unpersisted);
        to_store.extend(fresh);
        let persisted_runs = to_store.len();
        if !to_store.is_empty() {
            if let Err(e) = self.log.append(&mut self.engine, &to_store).await {
                self.unpersisted = to_store;
                return Err(e.into());
            }
        }

        info!(
            runs = request.events.len(),
            ops = request.op_count(),
            persisted_runs,
            merge_ops = merge_ops.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "Push merged"
        );
        Ok(PushResponse {
            ok: true,
            merge_ops: merge_ops.len(),
        })
    }

    /// Runs the requester is missing plus the local frontier.
    pub async fn pull(&mut self, request: &PullRequest) -> Result<PullResponse, SyncError> {
        let started = Instant::now();
        self.catch_up().await?;
        let events = self.engine.get_pending(&request.known_peers);
        let server_frontier = self.engine.sync_state().frontier;
        info!(
            known_peers = request.known_peers.len(),
            runs = events.len(),
            ops = events.iter().map(EventRun::len).sum::<usize>(),
            elapsed_ms = started.elapsed().as_millis(),
            "Pull served"
        );
        Ok(PullResponse {
            events,
            server_frontier,
        })
    }

    /// Current sync position.
    pub async fn state(&mut self) -> Result<SyncState, SyncError> {
        self.catch_up().await?;
        let state = self.engine.sync_state();
        debug!(peers = state.versions.len(), "State served");
        Ok(state)
    }
}
