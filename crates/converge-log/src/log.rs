//! The persisted, append-only event log.
//!
//! Records live at sequential indices and a count cursor marks the next free
//! one; only indices below the cursor are visible. An append writes its
//! records in batches of at most `max_mutations - 1` and puts the cursor in
//! the final batch, so a crash part-way leaves the cursor untouched and the
//! written records invisible.
//!
//! Every writer remembers the cursor it last replayed up to. Reads catch up
//! from there to the shared cursor. Appends additionally take the writer
//! lease and catch up after taking it. Every batch is committed under a
//! [`CommitFence`]: the backend applies it only while this writer still
//! owns the lease and the cursor still reads the index the append started
//! at. A writer whose lease expired mid-append therefore fails with
//! [`LogError::LeaseLost`] instead of overwriting the records of the writer
//! that took the lease over, so two writers never write at the same index.

use std::time::{Duration, Instant};

use converge_engine::DocumentEngine;
use converge_types::EventRun;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::backend::{CommitFence, LogBackend};
use crate::chunk::to_records;
use crate::error::LogError;
use crate::keys::LogKeys;

/// Keys fetched per read round trip during replay.
const READ_PAGE: u64 = 100;

/// Tunables of an [`EventLog`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Key namespace of this log.
    pub namespace: String,
    /// Most ops per stored record before the run is split.
    pub chunk_size: usize,
    /// Most key writes per atomic commit (records plus cursor).
    pub max_mutations: usize,
    /// Largest serialized record in bytes.
    pub max_value_bytes: usize,
    /// Lease lifetime in milliseconds.
    pub lease_ttl_ms: u64,
    /// Attempts to take the lease before giving up.
    pub lease_attempts: u32,
    /// Pause between lease attempts in milliseconds.
    pub lease_retry_ms: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            namespace: "converge".to_owned(),
            chunk_size: 50,
            max_mutations: 10,
            max_value_bytes: 65_536,
            lease_ttl_ms: 5_000,
            lease_attempts: 50,
            lease_retry_ms: 20,
        }
    }
}

/// Where an append landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendReceipt {
    /// Index of the first written record.
    pub first_index: u64,
    /// Records written.
    pub records: u64,
}

/// One writer's view of the shared log.
#[derive(Debug)]
pub struct EventLog<B: LogBackend> {
    backend: B,
    keys: LogKeys,
    config: LogConfig,
    /// Cursor value this writer has replayed up to.
    local_version: u64,
    /// Lease owner token, unique per writer.
    owner: String,
}

impl<B: LogBackend> EventLog<B> {
    /// Open a writer over `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Config`] if a batch could not hold one record
    /// plus the cursor, or if the chunk size is zero.
    pub fn new(backend: B, config: LogConfig) -> Result<Self, LogError> {
        if config.max_mutations < 2 {
            return Err(LogError::Config(format!(
                "max_mutations must be at least 2, got {}",
                config.max_mutations
            )));
        }
        if config.chunk_size == 0 {
            return Err(LogError::Config("chunk_size must be positive".to_owned()));
        }
        Ok(Self {
            backend,
            keys: LogKeys::new(config.namespace.clone()),
            config,
            local_version: 0,
            owner: uuid::Uuid::new_v4().to_string(),
        })
    }

    /// Cursor value this writer has replayed up to.
    pub const fn local_version(&self) -> u64 {
        self.local_version
    }

    /// The underlying backend.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// The shared cursor: number of visible records.
    pub async fn stored_count(&self) -> Result<u64, LogError> {
        let Some(raw) = self.backend.get(&self.keys.count()).await? else {
            return Ok(0);
        };
        raw.parse::<u64>()
            .map_err(|e| LogError::CorruptCursor(format!("{raw:?}: {e}")))
    }

    /// Rebuild `engine` from every visible record.
    pub async fn replay_all<E: DocumentEngine>(
        &mut self,
        engine: &mut E,
    ) -> Result<u64, LogError> {
        self.local_version = 0;
        let started = Instant::now();
        let replayed = self.catch_up(engine).await?;
        info!(
            records = replayed,
            elapsed_ms = started.elapsed().as_millis(),
            "Replayed event log"
        );
        Ok(replayed)
    }

    /// Merge every record appended since this writer last looked.
    ///
    /// Returns how many records were merged.
    pub async fn catch_up<E: DocumentEngine>(
        &mut self,
        engine: &mut E,
    ) -> Result<u64, LogError> {
        let count = self.stored_count().await?;
        let from = self.local_version;
        while self.local_version < count {
            let start = self.local_version;
            let end = count.min(start.saturating_add(READ_PAGE));
            let keys: Vec<String> = (start..end).map(|i| self.keys.record(i)).collect();
            let values = self.backend.get_many(&keys).await?;
            if values.len() != keys.len() {
                return Err(LogError::MissingRecord { index: start });
            }
            for (index, value) in (start..end).zip(values) {
                let raw = value.ok_or(LogError::MissingRecord { index })?;
                let run: EventRun = serde_json::from_str(&raw)?;
                engine.merge_remote(std::slice::from_ref(&run))?;
                self.local_version = index.checked_add(1).ok_or(LogError::IndexOverflow)?;
            }
        }
        let merged = self.local_version.saturating_sub(from);
        if merged > 0 {
            debug!(from, to = self.local_version, "Caught up with shared log");
        }
        Ok(merged)
    }

    /// Persist `runs`, which `engine` has already merged.
    ///
    /// Runs are chunked and size-fitted first; the lease is then held while
    /// catching up and writing.
    pub async fn append<E: DocumentEngine>(
        &mut self,
        engine: &mut E,
        runs: &[EventRun],
    ) -> Result<AppendReceipt, LogError> {
        let records = to_records(runs, self.config.chunk_size, self.config.max_value_bytes)?;
        if records.is_empty() {
            return Ok(AppendReceipt {
                first_index: self.local_version,
                records: 0,
            });
        }

        self.acquire_lease().await?;
        let result = self.append_locked(engine, &records).await;
        if let Err(e @ (LogError::LeaseLost | LogError::CursorMoved { .. })) = &result {
            warn!(owner = %self.owner, error = %e, "Append fenced off by another writer");
        }
        if let Err(e) = self
            .backend
            .release_lease(&self.keys.lease(), &self.owner)
            .await
        {
            warn!(error = %e, "Failed to release append lease");
        }
        result
    }

    async fn acquire_lease(&self) -> Result<(), LogError> {
        let key = self.keys.lease();
        for attempt in 0..self.config.lease_attempts {
            if self
                .backend
                .try_lease(&key, &self.owner, self.config.lease_ttl_ms)
                .await?
            {
                return Ok(());
            }
            if attempt.saturating_add(1) < self.config.lease_attempts {
                tokio::time::sleep(Duration::from_millis(self.config.lease_retry_ms)).await;
            }
        }
        Err(LogError::LeaseUnavailable {
            attempts: self.config.lease_attempts,
        })
    }

    async fn append_locked<E: DocumentEngine>(
        &mut self,
        engine: &mut E,
        records: &[String],
    ) -> Result<AppendReceipt, LogError> {
        self.catch_up(engine).await?;
        let first_index = self.local_version;
        let total = u64::try_from(records.len()).unwrap_or(u64::MAX);
        let end = first_index
            .checked_add(total)
            .ok_or(LogError::IndexOverflow)?;

        let per_batch = self.config.max_mutations.saturating_sub(1).max(1);
        let mut batches: Vec<Vec<(String, String)>> = Vec::new();
        let mut index = first_index;
        for group in records.chunks(per_batch) {
            let mut writes = Vec::with_capacity(group.len().saturating_add(1));
            for json in group {
                writes.push((self.keys.record(index), json.clone()));
                index = index.checked_add(1).ok_or(LogError::IndexOverflow)?;
            }
            batches.push(writes);
        }
        if let Some(last) = batches.last_mut() {
            last.push((self.keys.count(), end.to_string()));
        }

        let fence = CommitFence {
            lease_key: self.keys.lease(),
            owner: self.owner.clone(),
            ttl_ms: self.config.lease_ttl_ms,
            count_key: self.keys.count(),
            expected_count: first_index,
        };
        for writes in &batches {
            self.backend.commit(&fence, writes).await?;
        }
        self.local_version = end;

        info!(
            first_index,
            records = total,
            batches = batches.len(),
            "Appended to event log"
        );
        Ok(AppendReceipt {
            first_index,
            records: total,
        })
    }
}
