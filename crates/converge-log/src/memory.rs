//! Process-local backend.
//!
//! Clones share one store, so several [`crate::EventLog`]s over clones of
//! the same [`MemoryBackend`] behave like several processes sharing one
//! database. Limits and commit fences are enforced exactly as a constrained
//! remote store would, and commits can be made to fail on demand to exercise
//! crash paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::backend::{CommitFence, LogBackend, StorageLimits};
use crate::error::LogError;

#[derive(Debug, Default)]
struct MemoryState {
    values: BTreeMap<String, String>,
    leases: HashMap<String, (String, Instant)>,
    /// Commits still allowed before every further commit fails.
    commits_before_fault: Option<usize>,
}

impl MemoryState {
    fn check_fence(&self, fence: &CommitFence, now: Instant) -> Result<(), LogError> {
        let held = self
            .leases
            .get(&fence.lease_key)
            .is_some_and(|(holder, expires)| *holder == fence.owner && *expires > now);
        if !held {
            return Err(LogError::LeaseLost);
        }
        let count = match self.values.get(&fence.count_key) {
            None => 0,
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|e| LogError::CorruptCursor(format!("{raw:?}: {e}")))?,
        };
        if count != fence.expected_count {
            return Err(LogError::CursorMoved {
                expected: fence.expected_count,
            });
        }
        Ok(())
    }
}

fn expiry(now: Instant, ttl_ms: u64) -> Instant {
    now.checked_add(Duration::from_millis(ttl_ms))
        .unwrap_or(now)
}

/// In-memory key/value store shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
    limits: StorageLimits,
}

impl MemoryBackend {
    /// Empty store with the default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store enforcing `limits`.
    pub fn with_limits(limits: StorageLimits) -> Self {
        Self {
            state: Arc::default(),
            limits,
        }
    }

    /// Let `n` more commits succeed, then fail every commit after them.
    pub async fn fail_commits_after(&self, n: usize) {
        self.state.lock().await.commits_before_fault = Some(n);
    }

    /// Stop injecting commit failures.
    pub async fn heal(&self) {
        self.state.lock().await.commits_before_fault = None;
    }

    /// Write one key directly, outside any commit or fence.
    pub async fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        self.state
            .lock()
            .await
            .values
            .insert(key.into(), value.into());
    }

    /// Every stored key, in order.
    pub async fn keys(&self) -> Vec<String> {
        self.state.lock().await.values.keys().cloned().collect()
    }
}

impl LogBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, LogError> {
        Ok(self.state.lock().await.values.get(key).cloned())
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, LogError> {
        let state = self.state.lock().await;
        Ok(keys.iter().map(|key| state.values.get(key).cloned()).collect())
    }

    async fn commit(
        &self,
        fence: &CommitFence,
        writes: &[(String, String)],
    ) -> Result<(), LogError> {
        self.limits.check(writes)?;
        let mut state = self.state.lock().await;
        if let Some(remaining) = state.commits_before_fault {
            let Some(next) = remaining.checked_sub(1) else {
                return Err(LogError::InjectedFault);
            };
            state.commits_before_fault = Some(next);
        }
        let now = Instant::now();
        state.check_fence(fence, now)?;
        for (key, value) in writes {
            state.values.insert(key.clone(), value.clone());
        }
        state.leases.insert(
            fence.lease_key.clone(),
            (fence.owner.clone(), expiry(now, fence.ttl_ms)),
        );
        Ok(())
    }

    async fn try_lease(&self, key: &str, owner: &str, ttl_ms: u64) -> Result<bool, LogError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        if let Some((holder, expires)) = state.leases.get(key) {
            if holder != owner && *expires > now {
                return Ok(false);
            }
        }
        state
            .leases
            .insert(key.to_owned(), (owner.to_owned(), expiry(now, ttl_ms)));
        Ok(true)
    }

    async fn release_lease(&self, key: &str, owner: &str) -> Result<(), LogError> {
        let mut state = self.state.lock().await;
        if state
            .leases
            .get(key)
            .is_some_and(|(holder, _)| holder == owner)
        {
            state.leases.remove(key);
        }
        Ok(())
    }
}
