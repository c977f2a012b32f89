//! Storage backend abstraction for the event log.
//!
//! A backend is a string key/value store with three extra guarantees the log
//! relies on: a batched read, an expiring single-owner lease, and a
//! multi-key commit that is applied atomically only while a [`CommitFence`]
//! still holds.

use std::future::Future;

use crate::dragonfly::DragonflyBackend;
use crate::error::LogError;
use crate::memory::MemoryBackend;

/// Limits a backend enforces on every commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageLimits {
    /// Largest stored value in bytes.
    pub max_value_bytes: usize,
    /// Most key writes in one atomic commit.
    pub max_mutations: usize,
}

impl Default for StorageLimits {
    fn default() -> Self {
        Self {
            max_value_bytes: 65_536,
            max_mutations: 10,
        }
    }
}

impl StorageLimits {
    /// Reject a commit that breaks either limit.
    pub fn check(&self, writes: &[(String, String)]) -> Result<(), LogError> {
        if writes.len() > self.max_mutations {
            return Err(LogError::BatchTooLarge {
                size: writes.len(),
                max: self.max_mutations,
            });
        }
        if let Some((_, value)) = writes
            .iter()
            .find(|(_, value)| value.len() > self.max_value_bytes)
        {
            return Err(LogError::ValueTooLarge {
                size: value.len(),
                max: self.max_value_bytes,
            });
        }
        Ok(())
    }
}

/// Conditions an append commit is applied under.
///
/// The commit goes through only while `owner` holds the unexpired lease at
/// `lease_key` and the cursor at `count_key` still reads `expected_count`
/// (absent counts as zero). Checking and writing happen as one atomic step,
/// and a successful commit extends the lease by `ttl_ms`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitFence {
    /// Lease key.
    pub lease_key: String,
    /// Token the lease must hold.
    pub owner: String,
    /// Lease lifetime granted on success, in milliseconds.
    pub ttl_ms: u64,
    /// Count cursor key.
    pub count_key: String,
    /// Cursor value the writer caught up to.
    pub expected_count: u64,
}

/// Key/value storage the event log is persisted in.
pub trait LogBackend: Clone + Send + Sync + 'static {
    /// Read one key.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, LogError>> + Send;

    /// Read several keys in one round trip, in order.
    fn get_many(
        &self,
        keys: &[String],
    ) -> impl Future<Output = Result<Vec<Option<String>>, LogError>> + Send;

    /// Write every pair atomically if `fence` holds: all become visible or
    /// none do.
    ///
    /// Fails with [`LogError::LeaseLost`] or [`LogError::CursorMoved`] when
    /// the fence no longer holds, writing nothing.
    fn commit(
        &self,
        fence: &CommitFence,
        writes: &[(String, String)],
    ) -> impl Future<Output = Result<(), LogError>> + Send;

    /// Take the lease at `key` for `owner` unless someone else holds it.
    fn try_lease(
        &self,
        key: &str,
        owner: &str,
        ttl_ms: u64,
    ) -> impl Future<Output = Result<bool, LogError>> + Send;

    /// Give the lease back if `owner` still holds it.
    fn release_lease(
        &self,
        key: &str,
        owner: &str,
    ) -> impl Future<Output = Result<(), LogError>> + Send;
}

/// Backend chosen at runtime from configuration.
#[derive(Clone)]
pub enum Backend {
    /// Process-local store.
    Memory(MemoryBackend),
    /// `Dragonfly` (Redis-compatible) store.
    Dragonfly(DragonflyBackend),
}

impl core::fmt::Debug for Backend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Memory(_) => f.write_str("Backend::Memory"),
            Self::Dragonfly(_) => f.write_str("Backend::Dragonfly"),
        }
    }
}

impl LogBackend for Backend {
    async fn get(&self, key: &str) -> Result<Option<String>, LogError> {
        match self {
            Self::Memory(b) => b.get(key).await,
            Self::Dragonfly(b) => b.get(key).await,
        }
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, LogError> {
        match self {
            Self::Memory(b) => b.get_many(keys).await,
            Self::Dragonfly(b) => b.get_many(keys).await,
        }
    }

    async fn commit(
        &self,
        fence: &CommitFence,
        writes: &[(String, String)],
    ) -> Result<(), LogError> {
        match self {
            Self::Memory(b) => b.commit(fence, writes).await,
            Self::Dragonfly(b) => b.commit(fence, writes).await,
        }
    }

    async fn try_lease(&self, key: &str, owner: &str, ttl_ms: u64) -> Result<bool, LogError> {
        match self {
            Self::Memory(b) => b.try_lease(key, owner, ttl_ms).await,
            Self::Dragonfly(b) => b.try_lease(key, owner, ttl_ms).await,
        }
    }

    async fn release_lease(&self, key: &str, owner: &str) -> Result<(), LogError> {
        match self {
            Self::Memory(b) => b.release_lease(key, owner).await,
            Self::Dragonfly(b) => b.release_lease(key, owner).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_reject_wide_batches_and_big_values() {
        let limits = StorageLimits {
            max_value_bytes: 4,
            max_mutations: 2,
        };
        let pair = |v: &str| ("k".to_owned(), v.to_owned());
        assert!(limits.check(&[pair("ok"), pair("ok")]).is_ok());
        assert!(matches!(
            limits.check(&[pair("a"), pair("b"), pair("c")]),
            Err(LogError::BatchTooLarge { size: 3, max: 2 })
        ));
        assert!(matches!(
            limits.check(&[pair("too long")]),
            Err(LogError::ValueTooLarge { size: 8, max: 4 })
        ));
    }
}
