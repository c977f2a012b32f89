//! `Dragonfly` (Redis-compatible) backend.
//!
//! Range reads are one `MGET` and the append lease is `SET NX PX`. Commits
//! and lease release run as Lua scripts, so the ownership and cursor checks
//! and the writes they guard execute as one atomic step on the server.

use fred::interfaces::LuaInterface;
use fred::prelude::*;
use fred::types::{Expiration, SetOptions};

use crate::backend::{CommitFence, LogBackend};
use crate::error::LogError;

const COMMITTED: i64 = 0;
const LEASE_LOST: i64 = 1;

/// `KEYS`: lease, count, then the written keys.
/// `ARGV`: owner, expected count, lease ttl (ms), then the written values.
const FENCED_COMMIT: &str = r"
if redis.call('GET', KEYS[1]) ~= ARGV[1] then
  return 1
end
if (redis.call('GET', KEYS[2]) or '0') ~= ARGV[2] then
  return 2
end
for i = 3, #KEYS do
  redis.call('SET', KEYS[i], ARGV[i + 1])
end
redis.call('PEXPIRE', KEYS[1], ARGV[3])
return 0
";

/// `KEYS`: lease. `ARGV`: owner.
const RELEASE_LEASE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
";

/// Connection handle to a `Dragonfly` instance.
#[derive(Clone)]
pub struct DragonflyBackend {
    client: Client,
}

impl DragonflyBackend {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Config`] if the URL cannot be parsed.
    /// Returns [`LogError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, LogError> {
        let config = Config::from_url(url)
            .map_err(|e| LogError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }
}

impl LogBackend for DragonflyBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, LogError> {
        Ok(self.client.get(key).await?)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, LogError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.client.mget(keys.to_vec()).await?)
    }

    async fn commit(
        &self,
        fence: &CommitFence,
        writes: &[(String, String)],
    ) -> Result<(), LogError> {
        let mut keys = Vec::with_capacity(writes.len().saturating_add(2));
        keys.push(fence.lease_key.clone());
        keys.push(fence.count_key.clone());
        let mut args = Vec::with_capacity(writes.len().saturating_add(3));
        args.push(fence.owner.clone());
        args.push(fence.expected_count.to_string());
        args.push(fence.ttl_ms.to_string());
        for (key, value) in writes {
            keys.push(key.clone());
            args.push(value.clone());
        }

        let status: i64 = self.client.eval(FENCED_COMMIT, keys, args).await?;
        match status {
            COMMITTED => Ok(()),
            LEASE_LOST => Err(LogError::LeaseLost),
            _ => Err(LogError::CursorMoved {
                expected: fence.expected_count,
            }),
        }
    }

    async fn try_lease(&self, key: &str, owner: &str, ttl_ms: u64) -> Result<bool, LogError> {
        let ttl = i64::try_from(ttl_ms).unwrap_or(i64::MAX);
        let reply: Option<String> = self
            .client
            .set(
                key,
                owner,
                Some(Expiration::PX(ttl)),
                Some(SetOptions::NX),
                false,
            )
            .await?;
        Ok(reply.is_some())
    }

    async fn release_lease(&self, key: &str, owner: &str) -> Result<(), LogError> {
        let _: i64 = self
            .client
            .eval(RELEASE_LEASE, vec![key.to_owned()], vec![owner.to_owned()])
            .await?;
        Ok(())
    }
}
