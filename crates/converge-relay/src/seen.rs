//! Gossip deduplication cache.
//!
//! Each message id remembers which sessions already hold the message and
//! which already relayed it. The expiry is fixed when the id is first seen;
//! a later relay does not extend it.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::RelayConfig;

/// Identifies one socket connection within a room.
pub type SessionId = uuid::Uuid;

#[derive(Debug)]
struct SeenEntry {
    expires_at: Instant,
    holders: HashSet<SessionId>,
    relayed: HashSet<SessionId>,
}

/// Bounded map from gossip message id to delivery bookkeeping.
#[derive(Debug)]
pub struct SeenCache {
    entries: HashMap<String, SeenEntry>,
    ttl: Duration,
    sweep_threshold: usize,
    capacity: usize,
}

impl SeenCache {
    /// Create an empty cache.
    pub fn new(ttl: Duration, sweep_threshold: usize, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            sweep_threshold,
            capacity,
        }
    }

    /// Create an empty cache sized from relay settings.
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            Duration::from_millis(config.seen_ttl_ms),
            config.sweep_threshold,
            config.seen_capacity,
        )
    }

    /// Record that `from` relayed message `id`.
    ///
    /// Returns `false` when `from` already relayed this id before it
    /// expired; the message must then be dropped.
    pub fn admit(&mut self, id: &str, from: SessionId, now: Instant) -> bool {
        if self
            .entries
            .get(id)
            .is_some_and(|entry| entry.expires_at <= now)
        {
            self.entries.remove(id);
        }
        if !self.entries.contains_key(id) {
            self.make_room(now);
            self.entries.insert(
                id.to_owned(),
                SeenEntry {
                    expires_at: now.checked_add(self.ttl).unwrap_or(now),
                    holders: HashSet::new(),
                    relayed: HashSet::new(),
                },
            );
        }

        let Some(entry) = self.entries.get_mut(id) else {
            return false;
        };
        if !entry.relayed.insert(from) {
            return false;
        }
        entry.holders.insert(from);
        true
    }

    /// Whether `session` already holds message `id`.
    pub fn holds(&self, id: &str, session: &SessionId) -> bool {
        self.entries
            .get(id)
            .is_some_and(|entry| entry.holders.contains(session))
    }

    /// Record that message `id` was sent to `sessions`.
    pub fn mark_delivered(&mut self, id: &str, sessions: &[SessionId]) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.holders.extend(sessions.iter().copied());
        }
    }

    /// Drop every expired id; returns how many were removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Remembered ids, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no id is remembered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn make_room(&mut self, now: Instant) {
        if self.entries.len() > self.sweep_threshold {
            self.sweep(now);
        }
        while self.capacity > 0 && self.entries.len() >= self.capacity {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }
}
