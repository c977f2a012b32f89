//! Conflict policies for concurrent writes to the same row or cell.
//!
//! The sync and storage layers never look inside a policy. Any policy that
//! is a strict total order over [`Stamp`]s keeps merge commutative, so
//! replicas converge no matter which order runs arrive in.

use std::cmp::Ordering;

/// The ordering key of one applied event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Stamp {
    /// Lamport clock of the event.
    pub lamport: u32,
    /// Authoring peer.
    pub peer: String,
}

impl Stamp {
    /// Create a stamp.
    pub fn new(lamport: u32, peer: impl Into<String>) -> Self {
        Self {
            lamport,
            peer: peer.into(),
        }
    }
}

/// Decides which of two concurrent writes wins.
pub trait ConflictPolicy: core::fmt::Debug + Send + Sync {
    /// Whether `incoming` should replace `current`.
    ///
    /// Must be a strict total order: irreflexive, and for distinct stamps
    /// exactly one of `prefers(a, b)` / `prefers(b, a)` holds.
    fn prefers(&self, incoming: &Stamp, current: &Stamp) -> bool;

    /// Pick the preferred of two optional stamps.
    fn newest<'a>(&self, a: Option<&'a Stamp>, b: Option<&'a Stamp>) -> Option<&'a Stamp> {
        match (a, b) {
            (Some(x), Some(y)) => Some(if self.prefers(y, x) { y } else { x }),
            (x, None) => x,
            (None, y) => y,
        }
    }
}

/// Higher lamport wins; equal lamports go to the lexically higher peer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LamportThenPeer;

impl ConflictPolicy for LamportThenPeer {
    fn prefers(&self, incoming: &Stamp, current: &Stamp) -> bool {
        match incoming.lamport.cmp(&current.lamport) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => incoming.peer > current.peer,
        }
    }
}
