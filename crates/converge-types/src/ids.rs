//! Event identity and version vectors.
//!
//! An [`EventId`] is the pair `(peer, counter)`. Counters are per-peer,
//! start at 1 and never skip, so a single number per peer (the
//! [`VersionVector`]) is enough to describe everything a replica has seen.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Globally unique, immutable identifier of one event.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EventId {
    /// Authoring peer.
    pub peer: String,
    /// Per-peer sequence number, starting at 1.
    pub counter: u32,
}

impl EventId {
    /// Create an identifier.
    pub fn new(peer: impl Into<String>, counter: u32) -> Self {
        Self {
            peer: peer.into(),
            counter,
        }
    }
}

impl core::fmt::Display for EventId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.peer, self.counter)
    }
}

/// Highest counter known from one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PeerVersion {
    /// Peer id.
    pub peer: String,
    /// Highest contiguous counter known (0 = nothing).
    pub version: u32,
}

/// Map from peer id to the highest contiguous counter known from it.
///
/// Serialized as a plain JSON object (`{"peer-A": 3}`), which is the
/// `known_peers` shape of a pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct VersionVector(pub BTreeMap<String, u32>);

impl VersionVector {
    /// An empty vector (nothing known).
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Highest known counter for `peer`, 0 if the peer was never seen.
    pub fn get(&self, peer: &str) -> u32 {
        self.0.get(peer).copied().unwrap_or(0)
    }

    /// Raise the entry for `peer` to `counter` if it is higher.
    pub fn observe(&mut self, peer: &str, counter: u32) {
        let entry = self.0.entry(peer.to_owned()).or_insert(0);
        if counter > *entry {
            *entry = counter;
        }
    }

    /// Whether the event `id` is implied by this vector.
    pub fn contains(&self, id: &EventId) -> bool {
        id.counter <= self.get(&id.peer)
    }

    /// Iterate `(peer, counter)` pairs in peer order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(peer, counter)| (peer.as_str(), *counter))
    }

    /// Number of peers tracked.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no peer is tracked.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Expose the vector as a `PeerVersion` list, skipping zero entries.
    pub fn to_peer_versions(&self) -> Vec<PeerVersion> {
        self.iter()
            .filter(|(_, version)| *version > 0)
            .map(|(peer, version)| PeerVersion {
                peer: peer.to_owned(),
                version,
            })
            .collect()
    }

    /// Latest event id per peer, skipping zero entries.
    pub fn to_frontier(&self) -> Vec<EventId> {
        self.iter()
            .filter(|(_, counter)| *counter > 0)
            .map(|(peer, counter)| EventId::new(peer, counter))
            .collect()
    }
}

impl FromIterator<PeerVersion> for VersionVector {
    fn from_iter<I: IntoIterator<Item = PeerVersion>>(iter: I) -> Self {
        let mut vv = Self::new();
        for pv in iter {
            vv.observe(&pv.peer, pv.version);
        }
        vv
    }
}

impl FromIterator<EventId> for VersionVector {
    fn from_iter<I: IntoIterator<Item = EventId>>(iter: I) -> Self {
        let mut vv = Self::new();
        for id in iter {
            vv.observe(&id.peer, id.counter);
        }
        vv
    }
}
