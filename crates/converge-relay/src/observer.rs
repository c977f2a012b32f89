//! Client-side counterpart of a relay room.
//!
//! A [`GossipObserver`] keeps its own LWW view of the room, applies every
//! snapshot and diff it receives, and re-forwards each `gossip_diff` to the
//! relay under the same message id so propagation continues.

use std::collections::BTreeMap;

use converge_engine::EphemeralStore;
use converge_types::{EphemeralEntry, NsEntries, Value};

use crate::protocol::{ClientMessage, ServerMessage};

/// Local view of one room's ephemeral state.
#[derive(Debug, Clone)]
pub struct GossipObserver {
    peer_id: String,
    store: EphemeralStore,
}

impl GossipObserver {
    /// Observer writing as `peer_id` until a `welcome` says otherwise.
    pub fn new(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            store: EphemeralStore::new(),
        }
    }

    /// Peer id stamped on local writes.
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Current local view.
    pub const fn store(&self) -> &EphemeralStore {
        &self.store
    }

    /// Current value of `(ns, key)`.
    pub fn get(&self, ns: &str, key: &str) -> Option<&Value> {
        self.store.get(ns, key).map(|entry| &entry.val)
    }

    /// Write locally and build the `state` message announcing it.
    pub fn set(&mut self, ns: &str, key: &str, val: Value, timestamp: u64) -> ClientMessage {
        let entry: EphemeralEntry = self.store.set(ns, key, val, timestamp, &self.peer_id);
        let entries: NsEntries =
            BTreeMap::from([(ns.to_owned(), BTreeMap::from([(key.to_owned(), entry)]))]);
        ClientMessage::State {
            entries,
            msg_id: None,
        }
    }

    /// Apply a message from the relay; returns the reply to send, if any.
    pub fn handle(&mut self, message: ServerMessage) -> Option<ClientMessage> {
        match message {
            ServerMessage::Welcome { peer_id, .. } => {
                self.peer_id = peer_id;
                None
            }
            ServerMessage::Snapshot { entries, .. } | ServerMessage::Diff { entries } => {
                self.store.merge_nested(entries);
                None
            }
            ServerMessage::GossipDiff { entries, msg_id } => {
                self.store.merge_nested(entries.clone());
                Some(ClientMessage::GossipRelay {
                    entries,
                    msg_id: Some(msg_id),
                })
            }
            ServerMessage::PeerJoined { .. }
            | ServerMessage::PeerLeft { .. }
            | ServerMessage::Pong { .. } => None,
        }
    }
}

/// Wall-clock milliseconds, the timestamp observers stamp on writes.
pub fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn gossip_diff_is_merged_and_relayed_with_same_id() {
        let mut writer = GossipObserver::new("a");
        let ClientMessage::State { entries, .. } = writer.set("state", "k", Value::Int(1), 10)
        else {
            panic!("set must produce a state message");
        };

        let mut reader = GossipObserver::new("b");
        let reply = reader.handle(ServerMessage::GossipDiff {
            entries: entries.clone(),
            msg_id: "m1".to_owned(),
        });

        assert_eq!(reader.get("state", "k"), Some(&Value::Int(1)));
        assert_eq!(
            reply,
            Some(ClientMessage::GossipRelay {
                entries,
                msg_id: Some("m1".to_owned()),
            })
        );
    }

    #[test]
    fn older_diff_does_not_overwrite() {
        let mut observer = GossipObserver::new("a");
        observer.set("state", "k", Value::Int(2), 20);

        let mut stale = GossipObserver::new("b");
        let ClientMessage::State { entries, .. } = stale.set("state", "k", Value::Int(1), 10)
        else {
            panic!("set must produce a state message");
        };
        assert!(observer.handle(ServerMessage::Diff { entries }).is_none());
        assert_eq!(observer.get("state", "k"), Some(&Value::Int(2)));
    }

    #[test]
    fn welcome_adopts_sanitized_peer_id() {
        let mut observer = GossipObserver::new("a b");
        observer.handle(ServerMessage::Welcome {
            peer_id: "ab".to_owned(),
            room_meta: crate::protocol::RoomMeta {
                room: "main".to_owned(),
                mode: crate::protocol::Topology::Gossip,
                namespaces: vec!["state".to_owned()],
                peers: vec!["ab".to_owned()],
            },
        });
        assert_eq!(observer.peer_id(), "ab");
        assert!(now_ms() > 0);
    }
}
