//! Messages exchanged with live observers over a room socket.
//!
//! Every message is a JSON object tagged by `type`. The gossip message id
//! travels as `msgId`.

use converge_types::NsEntries;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// How a room disseminates changes. Fixed when the room is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Topology {
    /// Every change is broadcast to every other observer.
    #[default]
    Star,
    /// Every change is forwarded to a few random observers, who re-relay it.
    Gossip,
}

impl Topology {
    /// Parse the `mode` query value; anything unknown is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "star" => Some(Self::Star),
            "gossip" => Some(Self::Gossip),
            _ => None,
        }
    }
}

/// Room description sent in `welcome`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RoomMeta {
    /// Room name.
    pub room: String,
    /// Dissemination topology.
    pub mode: Topology,
    /// Namespaces included in snapshots.
    pub namespaces: Vec<String>,
    /// Peer ids currently connected, including the new one.
    pub peers: Vec<String>,
}

/// Observer to relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ClientMessage {
    /// Local writes. In a gossip room an id is assigned when absent.
    State {
        /// Changed entries.
        entries: NsEntries,
        /// Optional gossip message id.
        #[serde(rename = "msgId", default, skip_serializing_if = "Option::is_none")]
        #[ts(optional)]
        msg_id: Option<String>,
    },
    /// Re-forward of a received `gossip_diff`, carrying its id.
    GossipRelay {
        /// Entries as received.
        entries: NsEntries,
        /// Gossip message id; relays without one are dropped.
        #[serde(rename = "msgId", default, skip_serializing_if = "Option::is_none")]
        #[ts(optional)]
        msg_id: Option<String>,
    },
    /// Liveness probe; answered with `pong` carrying the same `t`.
    Ping {
        /// Opaque client timestamp.
        #[ts(type = "number")]
        t: u64,
    },
}

/// Relay to observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ServerMessage {
    /// First message after joining.
    Welcome {
        /// The joiner's (sanitized) peer id.
        peer_id: String,
        /// Room description.
        room_meta: RoomMeta,
    },
    /// Current values of the room's snapshot namespaces, sent once on join.
    Snapshot {
        /// Room topology.
        mode: Topology,
        /// Current entries.
        entries: NsEntries,
    },
    /// Star-mode change broadcast.
    Diff {
        /// Entries that changed.
        entries: NsEntries,
    },
    /// Gossip-mode forward.
    GossipDiff {
        /// Current values of the message's keys.
        entries: NsEntries,
        /// Gossip message id to echo back in `gossip_relay`.
        #[serde(rename = "msgId")]
        msg_id: String,
    },
    /// Another observer joined.
    PeerJoined {
        /// Its peer id.
        peer_id: String,
    },
    /// Another observer left.
    PeerLeft {
        /// Its peer id.
        peer_id: String,
    },
    /// Answer to `ping`.
    Pong {
        /// The `t` from the ping.
        #[ts(type = "number")]
        t: u64,
    },
}

/// Longest peer id kept after sanitizing.
pub const MAX_PEER_ID_LEN: usize = 32;

/// Keep `[A-Za-z0-9_-]` up to 32 chars; otherwise invent `anon-xxxxxxxx`.
pub fn sanitize_peer_id(raw: Option<&str>) -> String {
    let cleaned: String = raw
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(MAX_PEER_ID_LEN)
        .collect();
    if cleaned.is_empty() {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("anon-{}", id.get(..8).unwrap_or(&id))
    } else {
        cleaned
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_messages_use_wire_names() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "gossip_relay",
            "entries": {},
            "msgId": "m1"
        }))
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::GossipRelay {
                entries: NsEntries::new(),
                msg_id: Some("m1".to_owned()),
            }
        );

        let msg: ClientMessage =
            serde_json::from_value(json!({"type": "state", "entries": {}})).unwrap();
        assert!(matches!(msg, ClientMessage::State { msg_id: None, .. }));
    }

    #[test]
    fn server_messages_use_wire_names() {
        let json = serde_json::to_value(ServerMessage::GossipDiff {
            entries: NsEntries::new(),
            msg_id: "m1".to_owned(),
        })
        .unwrap();
        assert_eq!(json, json!({"type": "gossip_diff", "entries": {}, "msgId": "m1"}));

        let json = serde_json::to_value(ServerMessage::Snapshot {
            mode: Topology::Gossip,
            entries: NsEntries::new(),
        })
        .unwrap();
        assert_eq!(json["mode"], "gossip");
    }

    #[test]
    fn peer_ids_are_sanitized() {
        assert_eq!(sanitize_peer_id(Some("alice_01")), "alice_01");
        assert_eq!(sanitize_peer_id(Some("a b<c>!")), "abc");
        assert_eq!(sanitize_peer_id(Some("x".repeat(40).as_str())).len(), 32);

        let anon = sanitize_peer_id(Some("!!!"));
        assert!(anon.starts_with("anon-"));
        assert_eq!(anon.len(), 13);
        assert!(sanitize_peer_id(None).starts_with("anon-"));
    }
}
