//! State of one relay room.
//!
//! A [`Room`] is owned by exactly one task (see [`crate::registry`]) and
//! is driven synchronously: every call completes its sends before
//! returning. Sends go to unbounded channels, one per session; a closed
//! channel is logged at `debug` and otherwise ignored.

use std::collections::BTreeMap;

use converge_engine::EphemeralStore;
use converge_types::NsEntries;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::RelayConfig;
use crate::protocol::{ClientMessage, RoomMeta, ServerMessage, Topology};
use crate::seen::{SeenCache, SessionId};

/// Outbound half of one session's socket.
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

#[derive(Debug)]
struct Session {
    peer_id: String,
    tx: Outbox,
}

/// Sessions, merged ephemeral state and gossip bookkeeping of one room.
#[derive(Debug)]
pub struct Room {
    name: String,
    topology: Topology,
    namespaces: Vec<String>,
    sessions: BTreeMap<SessionId, Session>,
    store: EphemeralStore,
    seen: SeenCache,
    fanout: usize,
    rng: SmallRng,
}

impl Room {
    /// Create an empty room. `rng` picks gossip targets.
    pub fn new(
        name: impl Into<String>,
        topology: Topology,
        namespaces: Vec<String>,
        config: &RelayConfig,
        rng: SmallRng,
    ) -> Self {
        Self {
            name: name.into(),
            topology,
            namespaces,
            sessions: BTreeMap::new(),
            store: EphemeralStore::new(),
            seen: SeenCache::from_config(config),
            fanout: config.fanout,
            rng,
        }
    }

    /// Room name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dissemination topology.
    pub const fn topology(&self) -> Topology {
        self.topology
    }

    /// Merged ephemeral state of the room.
    pub const fn store(&self) -> &EphemeralStore {
        &self.store
    }

    /// Connected sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is connected.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Description sent to joiners.
    pub fn meta(&self) -> RoomMeta {
        RoomMeta {
            room: self.name.clone(),
            mode: self.topology,
            namespaces: self.namespaces.clone(),
            peers: self
                .sessions
                .values()
                .map(|session| session.peer_id.clone())
                .collect(),
        }
    }

    /// Add a session: `welcome` and `snapshot` to it, `peer_joined` to the rest.
    pub fn join(&mut self, session: SessionId, peer_id: String, tx: Outbox) {
        self.sessions.insert(
            session,
            Session {
                peer_id: peer_id.clone(),
                tx,
            },
        );

        self.send(
            session,
            ServerMessage::Welcome {
                peer_id: peer_id.clone(),
                room_meta: self.meta(),
            },
        );
        self.send(
            session,
            ServerMessage::Snapshot {
                mode: self.topology,
                entries: self.store.snapshot(&self.namespaces),
            },
        );
        info!(
            room = %self.name,
            peer = %peer_id,
            sessions = self.sessions.len(),
            "Observer joined"
        );
        self.broadcast_except(session, &ServerMessage::PeerJoined { peer_id });
    }

    /// Remove a session and tell the rest. Returns whether it was present.
    pub fn leave(&mut self, session: SessionId) -> bool {
        let Some(left) = self.sessions.remove(&session) else {
            return false;
        };
        self.broadcast_except(
            session,
            &ServerMessage::PeerLeft {
                peer_id: left.peer_id.clone(),
            },
        );
        info!(
            room = %self.name,
            peer = %left.peer_id,
            sessions = self.sessions.len(),
            "Observer left"
        );
        true
    }

    /// Handle one message from `from`.
    pub fn handle(&mut self, from: SessionId, message: ClientMessage, now: Instant) {
        match (self.topology, message) {
            (_, ClientMessage::Ping { t }) => self.send(from, ServerMessage::Pong { t }),
            (
                Topology::Star,
                ClientMessage::State { entries, .. } | ClientMessage::GossipRelay { entries, .. },
            ) => self.star(from, entries),
            (Topology::Gossip, ClientMessage::State { entries, msg_id }) => {
                let id = msg_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                self.gossip(from, &id, entries, now);
            }
            (
                Topology::Gossip,
                ClientMessage::GossipRelay {
                    entries,
                    msg_id: Some(id),
                },
            ) => self.gossip(from, &id, entries, now),
            (Topology::Gossip, ClientMessage::GossipRelay { msg_id: None, .. }) => {
                debug!(room = %self.name, "Gossip relay without msgId dropped");
            }
        }
    }

    /// Forget expired gossip ids.
    pub fn sweep(&mut self, now: Instant) -> usize {
        self.seen.sweep(now)
    }

    fn star(&mut self, from: SessionId, entries: NsEntries) {
        let diff = self.store.merge_nested(entries);
        if diff.is_empty() {
            return;
        }
        self.broadcast_except(from, &ServerMessage::Diff { entries: diff });
    }

    fn gossip(&mut self, from: SessionId, id: &str, entries: NsEntries, now: Instant) {
        if !self.seen.admit(id, from, now) {
            debug!(room = %self.name, msg_id = id, "Duplicate gossip relay dropped");
            return;
        }

        let keys = entries.clone();
        let changed = self.store.merge_nested(entries);
        let current = self.store.current_of(&keys);
        if current.is_empty() {
            return;
        }

        let mut candidates: Vec<SessionId> = self
            .sessions
            .keys()
            .filter(|session| **session != from && !self.seen.holds(id, session))
            .copied()
            .collect();
        let (targets, _) = candidates.partial_shuffle(&mut self.rng, self.fanout);
        let targets = targets.to_vec();

        for target in &targets {
            self.send(
                *target,
                ServerMessage::GossipDiff {
                    entries: current.clone(),
                    msg_id: id.to_owned(),
                },
            );
        }
        self.seen.mark_delivered(id, &targets);
        debug!(
            room = %self.name,
            msg_id = id,
            changed = !changed.is_empty(),
            targets = targets.len(),
            "Gossip forwarded"
        );
    }

    fn send(&self, to: SessionId, message: ServerMessage) {
        let Some(session) = self.sessions.get(&to) else {
            return;
        };
        if session.tx.send(message).is_err() {
            debug!(room = %self.name, peer = %session.peer_id, "Send to closed session skipped");
        }
    }

    fn broadcast_except(&self, except: SessionId, message: &ServerMessage) {
        for (id, session) in &self.sessions {
            if *id == except {
                continue;
            }
            if session.tx.send(message.clone()).is_err() {
                debug!(room = %self.name, peer = %session.peer_id, "Send to closed session skipped");
            }
        }
    }
}
