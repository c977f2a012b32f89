//! Room lifecycle: one task per room, created on first join and torn down
//! when the last session leaves.
//!
//! Every room is a Tokio task that owns its [`Room`] and processes
//! [`RoomCommand`]s in arrival order. The registry maps room names to the
//! command channel of the live task. A join that races with teardown sees
//! its acknowledgement dropped and retries against a fresh room.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::protocol::{ClientMessage, RoomMeta, ServerMessage, Topology, sanitize_peer_id};
use crate::room::{Outbox, Room};
use crate::seen::SessionId;

/// Join attempts before giving up on a room that keeps shutting down.
const JOIN_ATTEMPTS: u32 = 3;

/// Room name used when a connection names none.
pub const DEFAULT_ROOM: &str = "main";

/// Input to a room task.
#[derive(Debug)]
pub enum RoomCommand {
    /// Add a session; the room meta is sent back once `welcome` is queued.
    Join {
        /// New session id.
        session: SessionId,
        /// Sanitized peer id.
        peer_id: String,
        /// Where the room sends this session's messages.
        tx: Outbox,
        /// Acknowledgement carrying the room description.
        ack: oneshot::Sender<RoomMeta>,
    },
    /// A message from a joined session.
    Message {
        /// Sender.
        session: SessionId,
        /// Parsed message.
        message: ClientMessage,
    },
    /// A session disconnected.
    Leave {
        /// Departing session.
        session: SessionId,
    },
}

type Rooms = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<RoomCommand>>>>;

/// Parameters of one connection, usually taken from the socket query string.
#[derive(Debug, Clone, Default)]
pub struct JoinRequest {
    /// Room name; [`DEFAULT_ROOM`] when absent.
    pub room: Option<String>,
    /// Requested peer id, sanitized before use.
    pub peer_id: Option<String>,
    /// Topology, honored only when this join creates the room.
    pub mode: Option<Topology>,
    /// Snapshot namespaces, honored only when this join creates the room.
    pub namespaces: Option<Vec<String>>,
}

/// Live rooms keyed by name.
#[derive(Debug, Clone)]
pub struct RoomRegistry {
    rooms: Rooms,
    config: Arc<RelayConfig>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new(config: RelayConfig) -> Self {
        Self {
            rooms: Arc::new(Mutex::new(HashMap::new())),
            config: Arc::new(config),
        }
    }

    /// Settings shared by every room.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Join (creating if needed) the requested room.
    pub async fn join(&self, request: JoinRequest) -> Result<RoomConnection, RelayError> {
        let JoinRequest {
            room,
            peer_id,
            mode,
            namespaces,
        } = request;
        let name = room
            .filter(|room| !room.is_empty())
            .unwrap_or_else(|| DEFAULT_ROOM.to_owned());
        let peer_id = sanitize_peer_id(peer_id.as_deref());

        for attempt in 1..=JOIN_ATTEMPTS {
            let commands = self.room_for(&name, mode, namespaces.as_deref()).await;
            let session = SessionId::new_v4();
            let (tx, inbox) = mpsc::unbounded_channel();
            let (ack, acked) = oneshot::channel();

            let join = RoomCommand::Join {
                session,
                peer_id: peer_id.clone(),
                tx,
                ack,
            };
            if commands.send(join).is_err() {
                debug!(room = %name, attempt, "Room closed before join, retrying");
                continue;
            }
            let Ok(meta) = acked.await else {
                debug!(room = %name, attempt, "Room shut down during join, retrying");
                continue;
            };

            return Ok(RoomConnection {
                session,
                peer_id,
                meta,
                commands,
                inbox,
            });
        }

        Err(RelayError::RoomUnavailable {
            room: name,
            attempts: JOIN_ATTEMPTS,
        })
    }

    async fn room_for(
        &self,
        name: &str,
        mode: Option<Topology>,
        namespaces: Option<&[String]>,
    ) -> mpsc::UnboundedSender<RoomCommand> {
        let mut rooms = self.rooms.lock().await;
        if let Some(commands) = rooms.get(name).filter(|commands| !commands.is_closed()) {
            return commands.clone();
        }

        let topology = mode.unwrap_or(self.config.default_topology);
        let namespaces = namespaces
            .filter(|namespaces| !namespaces.is_empty())
            .map_or_else(|| self.config.default_namespaces.clone(), <[String]>::to_vec);
        let room = Room::new(
            name,
            topology,
            namespaces,
            &self.config,
            SmallRng::from_rng(&mut rand::rng()),
        );

        let (commands, rx) = mpsc::unbounded_channel();
        let sweep_every = Duration::from_millis(self.config.seen_ttl_ms.max(1));
        tokio::spawn(run_room(
            room,
            rx,
            commands.clone(),
            Arc::clone(&self.rooms),
            sweep_every,
        ));
        rooms.insert(name.to_owned(), commands.clone());
        info!(room = %name, mode = ?topology, "Room created");
        commands
    }
}

async fn run_room(
    mut room: Room,
    mut commands: mpsc::UnboundedReceiver<RoomCommand>,
    own: mpsc::UnboundedSender<RoomCommand>,
    rooms: Rooms,
    sweep_every: Duration,
) {
    let start = Instant::now();
    let mut sweep =
        tokio::time::interval_at(start.checked_add(sweep_every).unwrap_or(start), sweep_every);

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                match command {
                    RoomCommand::Join { session, peer_id, tx, ack } => {
                        room.join(session, peer_id, tx);
                        if ack.send(room.meta()).is_err() {
                            room.leave(session);
                        }
                    }
                    RoomCommand::Message { session, message } => {
                        room.handle(session, message, Instant::now());
                    }
                    RoomCommand::Leave { session } => {
                        room.leave(session);
                    }
                }
                if room.is_empty() {
                    break;
                }
            }
            _ = sweep.tick() => {
                let removed = room.sweep(Instant::now());
                if removed > 0 {
                    debug!(room = %room.name(), removed, "Swept expired gossip ids");
                }
            }
        }
    }

    {
        let mut rooms = rooms.lock().await;
        if rooms
            .get(room.name())
            .is_some_and(|commands| commands.same_channel(&own))
        {
            rooms.remove(room.name());
        }
        commands.close();
    }
    while commands.recv().await.is_some() {}
    info!(room = %room.name(), "Room closed");
}

/// A joined session. Dropping it leaves the room.
#[derive(Debug)]
pub struct RoomConnection {
    session: SessionId,
    peer_id: String,
    meta: RoomMeta,
    commands: mpsc::UnboundedSender<RoomCommand>,
    inbox: mpsc::UnboundedReceiver<ServerMessage>,
}

impl RoomConnection {
    /// Session id assigned on join.
    pub const fn session(&self) -> SessionId {
        self.session
    }

    /// Sanitized peer id.
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Room description as of the join.
    pub const fn meta(&self) -> &RoomMeta {
        &self.meta
    }

    /// Hand a message to the room. Returns `false` if the room is gone.
    pub fn send(&self, message: ClientMessage) -> bool {
        self.commands
            .send(RoomCommand::Message {
                session: self.session,
                message,
            })
            .is_ok()
    }

    /// Next message from the room; `None` once the room has closed.
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.inbox.recv().await
    }
}

impl Drop for RoomConnection {
    fn drop(&mut self) {
        if self
            .commands
            .send(RoomCommand::Leave {
                session: self.session,
            })
            .is_err()
        {
            debug!(peer = %self.peer_id, "Room already closed on leave");
        }
    }
}
