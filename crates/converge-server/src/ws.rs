//! `WebSocket` handler for relay rooms.
//!
//! Clients connect to `GET /ws?room=<name>&peer_id=<id>&mode=star|gossip&ns=a,b`.
//! The room is joined before the upgrade, so a room that cannot be joined
//! is reported as an HTTP error. After the upgrade, text frames are parsed
//! as [`ClientMessage`]s and handed to the room; everything the room sends
//! is written back as a JSON text frame.
//!
//! Malformed frames are ignored. Closing the socket leaves the room.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use converge_relay::{ClientMessage, JoinRequest, RoomConnection, Topology};
use futures::{SinkExt as _, StreamExt as _};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters of `GET /ws`.
#[derive(Debug, Default, serde::Deserialize)]
pub struct RoomQuery {
    /// Room name (default `main`).
    pub room: Option<String>,
    /// Requested peer id; sanitized by the relay.
    pub peer_id: Option<String>,
    /// `star` or `gossip`; unknown values fall back to the default.
    pub mode: Option<String>,
    /// Comma-separated snapshot namespaces.
    pub ns: Option<String>,
}

impl RoomQuery {
    /// Translate into a relay join request.
    pub fn into_join(self) -> JoinRequest {
        JoinRequest {
            room: self.room,
            peer_id: self.peer_id,
            mode: self.mode.as_deref().and_then(Topology::parse),
            namespaces: self.ns.map(|ns| {
                ns.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_owned)
                    .collect()
            }),
        }
    }
}

/// Join a room and upgrade the connection.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_room(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RoomQuery>,
) -> Result<Response, ApiError> {
    let connection = state.rooms.join(query.into_join()).await?;
    Ok(ws.on_upgrade(move |socket| handle_ws(socket, connection)))
}

/// Pump messages between the socket and the room until either side closes.
async fn handle_ws(socket: WebSocket, mut connection: RoomConnection) {
    debug!(
        peer = connection.peer_id(),
        room = %connection.meta().room,
        "WebSocket observer connected"
    );
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            // Forward a room message to the client.
            outgoing = connection.recv() => {
                let Some(message) = outgoing else {
                    debug!("Room closed, shutting down WebSocket");
                    return;
                };
                let json = match serde_json::to_string(&message) {
                    Ok(j) => j,
                    Err(e) => {
                        warn!("Failed to serialize relay message: {e}");
                        continue;
                    }
                };
                if sink.send(Message::Text(json.into())).await.is_err() {
                    debug!("WebSocket observer disconnected (send failed)");
                    return;
                }
            }
            // Hand a client message to the room.
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(text.as_str()) {
                            Ok(message) => {
                                if !connection.send(message) {
                                    debug!("Room closed, shutting down WebSocket");
                                    return;
                                }
                            }
                            Err(e) => debug!("Ignoring malformed observer message: {e}"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket observer disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            debug!("WebSocket observer disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return;
                    }
                    _ => {
                        // Binary and pong frames carry nothing for the room.
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_translates_to_join_request() {
        let join = RoomQuery {
            room: Some("doc".to_owned()),
            peer_id: Some("alice".to_owned()),
            mode: Some("gossip".to_owned()),
            ns: Some("state, cursors,,".to_owned()),
        }
        .into_join();

        assert_eq!(join.room.as_deref(), Some("doc"));
        assert_eq!(join.mode, Some(Topology::Gossip));
        assert_eq!(
            join.namespaces,
            Some(vec!["state".to_owned(), "cursors".to_owned()])
        );
    }

    #[test]
    fn unknown_mode_falls_back_to_default() {
        let join = RoomQuery {
            mode: Some("mesh".to_owned()),
            ..RoomQuery::default()
        }
        .into_join();
        assert_eq!(join.mode, None);
        assert_eq!(join.namespaces, None);
    }
}
