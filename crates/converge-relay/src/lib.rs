//! Live dissemination of ephemeral state for the Converge sync layer.
//!
//! Observers connected to the same room share a last-writer-wins key space.
//! The room fixes one of two topologies when it is created:
//!
//! ```text
//! star:    A --state--> room --diff--> every other observer
//!
//! gossip:  A --state--> room --gossip_diff(id)--> k random observers
//!                        ^                              |
//!                        +------ gossip_relay(id) ------+
//! ```
//!
//! In gossip rooms a dedup cache keyed by message id stops re-propagation
//! once every reachable observer holds the message.
//!
//! # Modules
//!
//! - [`protocol`] -- Socket messages and peer id sanitizing
//! - [`room`] -- State and dissemination logic of one room
//! - [`seen`] -- Gossip dedup cache
//! - [`registry`] -- One task per room, created and torn down on demand
//! - [`observer`] -- Client-side view that re-relays gossip
//! - [`config`] -- Fan-out, TTL and default room settings
//! - [`error`] -- Join failures

pub mod config;
pub mod error;
pub mod observer;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod seen;

// Re-export primary types for convenience.
pub use config::RelayConfig;
pub use error::RelayError;
pub use observer::{GossipObserver, now_ms};
pub use protocol::{ClientMessage, RoomMeta, ServerMessage, Topology, sanitize_peer_id};
pub use registry::{DEFAULT_ROOM, JoinRequest, RoomConnection, RoomRegistry};
pub use room::Room;
pub use seen::{SeenCache, SessionId};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation for browser observers.

    #[test]
    fn export_bindings() {
        use ts_rs::TS;

        let _ = crate::protocol::Topology::export_all();
        let _ = crate::protocol::RoomMeta::export_all();
        let _ = crate::protocol::ClientMessage::export_all();
        let _ = crate::protocol::ServerMessage::export_all();
    }
}
