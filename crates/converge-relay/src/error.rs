//! Error types for the relay.

/// Errors returned when joining a room.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The room kept shutting down under every join attempt.
    #[error("Room {room} unavailable after {attempts} join attempts")]
    RoomUnavailable {
        /// Room name.
        room: String,
        /// Attempts made.
        attempts: u32,
    },
}
