//! Unified error type for Roomcast.

use roomcast_protocol::ProtocolError;
use roomcast_room::RoomError;
use roomcast_session::SessionError;
use roomcast_transport::TransportError;

/// Top-level error that wraps every crate-specific error.
///
/// The `#[from]` on each variant lets `?` convert sub-crate errors
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum RoomcastError {
    /// Bind, accept, connect or I/O failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Malformed packet or bulk.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Client session setup failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Relay failure, including invalid server config.
    #[error(transparent)]
    Room(#[from] RoomError),
}
