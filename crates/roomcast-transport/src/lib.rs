//! Transport layer for Roomcast.
//!
//! Every connection, client or server side, is a [`SocketHandle`] backed
//! by one Tokio task that owns the stream. The task turns bytes into
//! messages with a [`Framing`] and reports what happens as
//! [`SocketEvent`]s on a channel chosen by whoever spawned it.
//!
//! Two framings are provided:
//!
//! - [`LengthPrefixed`]: plain TCP with a `u16` length before each message.
//! - [`WebSocketCodec`]: a minimal RFC 6455 server and client.
//!
//! Clients may reach the server through a SOCKS5 proxy ([`socks5`]).
//!
//! # Feature Flags
//!
//! - `websocket` (default): the WebSocket framing.

mod address;
mod error;
mod framing;
mod listener;
mod socket;
pub mod socks5;
#[cfg(feature = "websocket")]
mod websocket;

pub use address::parse_address;
pub use error::TransportError;
pub use framing::{FrameEvent, Framing, LengthPrefixed, MAX_FRAME_PAYLOAD};
pub use listener::Listener;
pub use socket::{
    ConnectOptions, MAX_PENDING_WRITES, SocketCommand, SocketHandle, connect, spawn_socket,
};
#[cfg(feature = "websocket")]
pub use websocket::{
    MAX_CLIENT_MESSAGE_SIZE, MAX_MESSAGE_SIZE, Role, WebSocketCodec, close_code,
    is_valid_close_code,
};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Port used when an address string does not name one.
pub const DEFAULT_PORT: u16 = 6500;

/// Opaque identifier for a socket, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates a fresh id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Something that happened on a socket.
///
/// Each socket reports at most one `Open`, then any number of
/// `Messages`, then exactly one of `Close` or `ConnectFailed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// The framing is ready; sends are now written immediately.
    Open(ConnectionId),
    /// Messages decoded from a single read, in arrival order.
    Messages(ConnectionId, Vec<Vec<u8>>),
    /// The socket is gone, for whatever reason.
    Close(ConnectionId),
    /// An outgoing connection never got established.
    ConnectFailed(ConnectionId),
}

impl SocketEvent {
    pub fn id(&self) -> ConnectionId {
        match self {
            Self::Open(id) | Self::Messages(id, _) | Self::Close(id) | Self::ConnectFailed(id) => *id,
        }
    }
}

/// Which framing a socket speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Length-prefixed TCP.
    #[default]
    Tcp,
    /// WebSocket binary messages.
    #[cfg(feature = "websocket")]
    WebSocket,
}

impl TransportKind {
    pub fn server_framing(self) -> Box<dyn Framing> {
        match self {
            Self::Tcp => Box::new(LengthPrefixed::new()),
            #[cfg(feature = "websocket")]
            Self::WebSocket => Box::new(WebSocketCodec::server()),
        }
    }

    #[cfg_attr(not(feature = "websocket"), allow(unused_variables))]
    pub fn client_framing(self, host: &str, port: u16, path: &str) -> Box<dyn Framing> {
        match self {
            Self::Tcp => Box::new(LengthPrefixed::new()),
            #[cfg(feature = "websocket")]
            Self::WebSocket => Box::new(WebSocketCodec::client(host, port, path)),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            #[cfg(feature = "websocket")]
            Self::WebSocket => f.write_str("websocket"),
        }
    }
}
