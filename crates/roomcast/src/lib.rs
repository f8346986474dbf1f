//! # Roomcast
//!
//! Room-scoped multiplayer state relay.
//!
//! Clients tell the server what their own character is doing: where it
//! stands, which way it faces, what it looks like, what it says. The
//! server stamps each packet with the sender's id and relays it to the
//! sender's room, to everyone, or to a shared crypt group. Clients that
//! enter a room later are brought up to date from each occupant's most
//! recent state.
//!
//! The crates underneath:
//!
//! - `roomcast-protocol`: packet catalogue, bulks, dispatch
//! - `roomcast-transport`: length-prefixed TCP, WebSocket, SOCKS5
//! - `roomcast-session`: the reconnecting client session
//! - `roomcast-room`: the relay
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roomcast::prelude::*;
//!
//! # async fn demo() -> Result<(), RoomcastError> {
//! let server = RoomcastServer::builder().bind("0.0.0.0:6500").build().await?;
//! let handle = server.handle();
//! tokio::spawn(server.run());
//!
//! let mut session = ClientSession::new(ClientConfig::default())?;
//! session.register_system_handler(SystemEvent::Open, |ctx| {
//!     ctx.send_packet_async(RoomPacket::new(1));
//!     ctx.send_packet_async(NamePacket::new("alex"));
//! });
//! let client = session.start();
//! client.connect();
//! # handle.stop();
//! # Ok(())
//! # }
//! ```

mod error;
mod server;

pub mod cli;
pub mod logging;

pub use error::RoomcastError;
pub use server::{RoomcastServer, RoomcastServerBuilder, ServerHandle};

pub use roomcast_protocol as protocol;
pub use roomcast_room as room;
pub use roomcast_session as session;
pub use roomcast_transport as transport;

/// The types most programs need.
pub mod prelude {
    pub use crate::{RoomcastError, RoomcastServer, RoomcastServerBuilder, ServerHandle};
    pub use roomcast_protocol::{
        ChatPacket, ControlSignal, FacingPacket, HasPlayerId, HeartbeatPacket, JoinPacket,
        LeavePacket, Message, MovePacket, NamePacket, Packet, RoomPacket, SpritePacket,
        SystemEvent, Visibility,
    };
    pub use roomcast_room::{ClientId, Relay, ServerConfig};
    pub use roomcast_session::{ClientConfig, ClientContext, ClientHandle, ClientSession};
    pub use roomcast_transport::TransportKind;
}
