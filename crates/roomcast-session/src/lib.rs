//! Client session for Roomcast.
//!
//! A [`ClientSession`] keeps one client connected to one relay server:
//!
//! 1. **Dispatch**: incoming bulks go to handlers registered per packet
//!    kind, followed by an end-of-batch flush of everything they queued.
//! 2. **Reconnect**: an *active* session that loses its connection tries
//!    again after a fixed delay ([`ReconnectScheduler`]).
//! 3. **Heartbeat**: a small packet on a fixed interval keeps the
//!    server's read timeout from firing.
//! 4. **Termination**: a control signal from the server (shutdown or
//!    room full) ends the session for good; no reconnect follows.
//!
//! # How it fits in the stack
//!
//! ```text
//! Game logic (above)  ← registers handlers, queues packets
//!     ↕
//! Session (this crate)  ← connection lifecycle and send discipline
//!     ↕
//! Protocol + Transport (below)  ← packets, framing, sockets
//! ```

mod config;
mod error;
mod queue;
mod reconnect;
mod session;

pub use config::ClientConfig;
pub use error::SessionError;
pub use queue::OutgoingQueue;
pub use reconnect::ReconnectScheduler;
pub use session::{ClientContext, ClientHandle, ClientSession};
