//! Server-side relay engine for Roomcast.
//!
//! The server keeps no world. It relays what each client says about
//! itself to the clients that should hear it, and remembers just enough
//! of it to bring a newcomer up to date.
//!
//! # Key types
//!
//! - [`Relay`]: admits connections and owns the single fan-out loop
//! - [`ClientTable`]: connected clients and the visibility rules
//! - [`ServerClient`]: per-client packet handlers
//! - [`LastState`]: the state replayed to late joiners
//! - [`ServerConfig`]: listener addresses, capacity, synced config
//!
//! # Scopes
//!
//! | Scope  | Reaches                                   |
//! |--------|-------------------------------------------|
//! | LOCAL  | clients in the sender's room              |
//! | GLOBAL | every client                              |
//! | CRYPT  | clients sharing the sender's crypt key    |
//! | NULL   | the sender only                           |
//!
//! The sender is left out of its own broadcasts unless the request sets
//! `return_flag`.

mod client;
mod config;
mod error;
mod last_state;
mod relay;
mod table;

pub use client::{ServerClient, UNKNOWN_NAME, server_connection};
pub use config::ServerConfig;
pub use error::RoomError;
pub use last_state::{LastState, MAX_CACHED_PICTURES};
pub use relay::Relay;
pub use table::{ClientEntry, ClientId, ClientTable, FIRST_CLIENT_ID, SendRequest};
