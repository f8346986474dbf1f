//! Error types for the client session.

use roomcast_transport::TransportError;

/// Errors surfaced by the client session.
///
/// Network trouble after start-up is not reported here. It shows up as a
/// [`SystemEvent::Close`](roomcast_protocol::SystemEvent::Close) followed
/// by a reconnect attempt. These errors come from setting the session up.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A configuration value is unusable.
    #[error("invalid client config: {0}")]
    InvalidConfig(String),
}
