use std::io;

/// Errors that can occur in the transport layer.
///
/// None of these are fatal to the process. At worst the socket they
/// belong to is closed and its owner is told through a
/// [`SocketEvent`](crate::SocketEvent).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An address string could not be parsed into host and port.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Binding a listener failed.
    #[error("bind failed: {0}")]
    BindFailed(#[source] io::Error),

    /// Accepting an incoming connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] io::Error),

    /// Resolving or connecting to the remote (or proxy) failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] io::Error),

    /// The SOCKS5 proxy refused or garbled the handshake.
    #[error("socks5 handshake failed: {0}")]
    Socks5(String),

    /// The WebSocket opening handshake failed.
    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] io::Error),

    /// No data arrived within the read timeout.
    #[error("read timed out")]
    ReadTimeout,

    /// An outgoing message does not fit the framing.
    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },
}
