//! Accepting server-side sockets.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::socket::{SocketHandle, spawn_socket};
use crate::{DEFAULT_PORT, SocketEvent, TransportError, TransportKind, parse_address};

/// A bound TCP listener whose accepted sockets all speak one framing.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    kind: TransportKind,
}

impl Listener {
    /// Binds to a `host[:port]` string. The port defaults to
    /// [`DEFAULT_PORT`]. A literal socket address such as `127.0.0.1:0`
    /// is bound as is, so it may ask for an ephemeral port.
    pub async fn bind(address: &str, kind: TransportKind) -> Result<Self, TransportError> {
        if let Ok(literal) = address.trim().parse::<SocketAddr>() {
            return Self::bind_addr(literal, kind).await;
        }
        let (host, port) = parse_address(address, DEFAULT_PORT)?;
        let inner = TcpListener::bind((host.as_str(), port))
            .await
            .map_err(TransportError::BindFailed)?;
        Ok(Self { inner, kind })
    }

    /// Binds to an already resolved address, port 0 included.
    pub async fn bind_addr(address: SocketAddr, kind: TransportKind) -> Result<Self, TransportError> {
        let inner = TcpListener::bind(address)
            .await
            .map_err(TransportError::BindFailed)?;
        Ok(Self { inner, kind })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.inner.local_addr().map_err(TransportError::BindFailed)
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Waits for the next connection. Nagle is disabled on it.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), TransportError> {
        let (stream, peer) = self.inner.accept().await.map_err(TransportError::AcceptFailed)?;
        let _ = stream.set_nodelay(true);
        Ok((stream, peer))
    }

    /// Starts a socket task for an accepted stream using this listener's
    /// framing.
    pub fn spawn(
        &self,
        stream: TcpStream,
        read_timeout: Option<Duration>,
        events: mpsc::UnboundedSender<SocketEvent>,
    ) -> SocketHandle {
        spawn_socket(stream, self.kind.server_framing(), read_timeout, events)
    }
}
