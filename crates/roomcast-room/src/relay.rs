//! The relay: client admission and the single fan-out loop.
//!
//! Client tasks never write to each other's sockets. Everything bound for
//! another client becomes a [`SendRequest`] on one queue, and one task
//! drains that queue in order, resolving recipients against the client
//! table at the moment each request is taken off.
//!
//! ```text
//!  client task ─┐
//!  client task ─┼─▶ Dispatch queue ─▶ fan-out task ─▶ SocketHandle::send
//!  client task ─┘
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use roomcast_protocol::ControlSignal;
use roomcast_transport::{Framing, SocketHandle, TransportKind, spawn_socket};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::client::run_client;
use crate::{ClientId, ClientTable, RoomError, SendRequest, ServerConfig};

/// An item on the fan-out queue.
#[derive(Debug)]
enum Dispatch {
    Send(SendRequest),
    /// Sent once by [`Relay::stop`]. Nothing after it is delivered.
    Stop,
}

struct Inner {
    config: ServerConfig,
    table: Arc<ClientTable>,
    dispatch: mpsc::UnboundedSender<Dispatch>,
    stopped: AtomicBool,
}

/// Handle to a running relay. Cheap to clone.
///
/// Dropping every clone ends the fan-out task.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("clients", &self.inner.table.len())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl Relay {
    /// Starts the fan-out task. Must be called inside a Tokio runtime.
    pub fn new(config: ServerConfig) -> Self {
        let table = Arc::new(ClientTable::new());
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(fan_out(Arc::clone(&table), rx));
        Self {
            inner: Arc::new(Inner {
                config,
                table,
                dispatch: tx,
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn table(&self) -> &ClientTable {
        &self.inner.table
    }

    pub fn client_count(&self) -> usize {
        self.inner.table.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Takes over an accepted stream using `kind`'s server framing.
    ///
    /// See [`admit_with`](Self::admit_with).
    pub fn admit<S>(&self, stream: S, kind: TransportKind) -> Option<ClientId>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.admit_with(stream, kind.server_framing())
    }

    /// Takes over an accepted stream.
    ///
    /// When the server is full (or stopped) the peer is sent the matching
    /// control signal and the stream is closed without creating a client.
    /// Otherwise the client gets an id and its own task, which runs until
    /// the socket closes.
    pub fn admit_with<S, F>(&self, stream: S, framing: F) -> Option<ClientId>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        F: Framing,
    {
        let (events_tx, events) = mpsc::unbounded_channel();
        let socket = spawn_socket(stream, framing, self.inner.config.read_timeout(), events_tx);

        if self.is_stopped() {
            reject(&socket, ControlSignal::ServerShutdown);
            return None;
        }
        let Some(id) = self.inner.table.insert(socket.clone(), self.inner.config.max_users) else {
            tracing::info!(
                conn = %socket.id(),
                max_users = self.inner.config.max_users,
                "server full, rejecting connection"
            );
            reject(&socket, ControlSignal::AccessDenied);
            return None;
        };

        tracing::info!(%id, conn = %socket.id(), "client connected");
        tokio::spawn(run_client(self.clone(), id, events));
        Some(id)
    }

    /// Queues a broadcast for the fan-out task.
    ///
    /// # Errors
    /// [`RoomError::Stopped`] once [`stop`](Self::stop) has been called.
    pub fn enqueue(&self, request: SendRequest) -> Result<(), RoomError> {
        if self.is_stopped() {
            return Err(RoomError::Stopped);
        }
        self.inner
            .dispatch
            .send(Dispatch::Send(request))
            .map_err(|_| RoomError::Stopped)
    }

    /// Shuts the relay down. Idempotent.
    ///
    /// Requests queued before this still go out. Then every client is
    /// sent [`ControlSignal::ServerShutdown`] and closed, and the fan-out
    /// task exits.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(clients = self.client_count(), "stopping relay");
        let _ = self.inner.dispatch.send(Dispatch::Stop);
    }
}

fn reject(socket: &SocketHandle, signal: ControlSignal) {
    socket.send(signal.to_bytes().to_vec());
    socket.finish();
}

async fn fan_out(table: Arc<ClientTable>, mut queue: mpsc::UnboundedReceiver<Dispatch>) {
    while let Some(item) = queue.recv().await {
        match item {
            Dispatch::Send(request) => {
                for socket in table.recipients(&request) {
                    socket.send(request.data.clone());
                }
            }
            Dispatch::Stop => {
                for socket in table.sockets() {
                    reject(&socket, ControlSignal::ServerShutdown);
                }
                break;
            }
        }
    }
    tracing::debug!("fan-out loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomcast_protocol::Visibility;
    use roomcast_transport::{ConnectionId, SocketCommand};

    fn attach(relay: &Relay, n: u64) -> (ClientId, mpsc::UnboundedReceiver<SocketCommand>) {
        let (socket, commands) = SocketHandle::channel(ConnectionId::new(n));
        let id = relay.table().insert(socket, 100).unwrap();
        (id, commands)
    }

    #[tokio::test]
    async fn test_requests_fan_out_in_order() {
        let relay = Relay::new(ServerConfig::default());
        let (a, _a_rx) = attach(&relay, 1);
        let (_b, mut b_rx) = attach(&relay, 2);

        for byte in [1u8, 2, 3] {
            relay
                .enqueue(SendRequest {
                    from: a,
                    to: None,
                    visibility: Visibility::Global,
                    data: vec![byte],
                    return_flag: false,
                })
                .unwrap();
        }
        for byte in [1u8, 2, 3] {
            assert_eq!(b_rx.recv().await, Some(SocketCommand::Send(vec![byte])));
        }
    }

    #[tokio::test]
    async fn test_stop_signals_and_finishes_every_client() {
        let relay = Relay::new(ServerConfig::default());
        let (_a, mut a_rx) = attach(&relay, 1);

        relay.stop();
        relay.stop();
        assert!(relay.is_stopped());
        assert_eq!(
            a_rx.recv().await,
            Some(SocketCommand::Send(ControlSignal::ServerShutdown.to_bytes().to_vec()))
        );
        assert_eq!(a_rx.recv().await, Some(SocketCommand::Finish));
        assert!(matches!(
            relay.enqueue(SendRequest::direct(ClientId(10), vec![])),
            Err(RoomError::Stopped)
        ));
    }
}
