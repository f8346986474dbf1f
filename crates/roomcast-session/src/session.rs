//! The client session: one logical connection to one relay server.
//!
//! # Tasks
//!
//! ```text
//!             ClientHandle (any task)
//!                  │ lock
//!                  ▼
//!   ┌──────────── Shared ────────────┐
//!   │ flags, socket, outgoing queue  │
//!   └────────────────────────────────┘
//!        ▲                    ▲
//!        │                    │
//!   driver task          heartbeat task
//!   (SocketEvents →      (every interval while
//!    handlers, flush,     active and connected)
//!    reconnect)
//! ```
//!
//! The driver owns the handler registry outright, so handlers never run
//! while the shared lock is held and may freely send from inside.
//!
//! # States
//!
//! ```text
//! idle ──open()──▶ connecting ──Open──▶ connected
//!   ▲                  │                   │
//!   └──────────────────┴── Close / failed ─┘ (reconnect if active)
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use roomcast_protocol::{
    ConfigPacket, Connection, ControlSignal, HeartbeatPacket, Message, SyncConfig, SystemEvent,
};
use roomcast_transport::{ConnectOptions, ConnectionId, SocketEvent, SocketHandle, connect};
use tokio::sync::mpsc;

use crate::{ClientConfig, OutgoingQueue, ReconnectScheduler, SessionError};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct State {
    active: bool,
    connecting: bool,
    connected: bool,
    socket: Option<SocketHandle>,
    queue: OutgoingQueue,
    termination: Option<ControlSignal>,
    sync_config: SyncConfig,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    options: ConnectOptions,
    events: mpsc::UnboundedSender<SocketEvent>,
    reconnect: ReconnectScheduler,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// ClientHandle
// ---------------------------------------------------------------------------

/// Cheap, cloneable control surface of a running session.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    shared: Arc<Shared>,
}

impl ClientHandle {
    /// Starts a connection attempt. Does nothing if one is already open
    /// or in progress.
    pub fn open(&self) {
        let mut state = self.shared.state();
        if state.connected || state.connecting {
            return;
        }
        state.connecting = true;
        let socket = connect(self.shared.options.clone(), self.shared.events.clone());
        tracing::info!(
            id = %socket.id(),
            host = %self.shared.options.host,
            port = self.shared.options.port,
            transport = %self.shared.options.kind,
            "connecting"
        );
        state.socket = Some(socket);
    }

    /// Tears the connection down and discards every queued packet.
    ///
    /// Packets queued for the old connection are stale by definition;
    /// none of them reach a later one.
    pub fn close(&self) {
        let mut state = self.shared.state();
        if let Some(socket) = state.socket.take() {
            socket.close();
        }
        state.connecting = false;
        state.connected = false;
        state.queue.clear();
    }

    /// Marks the session active and opens it. An active session
    /// reconnects by itself after losing the connection.
    pub fn connect(&self) {
        {
            let mut state = self.shared.state();
            state.active = true;
            state.termination = None;
        }
        self.open();
    }

    /// Marks the session inactive and closes it.
    pub fn disconnect(&self) {
        self.shared.state().active = false;
        self.close();
    }

    /// Queues a packet for the next flush.
    pub fn send_packet_async<M: Message>(&self, packet: M) {
        self.shared.state().queue.push(&packet);
    }

    /// Queues a packet and flushes right away.
    pub fn send_packet<M: Message>(&self, packet: M) {
        self.send_packet_async(packet);
        self.flush();
    }

    /// Sends everything queued, in order, as size-bounded bulks.
    ///
    /// While not connected the queue is emptied and nothing is sent.
    pub fn flush(&self) {
        let mut state = self.shared.state();
        let bulks = state.queue.take_bulks();
        if !state.connected {
            if !bulks.is_empty() {
                tracing::trace!(bulks = bulks.len(), "dropping sends while offline");
            }
            return;
        }
        if let Some(socket) = state.socket.as_ref() {
            for bulk in bulks {
                socket.send(bulk);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.state().active
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state().connected
    }

    pub fn is_connecting(&self) -> bool {
        self.shared.state().connecting
    }

    /// Number of packets waiting for a flush.
    pub fn queued(&self) -> usize {
        self.shared.state().queue.len()
    }

    /// Why the server ended the session, if it did.
    pub fn termination_reason(&self) -> Option<ControlSignal> {
        self.shared.state().termination
    }

    /// The picture and virtual 3D settings the server has pushed.
    pub fn sync_config(&self) -> SyncConfig {
        self.shared.state().sync_config.clone()
    }

    fn is_current(&self, id: ConnectionId) -> bool {
        self.shared
            .state()
            .socket
            .as_ref()
            .is_some_and(|socket| socket.id() == id)
    }

    /// A fresh connection starts from an empty queue.
    fn mark_connected(&self) {
        let mut state = self.shared.state();
        state.connecting = false;
        state.connected = true;
        state.queue.clear();
    }

    fn mark_disconnected(&self) {
        let mut state = self.shared.state();
        state.socket = None;
        state.connecting = false;
        state.connected = false;
    }

    fn terminate(&self, signal: ControlSignal) {
        {
            let mut state = self.shared.state();
            state.active = false;
            state.termination = Some(signal);
        }
        self.close();
    }

    fn schedule_reconnect(&self) {
        if !self.is_active() {
            return;
        }
        let check = Arc::downgrade(&self.shared);
        let reopen = Arc::downgrade(&self.shared);
        self.shared.reconnect.schedule(
            move || check.upgrade().is_some_and(|shared| shared.state().active),
            move || {
                if let Some(shared) = reopen.upgrade() {
                    ClientHandle { shared }.open();
                }
            },
        );
    }

    fn downgrade(&self) -> Weak<Shared> {
        Arc::downgrade(&self.shared)
    }
}

// ---------------------------------------------------------------------------
// ClientContext
// ---------------------------------------------------------------------------

/// What every client handler receives.
#[derive(Debug)]
pub struct ClientContext {
    handle: ClientHandle,
}

impl ClientContext {
    pub fn handle(&self) -> &ClientHandle {
        &self.handle
    }

    /// Queues a packet; it leaves when the current batch is done.
    pub fn send_packet_async<M: Message>(&self, packet: M) {
        self.handle.send_packet_async(packet);
    }

    pub fn termination_reason(&self) -> Option<ControlSignal> {
        self.handle.termination_reason()
    }

    /// Records a CONFIG push. A custom [`ConfigPacket`] handler should
    /// call this to keep [`ClientHandle::sync_config`] current.
    pub fn apply_sync_config(&self, packet: &ConfigPacket) {
        self.handle.shared.state().sync_config.apply(packet);
    }
}

// ---------------------------------------------------------------------------
// ClientSession
// ---------------------------------------------------------------------------

/// A client session being set up.
///
/// Register handlers, then call [`start`](Self::start) to get the
/// [`ClientHandle`] used for everything else.
///
/// ```no_run
/// # use roomcast_session::{ClientConfig, ClientSession};
/// # use roomcast_protocol::{MovePacket, NamePacket, SystemEvent};
/// # async fn demo() -> Result<(), roomcast_session::SessionError> {
/// let mut session = ClientSession::new(ClientConfig::default())?;
/// session.register_handler(|_ctx, packet: MovePacket| {
///     println!("player {} moved to {},{}", packet.id, packet.x, packet.y);
/// });
/// session.register_system_handler(SystemEvent::Open, |ctx| {
///     ctx.send_packet_async(NamePacket::new("alex"));
/// });
/// let client = session.start();
/// client.connect();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ClientSession {
    config: ClientConfig,
    options: ConnectOptions,
    connection: Connection<ClientContext>,
}

impl ClientSession {
    /// # Errors
    /// Returns an error if the configured addresses do not parse.
    pub fn new(config: ClientConfig) -> Result<Self, SessionError> {
        let options = config.connect_options()?;
        let mut connection = Connection::new();
        connection.register_handler(|ctx: &mut ClientContext, packet: ConfigPacket| {
            ctx.apply_sync_config(&packet);
        });
        Ok(Self {
            config,
            options,
            connection,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn register_handler<M, F>(&mut self, handler: F) -> &mut Self
    where
        M: Message,
        F: FnMut(&mut ClientContext, M) + Send + 'static,
    {
        self.connection.register_handler(handler);
        self
    }

    pub fn register_system_handler<F>(&mut self, event: SystemEvent, handler: F) -> &mut Self
    where
        F: FnMut(&mut ClientContext) + Send + 'static,
    {
        self.connection.register_system_handler(event, handler);
        self
    }

    /// Spawns the driver (and heartbeat) tasks. The session starts idle;
    /// call [`ClientHandle::connect`] to go online.
    ///
    /// Must be called inside a Tokio runtime. The tasks end once every
    /// handle has been dropped.
    pub fn start(self) -> ClientHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let handle = ClientHandle {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                options: self.options,
                events: events_tx,
                reconnect: ReconnectScheduler::new(self.config.reconnect_delay),
            }),
        };

        tokio::spawn(drive(handle.downgrade(), events_rx, self.connection));
        if !self.config.no_heartbeats {
            tokio::spawn(heartbeat(handle.downgrade(), self.config.heartbeat_interval));
        }
        handle
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

async fn drive(
    shared: Weak<Shared>,
    mut events: mpsc::UnboundedReceiver<SocketEvent>,
    mut connection: Connection<ClientContext>,
) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let handle = ClientHandle { shared };
        if !handle.is_current(event.id()) {
            tracing::trace!(id = %event.id(), "ignoring event from superseded socket");
            continue;
        }
        let mut ctx = ClientContext {
            handle: handle.clone(),
        };

        match event {
            SocketEvent::Open(id) => {
                tracing::info!(%id, "connected");
                handle.mark_connected();
                connection.dispatch_system(&mut ctx, SystemEvent::Open);
                handle.flush();
            }
            SocketEvent::Messages(id, messages) => {
                let mut terminated = false;
                for message in messages {
                    if let Some(signal) = ControlSignal::parse(&message) {
                        tracing::info!(%id, reason = %signal, "session terminated by server");
                        handle.terminate(signal);
                        connection.dispatch_system(&mut ctx, SystemEvent::Terminated);
                        terminated = true;
                        break;
                    }
                    connection.dispatch(&mut ctx, &message);
                }
                if !terminated {
                    connection.dispatch_system(&mut ctx, SystemEvent::EndOfBatch);
                    handle.flush();
                }
            }
            SocketEvent::Close(id) | SocketEvent::ConnectFailed(id) => {
                tracing::info!(%id, "disconnected");
                handle.mark_disconnected();
                connection.dispatch_system(&mut ctx, SystemEvent::Close);
                handle.schedule_reconnect();
            }
        }
    }
    tracing::debug!("client driver stopped");
}

async fn heartbeat(shared: Weak<Shared>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let handle = ClientHandle { shared };
        let due = {
            let state = handle.shared.state();
            state.active && state.connected
        };
        if due {
            tracing::trace!("sending heartbeat");
            handle.send_packet(HeartbeatPacket);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomcast_protocol::MovePacket;

    fn unreachable_config() -> ClientConfig {
        ClientConfig {
            // Reserved port; nothing listens there.
            server_address: "127.0.0.1:9".into(),
            no_heartbeats: true,
            ..ClientConfig::default()
        }
    }

    #[tokio::test]
    async fn test_starts_idle() {
        let client = ClientSession::new(unreachable_config()).unwrap().start();
        assert!(!client.is_active());
        assert!(!client.is_connected());
        assert!(!client.is_connecting());
        assert_eq!(client.termination_reason(), None);
    }

    #[tokio::test]
    async fn test_flush_while_offline_drops_queue() {
        let client = ClientSession::new(unreachable_config()).unwrap().start();
        client.send_packet_async(MovePacket::new(0, 3, 4));
        assert_eq!(client.queued(), 1);
        client.flush();
        assert_eq!(client.queued(), 0);

        client.send_packet(MovePacket::new(0, 5, 6));
        assert_eq!(client.queued(), 0);

        client.send_packet_async(MovePacket::new(0, 7, 8));
        client.close();
        assert_eq!(client.queued(), 0);
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let client = ClientSession::new(unreachable_config()).unwrap().start();
        client.open();
        let first = client.shared.state().socket.as_ref().map(SocketHandle::id);
        client.open();
        let second = client.shared.state().socket.as_ref().map(SocketHandle::id);
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn test_bad_config_is_rejected() {
        let config = ClientConfig {
            server_address: String::new(),
            ..ClientConfig::default()
        };
        assert!(ClientSession::new(config).is_err());
    }
}
