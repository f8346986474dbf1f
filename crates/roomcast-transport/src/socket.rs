//! The per-socket event loop.
//!
//! Every socket is owned by exactly one Tokio task. Nothing else touches
//! the stream: other tasks talk to it through a [`SocketHandle`], which
//! queues [`SocketCommand`]s on an unbounded channel, and hear back
//! through [`SocketEvent`]s on a channel supplied by the owner.
//!
//! ```text
//!   session task                       socket task
//!  ┌────────────┐   SocketCommand    ┌──────────────────────┐
//!  │ SocketHandle├──────────────────▶│ framing + TcpStream  │
//!  │            │◀──────────────────┤                      │
//!  └────────────┘   SocketEvent      └──────────────────────┘
//! ```
//!
//! Because one task does all reads and writes, two producers can never
//! interleave partial writes on the same stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::framing::{FrameEvent, Framing};
use crate::{ConnectionId, SocketEvent, TransportError, TransportKind, socks5};

/// Sends beyond this many unwritten messages are dropped.
pub const MAX_PENDING_WRITES: usize = 100;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// A request for the socket task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketCommand {
    /// Frame and write one message.
    Send(Vec<u8>),
    /// Close now. Queued sends behind this are discarded.
    Close,
    /// Close once the transport is open and everything queued before
    /// this command has been written.
    Finish,
}

// ---------------------------------------------------------------------------
// SocketHandle
// ---------------------------------------------------------------------------

/// Cloneable handle to a socket task.
///
/// All methods are non-blocking and safe to call from any task. Once the
/// socket task has exited they quietly do nothing.
#[derive(Debug, Clone)]
pub struct SocketHandle {
    id: ConnectionId,
    commands: mpsc::UnboundedSender<SocketCommand>,
    pending: Arc<AtomicUsize>,
}

impl SocketHandle {
    /// Creates a handle and the receiving end of its command channel.
    ///
    /// The socket tasks in this crate use this internally. It is public
    /// so that sessions can be driven in memory, without a real socket.
    pub fn channel(id: ConnectionId) -> (Self, mpsc::UnboundedReceiver<SocketCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            id,
            commands: tx,
            pending: Arc::new(AtomicUsize::new(0)),
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues one message for sending.
    ///
    /// Returns `false` when the message was dropped, either because
    /// [`MAX_PENDING_WRITES`] messages are already waiting or because the
    /// socket is gone.
    pub fn send(&self, data: Vec<u8>) -> bool {
        if self.pending.load(Ordering::Acquire) >= MAX_PENDING_WRITES {
            tracing::debug!(id = %self.id, "send queue full, dropping message");
            return false;
        }
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.commands.send(SocketCommand::Send(data)).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        true
    }

    /// Asks the socket to close. Idempotent.
    pub fn close(&self) {
        let _ = self.commands.send(SocketCommand::Close);
    }

    /// Asks the socket to close after writing what is already queued.
    pub fn finish(&self) {
        let _ = self.commands.send(SocketCommand::Finish);
    }

    /// True once the socket task has exited.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

// ---------------------------------------------------------------------------
// Spawning
// ---------------------------------------------------------------------------

/// Starts a socket task on an already connected stream.
///
/// `read_timeout` closes the socket when nothing arrives for that long;
/// `None` waits forever.
pub fn spawn_socket<S, F>(
    stream: S,
    framing: F,
    read_timeout: Option<Duration>,
    events: mpsc::UnboundedSender<SocketEvent>,
) -> SocketHandle
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: Framing,
{
    let (handle, commands) = SocketHandle::channel(ConnectionId::next());
    let task = SocketTask::new(&handle, stream, framing, read_timeout, commands, events);
    tokio::spawn(task.run());
    handle
}

/// Where and how a client connects.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub kind: TransportKind,
    /// SOCKS5 proxy to tunnel through, if any.
    pub proxy: Option<(String, u16)>,
    pub read_timeout: Option<Duration>,
    /// Request path for the WebSocket handshake.
    pub websocket_path: String,
}

impl ConnectOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            kind: TransportKind::Tcp,
            proxy: None,
            read_timeout: None,
            websocket_path: "/".into(),
        }
    }
}

/// Connects in the background and returns the handle immediately.
///
/// A failure to reach the server (or proxy, or a refused SOCKS5
/// handshake) is reported as [`SocketEvent::ConnectFailed`], distinct
/// from the [`SocketEvent::Close`] of a connection that did open.
pub fn connect(options: ConnectOptions, events: mpsc::UnboundedSender<SocketEvent>) -> SocketHandle {
    let (handle, commands) = SocketHandle::channel(ConnectionId::next());
    let task_handle = handle.clone();
    tokio::spawn(async move {
        let id = task_handle.id();
        match open_stream(&options).await {
            Ok(stream) => {
                let framing =
                    options.kind.client_framing(&options.host, options.port, &options.websocket_path);
                SocketTask::new(&task_handle, stream, framing, options.read_timeout, commands, events)
                    .run()
                    .await;
            }
            Err(e) => {
                tracing::warn!(%id, host = %options.host, port = options.port, error = %e, "connect failed");
                let _ = events.send(SocketEvent::ConnectFailed(id));
            }
        }
    });
    handle
}

async fn open_stream(options: &ConnectOptions) -> Result<TcpStream, TransportError> {
    let stream = match &options.proxy {
        Some((proxy_host, proxy_port)) => {
            let mut stream = TcpStream::connect((proxy_host.as_str(), *proxy_port))
                .await
                .map_err(TransportError::ConnectFailed)?;
            let limit = options.read_timeout.unwrap_or(socks5::DEFAULT_HANDSHAKE_TIMEOUT);
            socks5::handshake_within(&mut stream, &options.host, options.port, limit).await?;
            stream
        }
        None => TcpStream::connect((options.host.as_str(), options.port))
            .await
            .map_err(TransportError::ConnectFailed)?,
    };
    let _ = stream.set_nodelay(true);
    Ok(stream)
}

// ---------------------------------------------------------------------------
// SocketTask
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

struct SocketTask<S, F> {
    id: ConnectionId,
    stream: S,
    framing: F,
    read_timeout: Option<Duration>,
    commands: mpsc::UnboundedReceiver<SocketCommand>,
    pending: Arc<AtomicUsize>,
    events: mpsc::UnboundedSender<SocketEvent>,
    opened: bool,
    held: Vec<Vec<u8>>,
    finish_when_open: bool,
}

impl<S, F> SocketTask<S, F>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: Framing,
{
    fn new(
        handle: &SocketHandle,
        stream: S,
        framing: F,
        read_timeout: Option<Duration>,
        commands: mpsc::UnboundedReceiver<SocketCommand>,
        events: mpsc::UnboundedSender<SocketEvent>,
    ) -> Self {
        Self {
            id: handle.id,
            stream,
            framing,
            read_timeout,
            commands,
            pending: Arc::clone(&handle.pending),
            events,
            opened: false,
            held: Vec::new(),
            finish_when_open: false,
        }
    }

    async fn run(mut self) {
        let mut out = Vec::new();
        self.framing.start(&mut out);
        let mut flow = self.apply(out).await;

        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut deadline = self.read_timeout.map(|t| Instant::now() + t);

        while flow == Flow::Continue {
            flow = tokio::select! {
                read = read_until(&mut self.stream, &mut buf, deadline) => match read {
                    Ok(0) => {
                        tracing::debug!(id = %self.id, "peer closed the stream");
                        Flow::Stop
                    }
                    Ok(n) => {
                        deadline = self.read_timeout.map(|t| Instant::now() + t);
                        let mut out = Vec::new();
                        self.framing.decode(&buf[..n], &mut out);
                        self.apply(out).await
                    }
                    Err(e) => {
                        tracing::warn!(id = %self.id, error = %e, "closing socket");
                        Flow::Stop
                    }
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => {
                        self.close_locally().await;
                        Flow::Stop
                    }
                },
            };
        }

        let _ = self.stream.shutdown().await;
        let _ = self.events.send(SocketEvent::Close(self.id));
        tracing::debug!(id = %self.id, "socket closed");
    }

    /// Carries out what the framing asked for.
    async fn apply(&mut self, events: Vec<FrameEvent>) -> Flow {
        let mut flow = Flow::Continue;
        let mut messages = Vec::new();
        for event in events {
            match event {
                FrameEvent::Write(bytes) => {
                    if !self.write(&bytes).await {
                        flow = Flow::Stop;
                        break;
                    }
                }
                FrameEvent::Opened => {
                    self.opened = true;
                    let _ = self.events.send(SocketEvent::Open(self.id));
                    for data in std::mem::take(&mut self.held) {
                        self.write_message(&data).await;
                    }
                    if self.finish_when_open {
                        self.close_locally().await;
                        flow = Flow::Stop;
                    }
                }
                FrameEvent::Message(message) => messages.push(message),
                FrameEvent::Closed => flow = Flow::Stop,
            }
        }
        if !messages.is_empty() {
            let _ = self.events.send(SocketEvent::Messages(self.id, messages));
        }
        flow
    }

    async fn on_command(&mut self, command: SocketCommand) -> Flow {
        match command {
            SocketCommand::Send(data) => {
                self.pending.fetch_sub(1, Ordering::AcqRel);
                if !self.opened {
                    if self.held.len() < MAX_PENDING_WRITES {
                        self.held.push(data);
                    }
                    return Flow::Continue;
                }
                if self.write_message(&data).await {
                    Flow::Continue
                } else {
                    Flow::Stop
                }
            }
            SocketCommand::Close => {
                self.close_locally().await;
                Flow::Stop
            }
            SocketCommand::Finish if self.opened => {
                self.close_locally().await;
                Flow::Stop
            }
            SocketCommand::Finish => {
                self.finish_when_open = true;
                Flow::Continue
            }
        }
    }

    /// Frames and writes one message. Returns `false` if the stream broke;
    /// a message the framing refuses is dropped without closing.
    async fn write_message(&mut self, data: &[u8]) -> bool {
        match self.framing.encode(data) {
            Ok(frame) => self.write(&frame).await,
            Err(e) => {
                tracing::warn!(id = %self.id, error = %e, "dropping unsendable message");
                true
            }
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> bool {
        match self.stream.write_all(bytes).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(id = %self.id, error = %TransportError::SendFailed(e), "write failed");
                false
            }
        }
    }

    async fn close_locally(&mut self) {
        if let Some(frame) = self.framing.close() {
            let _ = self.stream.write_all(&frame).await;
        }
    }
}

async fn read_until<S>(
    stream: &mut S,
    buf: &mut [u8],
    deadline: Option<Instant>,
) -> Result<usize, TransportError>
where
    S: AsyncRead + Unpin,
{
    let read = stream.read(buf);
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, read)
            .await
            .map_err(|_| TransportError::ReadTimeout)?
            .map_err(TransportError::ReceiveFailed),
        None => read.await.map_err(TransportError::ReceiveFailed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::LengthPrefixed;

    #[test]
    fn test_send_queue_is_bounded() {
        let (handle, mut rx) = SocketHandle::channel(ConnectionId::new(1));
        for _ in 0..MAX_PENDING_WRITES {
            assert!(handle.send(vec![1]));
        }
        assert!(!handle.send(vec![2]));
        assert_eq!(rx.try_recv().unwrap(), SocketCommand::Send(vec![1]));
    }

    #[test]
    fn test_handle_after_task_exit() {
        let (handle, rx) = SocketHandle::channel(ConnectionId::new(2));
        drop(rx);
        assert!(handle.is_closed());
        assert!(!handle.send(vec![1]));
        handle.close();
    }

    #[tokio::test]
    async fn test_duplex_round_trip() {
        let (a, mut b) = tokio::io::duplex(1024);
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let handle = spawn_socket(a, LengthPrefixed::new(), None, events_tx);

        assert_eq!(events.recv().await, Some(SocketEvent::Open(handle.id())));

        handle.send(b"ping".to_vec());
        let mut frame = [0u8; 6];
        b.read_exact(&mut frame).await.unwrap();
        assert_eq!(&frame, b"\x00\x04ping");

        b.write_all(b"\x00\x02hi\x00\x00\x00\x03you").await.unwrap();
        let mut received = Vec::new();
        while received.len() < 2 {
            match events.recv().await {
                Some(SocketEvent::Messages(_, batch)) => received.extend(batch),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(received, vec![b"hi".to_vec(), b"you".to_vec()]);

        handle.close();
        assert_eq!(events.recv().await, Some(SocketEvent::Close(handle.id())));
    }

    #[tokio::test]
    async fn test_finish_writes_queued_messages_first() {
        let (a, mut b) = tokio::io::duplex(1024);
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let handle = spawn_socket(a, LengthPrefixed::new(), None, events_tx);
        handle.send(b"bye".to_vec());
        handle.finish();

        let mut all = Vec::new();
        b.read_to_end(&mut all).await.unwrap();
        assert_eq!(all, b"\x00\x03bye");
        assert_eq!(events.recv().await, Some(SocketEvent::Open(handle.id())));
        assert_eq!(events.recv().await, Some(SocketEvent::Close(handle.id())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout_closes_socket() {
        let (a, _b) = tokio::io::duplex(64);
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let handle = spawn_socket(a, LengthPrefixed::new(), Some(Duration::from_secs(6)), events_tx);
        assert_eq!(events.recv().await, Some(SocketEvent::Open(handle.id())));
        // The paused clock auto-advances to the deadline.
        assert_eq!(events.recv().await, Some(SocketEvent::Close(handle.id())));
    }
}
