//! End-to-end tests: real client sessions against a real server on
//! `127.0.0.1:0`.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use roomcast::prelude::*;
use roomcast::protocol::{SubMessages, pack_bulks};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Room(u16),
    Join(u16),
    Move(u16, u16, u16),
    Chat(String),
    Terminated(Option<ControlSignal>),
}

async fn start_server(config: ServerConfig) -> (ServerHandle, Vec<(TransportKind, SocketAddr)>) {
    let server = RoomcastServer::builder()
        .config(ServerConfig {
            bind_address: "127.0.0.1:0".into(),
            no_heartbeats: true,
            ..config
        })
        .build()
        .await
        .expect("server should bind");
    let addrs = server.local_addrs().unwrap();
    let handle = server.handle();
    tokio::spawn(server.run());
    (handle, addrs)
}

fn client_config(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        server_address: addr.to_string(),
        no_heartbeats: true,
        reconnect_delay: Duration::from_millis(100),
        ..ClientConfig::default()
    }
}

/// A session that enters `room` on open and reports what it sees.
fn client(config: ClientConfig, room: u16) -> (ClientHandle, mpsc::UnboundedReceiver<Seen>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut session = ClientSession::new(config).unwrap();
    let t = tx.clone();
    session.register_handler(move |_, p: RoomPacket| {
        let _ = t.send(Seen::Room(p.room_id));
    });
    let t = tx.clone();
    session.register_handler(move |_, p: JoinPacket| {
        let _ = t.send(Seen::Join(p.id));
    });
    let t = tx.clone();
    session.register_handler(move |_, p: MovePacket| {
        let _ = t.send(Seen::Move(p.id, p.x, p.y));
    });
    let t = tx.clone();
    session.register_handler(move |_, p: ChatPacket| {
        let _ = t.send(Seen::Chat(p.message));
    });
    session.register_system_handler(SystemEvent::Terminated, move |ctx| {
        let _ = tx.send(Seen::Terminated(ctx.termination_reason()));
    });
    session.register_system_handler(SystemEvent::Open, move |ctx| {
        ctx.send_packet_async(RoomPacket::new(room));
    });
    let handle = session.start();
    handle.connect();
    (handle, rx)
}

async fn expect(rx: &mut mpsc::UnboundedReceiver<Seen>, wanted: Seen) {
    tokio::time::timeout(WAIT, async {
        while let Some(seen) = rx.recv().await {
            if seen == wanted {
                return;
            }
        }
        panic!("channel closed before {wanted:?}");
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {wanted:?}"));
}

async fn wait_for_clients(handle: &ServerHandle, count: usize) {
    tokio::time::timeout(WAIT, async {
        while handle.client_count() != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("client count should settle");
}

#[tokio::test]
async fn test_two_clients_in_one_room() {
    let (server, addrs) = start_server(ServerConfig::default()).await;
    let addr = addrs[0].1;

    let (a, mut a_seen) = client(client_config(addr), 1);
    expect(&mut a_seen, Seen::Room(1)).await;

    let (b, mut b_seen) = client(client_config(addr), 1);
    expect(&mut b_seen, Seen::Room(1)).await;
    // B is brought up to date on A; A hears about B.
    expect(&mut b_seen, Seen::Join(10)).await;
    expect(&mut a_seen, Seen::Join(11)).await;

    a.send_packet(MovePacket::new(0, 5, 6));
    expect(&mut b_seen, Seen::Move(10, 5, 6)).await;

    b.send_packet(NamePacket::new("bo"));
    expect(&mut a_seen, Seen::Chat("*** id:11 bo joined the server.".into())).await;

    b.disconnect();
    expect(&mut a_seen, Seen::Chat("*** id:11 bo left the server.".into())).await;
    wait_for_clients(&server, 1).await;
    server.stop();
}

#[tokio::test]
async fn test_full_server_terminates_newcomer() {
    let (server, addrs) = start_server(ServerConfig {
        max_users: 1,
        ..ServerConfig::default()
    })
    .await;
    let addr = addrs[0].1;

    let (_a, mut a_seen) = client(client_config(addr), 1);
    expect(&mut a_seen, Seen::Room(1)).await;

    let (b, mut b_seen) = client(client_config(addr), 1);
    expect(&mut b_seen, Seen::Terminated(Some(ControlSignal::AccessDenied))).await;
    assert!(!b.is_active());
    assert_eq!(server.client_count(), 1);
    server.stop();
}

#[tokio::test]
async fn test_stop_terminates_clients_and_run() {
    let server = RoomcastServer::builder()
        .bind("127.0.0.1:0")
        .build()
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let handle = server.handle();
    let running = tokio::spawn(server.run());

    let (client, mut seen) = client(client_config(addr), 3);
    expect(&mut seen, Seen::Room(3)).await;

    handle.stop();
    expect(&mut seen, Seen::Terminated(Some(ControlSignal::ServerShutdown))).await;
    assert!(!client.is_active());
    let result = tokio::time::timeout(WAIT, running)
        .await
        .expect("run should return after stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_websocket_listener_speaks_rfc6455() {
    let (server, addrs) = start_server(ServerConfig {
        websocket_address: Some("127.0.0.1:0".into()),
        ..ServerConfig::default()
    })
    .await;
    let (kind, ws_addr) = addrs[1];
    assert_eq!(kind, TransportKind::WebSocket);

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{ws_addr}/"))
        .await
        .expect("handshake should succeed");
    let bulk = pack_bulks([RoomPacket::new(4).to_bytes(), HeartbeatPacket.to_bytes()], 4096);
    ws.send(tungstenite::Message::Binary(bulk[0].clone().into()))
        .await
        .unwrap();

    let reply = tokio::time::timeout(WAIT, ws.next())
        .await
        .expect("server should answer")
        .unwrap()
        .unwrap();
    let data = reply.into_data();
    let packets: Vec<Packet> = SubMessages::new(&data)
        .map(|sub| Packet::from_payload(sub.unwrap()).unwrap())
        .collect();
    assert_eq!(
        packets,
        vec![Packet::from(RoomPacket::new(4)), Packet::from(HeartbeatPacket)]
    );
    server.stop();
}

#[tokio::test]
async fn test_session_over_websocket_meets_tcp_session() {
    let (server, addrs) = start_server(ServerConfig {
        websocket_address: Some("127.0.0.1:0".into()),
        ..ServerConfig::default()
    })
    .await;

    let (tcp, mut tcp_seen) = client(client_config(addrs[0].1), 7);
    expect(&mut tcp_seen, Seen::Room(7)).await;

    let ws_config = ClientConfig {
        transport: TransportKind::WebSocket,
        ..client_config(addrs[1].1)
    };
    let (_ws, mut ws_seen) = client(ws_config, 7);
    expect(&mut ws_seen, Seen::Join(10)).await;

    tcp.send_packet(MovePacket::new(0, 1, 2));
    expect(&mut ws_seen, Seen::Move(10, 1, 2)).await;
    server.stop();
}
