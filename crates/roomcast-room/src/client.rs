//! The server side of one connected client.
//!
//! Each client runs on its own task. Packets it sends are dispatched to
//! the handlers below, which update its cached [`LastState`] and queue
//! relayed copies in three scopes. When a delivery has been dispatched
//! the scopes are flushed to the fan-out queue: global, then local, then
//! self.
//!
//! [`LastState`]: crate::LastState

use roomcast_protocol::{
    ChatKind, ChatPacket, Connection, ErasePicturePacket, FacingPacket, FlashPacket,
    HasPlayerId, HeartbeatPacket, HiddenPacket, JoinPacket, JumpPacket, LeavePacket,
    MAX_BULK_SIZE, Message, MovePacket, MovePicturePacket, NamePacket, RemoveRepeatingFlashPacket,
    RepeatingFlashPacket, RoomPacket, ShowBattleAnimationPacket, ShowPicturePacket,
    SoundEffectPacket, SpeedPacket, SpritePacket, SystemEvent, SystemGraphicPacket,
    TeleportPacket, Visibility, pack_bulks,
};
use roomcast_transport::SocketEvent;
use tokio::sync::mpsc;

use crate::{ClientEntry, ClientId, Relay, SendRequest};

/// Name shown in chat for a client that never sent one.
pub const UNKNOWN_NAME: &str = "<unknown>";

/// Handler context for one connected client.
#[derive(Debug)]
pub struct ServerClient {
    id: ClientId,
    relay: Relay,
    /// Whether the "joined the server" notice went out.
    join_sent: bool,
    global: Vec<Vec<u8>>,
    local: Vec<Vec<u8>>,
    direct: Vec<Vec<u8>>,
}

impl ServerClient {
    pub fn new(relay: Relay, id: ClientId) -> Self {
        Self {
            id,
            relay,
            join_sent: false,
            global: Vec::new(),
            local: Vec::new(),
            direct: Vec::new(),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn join_sent(&self) -> bool {
        self.join_sent
    }

    fn with_entry<R>(&self, f: impl FnOnce(&mut ClientEntry) -> R) -> Option<R> {
        self.relay.table().with_client(self.id, f)
    }

    fn send_global_async<M: Message>(&mut self, packet: &M) {
        self.global.push(packet.to_bytes());
    }

    fn send_local_async<M: Message>(&mut self, packet: &M) {
        self.local.push(packet.to_bytes());
    }

    fn send_self_async<M: Message>(&mut self, packet: &M) {
        self.direct.push(packet.to_bytes());
    }

    /// Stamps a player packet with this client's id and queues it for the
    /// room.
    fn relay_local<M: Message + HasPlayerId>(&mut self, packet: M) {
        let packet = packet.with_player_id(self.id.0);
        self.send_local_async(&packet);
    }

    /// Sends one packet right away, ahead of anything still queued.
    fn send_now<M: Message>(&self, visibility: Visibility, packet: &M, return_flag: bool) {
        self.submit(SendRequest {
            from: self.id,
            to: None,
            visibility,
            data: packet.to_bytes(),
            return_flag,
        });
    }

    fn submit(&self, request: SendRequest) {
        if let Err(e) = self.relay.enqueue(request) {
            tracing::debug!(id = %self.id, error = %e, "dropping relayed packets");
        }
    }

    /// A server notice to everyone, this client included.
    fn announce(&self, room_id: u16, message: String) {
        let notice = ChatPacket {
            id: self.id.0,
            kind: ChatKind::Info,
            visibility: Visibility::Global,
            room_id,
            message,
            ..ChatPacket::default()
        };
        self.send_now(Visibility::Global, &notice, true);
    }

    fn notice_text(&self, name: &str, what: &str) -> String {
        if name.is_empty() {
            format!("*** id:{} {what} the server.", self.id)
        } else {
            format!("*** id:{} {name} {what} the server.", self.id)
        }
    }

    /// Moves the three scope queues to the fan-out queue, bulked.
    ///
    /// Local sends go to the room the client is in now, not the room it
    /// was in when each packet was queued.
    pub fn flush(&mut self) {
        let room_id = self.with_entry(|c| c.room_id);
        let scopes = [
            (Visibility::Global, std::mem::take(&mut self.global), None),
            (Visibility::Local, std::mem::take(&mut self.local), room_id),
            (Visibility::Null, std::mem::take(&mut self.direct), None),
        ];
        for (visibility, queue, to) in scopes {
            if queue.is_empty() {
                continue;
            }
            for bulk in pack_bulks(queue, MAX_BULK_SIZE) {
                self.submit(SendRequest {
                    from: self.id,
                    to,
                    visibility,
                    data: bulk,
                    return_flag: visibility == Visibility::Null,
                });
            }
        }
    }

    fn on_room(&mut self, packet: RoomPacket) {
        let id = self.id.0;
        let Some((last, name)) = self.with_entry(|c| {
            c.last.clear_pictures();
            c.room_id = packet.room_id;
            (c.last.clone(), c.name.clone())
        }) else {
            return;
        };
        tracing::debug!(id = %self.id, room_id = packet.room_id, "client changed room");

        self.send_global_async(&LeavePacket { id });
        self.send_self_async(&packet);
        let replay = self.relay.table().room_replay(self.id, packet.room_id);
        self.direct.extend(replay);

        self.send_local_async(&JoinPacket { id });
        self.send_local_async(&last.position.with_player_id(id));
        self.send_local_async(&last.facing.with_player_id(id));
        self.send_local_async(&last.sprite.with_player_id(id));
        if !name.is_empty() {
            self.send_local_async(&NamePacket { id, name });
        }
        if !last.system.name.is_empty() {
            self.send_local_async(&last.system.with_player_id(id));
        }
    }

    fn on_name(&mut self, packet: NamePacket) {
        let name = packet.name;
        let Some(room_id) = self.with_entry(|c| {
            c.name = name.clone();
            c.room_id
        }) else {
            return;
        };
        if self.join_sent {
            return;
        }
        self.announce(room_id, self.notice_text(&name, "joined"));
        tracing::info!(id = %self.id, room_id, %name, "client joined the server");
        for config in self.relay.config().sync_packets() {
            self.send_self_async(&config);
        }
        self.join_sent = true;
    }

    fn on_chat(&mut self, mut packet: ChatPacket) {
        let Some((room_id, name, sys_name)) =
            self.with_entry(|c| (c.room_id, c.name.clone(), c.last.system.name.clone()))
        else {
            return;
        };
        packet.id = self.id.0;
        packet.kind = ChatKind::Chat;
        packet.room_id = room_id;
        packet.name = if name.is_empty() { UNKNOWN_NAME.to_string() } else { name };
        packet.sys_name = sys_name;

        match packet.visibility {
            Visibility::Local | Visibility::Global => {
                tracing::info!(
                    id = %self.id,
                    visibility = %packet.visibility,
                    room_id,
                    name = %packet.name,
                    message = %packet.message,
                    "chat"
                );
                self.send_now(packet.visibility, &packet, true);
            }
            // A non-zero hash sets the group. Zero sends to it.
            Visibility::Crypt if packet.crypt_key_hash != 0 => {
                let hash = packet.crypt_key_hash;
                self.with_entry(|c| c.crypt_key_hash = hash);
                tracing::info!(id = %self.id, crypt_key_hash = hash, "crypt key updated");
            }
            Visibility::Crypt => self.send_now(Visibility::Crypt, &packet, true),
            Visibility::Null => {
                tracing::debug!(id = %self.id, "dropping chat without visibility");
            }
        }
    }

    fn on_close(&mut self) {
        let Some((room_id, name)) = self.with_entry(|c| (c.room_id, c.name.clone())) else {
            return;
        };
        if self.join_sent {
            self.send_now(Visibility::Global, &LeavePacket { id: self.id.0 }, false);
            self.announce(room_id, self.notice_text(&name, "left"));
            tracing::info!(id = %self.id, room_id, %name, "client left the server");
        }
    }
}

/// The handler table every server-side client uses.
pub fn server_connection() -> Connection<ServerClient> {
    let mut conn = Connection::new();

    conn.register_handler(|c: &mut ServerClient, p: HeartbeatPacket| c.send_self_async(&p));
    conn.register_handler(ServerClient::on_room);
    conn.register_handler(ServerClient::on_name);
    conn.register_handler(ServerClient::on_chat);

    conn.register_handler(|c: &mut ServerClient, p: TeleportPacket| {
        c.with_entry(|e| {
            e.last.position.x = p.x;
            e.last.position.y = p.y;
        });
    });
    conn.register_handler(|c: &mut ServerClient, p: MovePacket| {
        let p = p.with_player_id(c.id.0);
        c.with_entry(|e| e.last.position = p);
        c.send_local_async(&p);
    });
    conn.register_handler(|c: &mut ServerClient, p: FacingPacket| {
        let p = p.with_player_id(c.id.0);
        c.with_entry(|e| e.last.facing = p);
        c.send_local_async(&p);
    });
    conn.register_handler(|c: &mut ServerClient, p: SpeedPacket| {
        let p = p.with_player_id(c.id.0);
        c.with_entry(|e| e.last.speed = p);
        c.send_local_async(&p);
    });
    conn.register_handler(|c: &mut ServerClient, p: SpritePacket| {
        let p = p.with_player_id(c.id.0);
        c.with_entry(|e| e.last.sprite = p.clone());
        c.send_local_async(&p);
    });
    conn.register_handler(|c: &mut ServerClient, p: RepeatingFlashPacket| {
        let p = p.with_player_id(c.id.0);
        c.with_entry(|e| e.last.repeating_flash = p);
        c.send_local_async(&p);
    });
    conn.register_handler(|c: &mut ServerClient, p: RemoveRepeatingFlashPacket| {
        c.with_entry(|e| e.last.repeating_flash.discard());
        c.relay_local(p);
    });
    conn.register_handler(|c: &mut ServerClient, p: HiddenPacket| {
        let p = p.with_player_id(c.id.0);
        c.with_entry(|e| e.last.hidden = p);
        c.send_local_async(&p);
    });
    conn.register_handler(|c: &mut ServerClient, p: SystemGraphicPacket| {
        let p = p.with_player_id(c.id.0);
        c.with_entry(|e| e.last.system = p.clone());
        c.send_local_async(&p);
    });
    conn.register_handler(|c: &mut ServerClient, p: ShowPicturePacket| {
        let p = p.with_player_id(c.id.0);
        c.with_entry(|e| e.last.show_picture(p.clone()));
        c.send_local_async(&p);
    });
    conn.register_handler(|c: &mut ServerClient, p: MovePicturePacket| {
        let p = p.with_player_id(c.id.0);
        c.with_entry(|e| e.last.move_picture(&p));
        c.send_local_async(&p);
    });
    conn.register_handler(|c: &mut ServerClient, p: ErasePicturePacket| {
        let p = p.with_player_id(c.id.0);
        c.with_entry(|e| e.last.erase_picture(p.pic_id));
        c.send_local_async(&p);
    });

    conn.register_handler(|c: &mut ServerClient, p: JumpPacket| c.relay_local(p));
    conn.register_handler(|c: &mut ServerClient, p: FlashPacket| c.relay_local(p));
    conn.register_handler(|c: &mut ServerClient, p: SoundEffectPacket| c.relay_local(p));
    conn.register_handler(|c: &mut ServerClient, p: ShowBattleAnimationPacket| c.relay_local(p));

    conn.register_system_handler(SystemEvent::EndOfBatch, ServerClient::flush);
    conn.register_system_handler(SystemEvent::Close, ServerClient::on_close);
    conn
}

/// Drives one client until its socket closes, then removes it.
pub(crate) async fn run_client(
    relay: Relay,
    id: ClientId,
    mut events: mpsc::UnboundedReceiver<SocketEvent>,
) {
    let mut conn = server_connection();
    let mut client = ServerClient::new(relay.clone(), id);

    while let Some(event) = events.recv().await {
        match event {
            SocketEvent::Open(_) => conn.dispatch_system(&mut client, SystemEvent::Open),
            SocketEvent::Messages(_, messages) => {
                for message in &messages {
                    conn.dispatch(&mut client, message);
                }
                conn.dispatch_system(&mut client, SystemEvent::EndOfBatch);
            }
            SocketEvent::Close(_) | SocketEvent::ConnectFailed(_) => break,
        }
    }

    conn.dispatch_system(&mut client, SystemEvent::Close);
    relay.table().remove(id);
    tracing::info!(%id, "client disconnected");
}
