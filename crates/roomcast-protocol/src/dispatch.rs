//! Handler registry and dispatch for one logical peer.
//!
//! A [`Connection`] does not own a socket. It is the routing table that
//! sits between "a transport message arrived" and "game code runs". The
//! session that owns it (client or server side) supplies the socket and
//! a context value `Ctx` that every handler receives mutably.
//!
//! # Lifecycle
//!
//! ```text
//! OPEN ──▶ (packets ... END_OF_BATCH)* ──▶ CLOSE | TERMINATED
//! ```
//!
//! [`SystemEvent`]s mark those transitions. `END_OF_BATCH` fires after
//! every transport delivery and is where sessions flush their outgoing
//! queues, so all sends raised while handling one incoming batch leave in
//! one outgoing write.

use std::collections::HashMap;

use crate::bulk::SubMessages;
use crate::codec::Reader;
use crate::packet::{Message, strip_marker};
use crate::types::PacketType;
use crate::ProtocolError;

/// Transport-level events a session reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemEvent {
    /// The transport is ready to carry packets.
    Open,
    /// The transport went away. A client may reconnect.
    Close,
    /// The peer ended the session on purpose. No reconnect.
    Terminated,
    /// One transport delivery has been fully dispatched.
    EndOfBatch,
}

impl SystemEvent {
    const COUNT: usize = 4;

    fn index(self) -> usize {
        match self {
            Self::Open => 0,
            Self::Close => 1,
            Self::Terminated => 2,
            Self::EndOfBatch => 3,
        }
    }
}

type PacketHandler<Ctx> =
    Box<dyn FnMut(&mut Ctx, &mut Reader<'_>) -> Result<(), ProtocolError> + Send>;
type SystemHandler<Ctx> = Box<dyn FnMut(&mut Ctx) + Send>;

/// Routes decoded packets and system events to registered callbacks.
pub struct Connection<Ctx> {
    handlers: HashMap<PacketType, PacketHandler<Ctx>>,
    system_handlers: [Option<SystemHandler<Ctx>>; SystemEvent::COUNT],
}

impl<Ctx> Connection<Ctx> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            system_handlers: std::array::from_fn(|_| None),
        }
    }

    /// Registers the handler for packets of type `M`, replacing any
    /// previous one.
    ///
    /// The packet is decoded from the wire only when a handler exists, so
    /// unhandled packet kinds cost nothing beyond skipping their bytes.
    pub fn register_handler<M, F>(&mut self, mut handler: F)
    where
        M: Message,
        F: FnMut(&mut Ctx, M) + Send + 'static,
    {
        self.handlers.insert(
            M::TYPE,
            Box::new(move |ctx, r| {
                let packet = M::decode(r)?;
                handler(ctx, packet);
                Ok(())
            }),
        );
    }

    /// Registers the handler for a system event, replacing any previous
    /// one.
    pub fn register_system_handler<F>(&mut self, event: SystemEvent, handler: F)
    where
        F: FnMut(&mut Ctx) + Send + 'static,
    {
        self.system_handlers[event.index()] = Some(Box::new(handler));
    }

    pub fn has_handler(&self, packet_type: PacketType) -> bool {
        self.handlers.contains_key(&packet_type)
    }

    /// Dispatches every sub-message in one received bulk.
    ///
    /// Unknown tags and packets without a handler are skipped; malformed
    /// packets are logged and dropped. None of these stop the remaining
    /// sub-messages from being dispatched. Returns how many handlers ran.
    pub fn dispatch(&mut self, ctx: &mut Ctx, bulk: &[u8]) -> usize {
        let mut delivered = 0;
        for sub in SubMessages::new(bulk) {
            let payload = match sub {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed bulk tail");
                    break;
                }
            };
            let Some((&tag, body)) = payload.split_first() else {
                tracing::debug!("skipping empty sub-message");
                continue;
            };
            let Some(packet_type) = PacketType::from_u8(tag) else {
                tracing::debug!(tag, "skipping unknown packet type");
                continue;
            };
            let Some(handler) = self.handlers.get_mut(&packet_type) else {
                tracing::trace!(packet = %packet_type, "no handler registered");
                continue;
            };
            let mut reader = Reader::new(strip_marker(body));
            match handler(ctx, &mut reader) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(packet = %packet_type, error = %e, "dropping malformed packet");
                }
            }
        }
        delivered
    }

    /// Runs the handler for a system event, if one is registered.
    pub fn dispatch_system(&mut self, ctx: &mut Ctx, event: SystemEvent) {
        if let Some(handler) = self.system_handlers[event.index()].as_mut() {
            handler(ctx);
        }
    }
}

impl<Ctx> Default for Connection<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Ctx> std::fmt::Debug for Connection<Ctx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut registered: Vec<_> = self.handlers.keys().copied().collect();
        registered.sort();
        f.debug_struct("Connection")
            .field("handlers", &registered)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::pack_bulks;
    use crate::packet::{FacingPacket, MovePacket, NamePacket, RoomPacket, SpeedPacket};

    #[derive(Default)]
    struct Log(Vec<String>);

    fn connection() -> Connection<Log> {
        let mut conn = Connection::new();
        conn.register_handler(|log: &mut Log, p: MovePacket| {
            log.0.push(format!("move {} {}", p.x, p.y));
        });
        conn.register_handler(|log: &mut Log, p: FacingPacket| {
            log.0.push(format!("facing {}", p.facing));
        });
        conn.register_handler(|log: &mut Log, p: NamePacket| {
            log.0.push(format!("name {}", p.name));
        });
        conn
    }

    #[test]
    fn test_dispatches_every_sub_message_in_order() {
        let mut conn = connection();
        let mut log = Log::default();
        let bulk = pack_bulks(
            [
                MovePacket::new(0, 1, 2).to_bytes(),
                FacingPacket::new(3).to_bytes(),
                NamePacket::new("alex").to_bytes(),
            ],
            4096,
        );
        assert_eq!(conn.dispatch(&mut log, &bulk[0]), 3);
        assert_eq!(log.0, ["move 1 2", "facing 3", "name alex"]);
    }

    #[test]
    fn test_unknown_and_unhandled_packets_are_skipped() {
        let mut conn = connection();
        let mut log = Log::default();
        let mut bulk = Vec::new();
        bulk.extend(crate::codec::serialize_string16(&[0x7f, 1, 2, 3, 0x28, 0x28]));
        bulk.extend(RoomPacket::new(5).to_bytes());
        bulk.extend(SpeedPacket::new(4).to_bytes());
        bulk.extend(FacingPacket::new(1).to_bytes());

        assert_eq!(conn.dispatch(&mut log, &bulk), 1);
        assert_eq!(log.0, ["facing 1"]);
    }

    #[test]
    fn test_malformed_packet_does_not_stop_batch() {
        let mut conn = connection();
        let mut log = Log::default();
        let mut bulk = Vec::new();
        // A move packet with its coordinates cut off.
        bulk.extend(crate::codec::serialize_string16(&[0x07, 0, 0, 0]));
        bulk.extend(FacingPacket::new(2).to_bytes());

        assert_eq!(conn.dispatch(&mut log, &bulk), 1);
        assert_eq!(log.0, ["facing 2"]);
    }

    #[test]
    fn test_system_events() {
        let mut conn = connection();
        conn.register_system_handler(SystemEvent::Open, |log: &mut Log| log.0.push("open".into()));
        conn.register_system_handler(SystemEvent::EndOfBatch, |log: &mut Log| {
            log.0.push("eob".into())
        });
        let mut log = Log::default();

        conn.dispatch_system(&mut log, SystemEvent::Open);
        conn.dispatch_system(&mut log, SystemEvent::Close); // nothing registered
        conn.dispatch_system(&mut log, SystemEvent::EndOfBatch);
        assert_eq!(log.0, ["open", "eob"]);
    }

    #[test]
    fn test_register_replaces_previous_handler() {
        let mut conn = connection();
        conn.register_handler(|log: &mut Log, _: FacingPacket| log.0.push("second".into()));
        let mut log = Log::default();
        conn.dispatch(&mut log, &FacingPacket::new(0).to_bytes());
        assert_eq!(log.0, ["second"]);
        assert!(conn.has_handler(PacketType::Facing));
        assert!(!conn.has_handler(PacketType::Jump));
    }
}
