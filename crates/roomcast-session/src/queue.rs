//! The client's outgoing packet queue.

use std::collections::VecDeque;

use roomcast_protocol::{BulkPacker, MAX_BULK_SIZE, Message, PacketType};

/// Serialized packets waiting for the next flush, in send order.
///
/// A room change must not share a bulk with the packets around it: the
/// server routes LOCAL traffic by the room the sender is in when the bulk
/// is handled, so a bulk straddling a room change would land part of its
/// packets in the wrong room. Flushing therefore cuts the bulk wherever
/// the queue switches between ROOM and non-ROOM packets.
#[derive(Debug, Default)]
pub struct OutgoingQueue {
    entries: VecDeque<(bool, Vec<u8>)>,
}

impl OutgoingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<M: Message>(&mut self, packet: &M) {
        self.entries
            .push_back((M::TYPE == PacketType::Room, packet.to_bytes()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Discards everything queued.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Empties the queue into bulks of at most [`MAX_BULK_SIZE`] bytes.
    pub fn take_bulks(&mut self) -> Vec<Vec<u8>> {
        self.take_bulks_with_limit(MAX_BULK_SIZE)
    }

    pub fn take_bulks_with_limit(&mut self, max: usize) -> Vec<Vec<u8>> {
        let mut packer = BulkPacker::new(max);
        let mut previous_is_room = None;
        for (is_room, bytes) in self.entries.drain(..) {
            if previous_is_room.is_some_and(|prev| prev != is_room) {
                packer.cut();
            }
            previous_is_room = Some(is_room);
            packer.push(&bytes);
        }
        packer.finish()
    }
}
