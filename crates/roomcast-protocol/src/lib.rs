//! Wire protocol for Roomcast.
//!
//! This crate defines the "language" that clients and the relay server
//! speak, from single bytes up to routed callbacks:
//!
//! - **Codec** ([`Writer`], [`Reader`]): big-endian integers and
//!   length-prefixed strings.
//! - **Packets** ([`Packet`] and one struct per kind): the typed messages,
//!   each with a stable one-byte [`PacketType`] tag.
//! - **Bulks** ([`BulkPacker`], [`SubMessages`]): many packets in one
//!   transport message.
//! - **Dispatch** ([`Connection`], [`SystemEvent`]): handler registry that
//!   turns a received bulk into handler calls.
//! - **Control** ([`ControlSignal`]): the out-of-band "session over"
//!   messages.
//!
//! # Architecture
//!
//! The protocol layer knows nothing about sockets. Transport hands it
//! complete messages; it hands back typed packets.
//!
//! ```text
//! Transport (messages) → Protocol (packets) → Session (game state)
//! ```

mod bulk;
mod codec;
mod control;
mod dispatch;
mod error;
mod packet;
pub mod sync_config;
mod types;

pub use bulk::{BulkPacker, MAX_BULK_SIZE, SubMessages, pack_bulks};
pub use codec::{MAX_STRING16_LEN, Reader, Writer, deserialize_string16, serialize_string16};
pub use control::ControlSignal;
pub use dispatch::{Connection, SystemEvent};
pub use error::ProtocolError;
pub use packet::{
    BOUNDARY_MARKER, ChatPacket, ConfigPacket, ErasePicturePacket, FacingPacket, FlashColor,
    FlashPacket, HasPlayerId, HeartbeatPacket, HiddenPacket, JoinPacket, JumpPacket, LeavePacket,
    Message, MovePacket, MovePicturePacket, NamePacket, Packet, PictureParams, PicturePlacement,
    RemoveRepeatingFlashPacket, RepeatingFlashPacket, RoomPacket, ShowBattleAnimationPacket,
    ShowPicturePacket, SoundEffectPacket, SpeedPacket, SpritePacket, SystemGraphicPacket,
    TeleportPacket,
};
pub use sync_config::SyncConfig;
pub use types::{ChatKind, ConfigKind, PacketType, Visibility};
