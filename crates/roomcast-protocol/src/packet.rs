//! The packet catalogue: one struct per message kind, plus the [`Packet`]
//! sum type that owns any of them.
//!
//! # Wire layout
//!
//! ```text
//! sub-message = string16( tag:u8 ++ fields ++ 0x2828 )
//! ```
//!
//! The tag selects the struct, the fields follow in a fixed order, and the
//! two-byte boundary marker closes the payload. The string16 wrapper is
//! what lets several sub-messages share one transport message: a reader
//! walks the bulk by length prefix, never by scanning for a delimiter.
//!
//! # Player packets
//!
//! Most packets describe something one player did, so they lead with a
//! `u16` player id. Clients send `0` there; the server overwrites it with
//! the sender's assigned id before relaying. The [`HasPlayerId`] trait is
//! the shared accessor for that field.

use crate::codec::{Reader, Writer, serialize_string16};
use crate::types::{ChatKind, ConfigKind, PacketType, Visibility};
use crate::ProtocolError;

/// Two bytes closing every payload, just before the outer length prefix
/// is applied.
pub const BOUNDARY_MARKER: u16 = 0x2828;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A concrete packet kind with a fixed tag and field layout.
pub trait Message: Sized + Clone + Into<Packet> {
    /// The tag this packet is sent under.
    const TYPE: PacketType;

    /// Reads the fields that follow the tag.
    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError>;

    /// Writes the fields that follow the tag.
    fn encode(&self, w: &mut Writer);

    /// Serializes to `tag ++ fields ++ marker`, without the length prefix.
    fn to_payload(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(16);
        w.write_u8(Self::TYPE.as_u8());
        self.encode(&mut w);
        w.write_u16(BOUNDARY_MARKER);
        w.into_inner()
    }

    /// Serializes to a self-delimiting sub-message ready to be bulked.
    fn to_bytes(&self) -> Vec<u8> {
        serialize_string16(&self.to_payload())
    }
}

/// Packets that carry the id of the player they describe.
pub trait HasPlayerId {
    fn player_id(&self) -> u16;

    fn set_player_id(&mut self, id: u16);

    /// Returns the packet stamped with `id`.
    fn with_player_id(mut self, id: u16) -> Self
    where
        Self: Sized,
    {
        self.set_player_id(id);
        self
    }
}

macro_rules! impl_has_player_id {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl HasPlayerId for $ty {
                fn player_id(&self) -> u16 {
                    self.id
                }

                fn set_player_id(&mut self, id: u16) {
                    self.id = id;
                }
            }
        )+
    };
}

// ---------------------------------------------------------------------------
// Session packets
// ---------------------------------------------------------------------------

/// Keep-alive. The server echoes it back to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartbeatPacket;

impl Message for HeartbeatPacket {
    const TYPE: PacketType = PacketType::Heartbeat;

    fn decode(_: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self)
    }

    fn encode(&self, _: &mut Writer) {}
}

/// Announces the room (map) the sender is now in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoomPacket {
    pub room_id: u16,
}

impl RoomPacket {
    pub fn new(room_id: u16) -> Self {
        Self { room_id }
    }
}

impl Message for RoomPacket {
    const TYPE: PacketType = PacketType::Room;

    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            room_id: r.read_u16()?,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u16(self.room_id);
    }
}

/// A player appeared in the receiver's room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JoinPacket {
    pub id: u16,
}

impl Message for JoinPacket {
    const TYPE: PacketType = PacketType::Join;

    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self { id: r.read_u16()? })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u16(self.id);
    }
}

/// A player left the receiver's room or the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LeavePacket {
    pub id: u16,
}

impl Message for LeavePacket {
    const TYPE: PacketType = PacketType::Leave;

    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self { id: r.read_u16()? })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u16(self.id);
    }
}

/// Display name of a player.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamePacket {
    pub id: u16,
    pub name: String,
}

impl NamePacket {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
        }
    }
}

impl Message for NamePacket {
    const TYPE: PacketType = PacketType::Name;

    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: r.read_u16()?,
            name: r.read_string16(),
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u16(self.id);
        w.write_string16(&self.name);
    }
}

/// A chat line or server notice.
///
/// Clients fill in `visibility`, `message`, and for crypt chat the
/// `crypt_key_hash`. The server stamps the rest before relaying.
///
/// An unknown `kind` or `visibility` byte fails decoding, so the relay
/// drops such a line instead of guessing a scope for it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatPacket {
    pub id: u16,
    pub kind: ChatKind,
    pub visibility: Visibility,
    pub room_id: u16,
    pub crypt_key_hash: u32,
    pub name: String,
    pub message: String,
    pub sys_name: String,
}

impl ChatPacket {
    /// A player-authored line, as sent by a client.
    pub fn new(visibility: Visibility, message: impl Into<String>) -> Self {
        Self {
            visibility,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Sets the sender's crypt group. Sent with an empty message.
    pub fn set_crypt_key(crypt_key_hash: u32) -> Self {
        Self {
            visibility: Visibility::Crypt,
            crypt_key_hash,
            ..Self::default()
        }
    }
}

impl Message for ChatPacket {
    const TYPE: PacketType = PacketType::Chat;

    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: r.read_u16()?,
            kind: ChatKind::try_from(r.read_u8()?)?,
            visibility: Visibility::try_from(r.read_u8()?)?,
            room_id: r.read_u16()?,
            crypt_key_hash: r.read_u32()?,
            name: r.read_string16(),
            message: r.read_string16(),
            sys_name: r.read_string16(),
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u16(self.id);
        w.write_u8(self.kind as u8);
        w.write_u8(self.visibility.as_u8());
        w.write_u16(self.room_id);
        w.write_u32(self.crypt_key_hash);
        w.write_string16(&self.name);
        w.write_string16(&self.message);
        w.write_string16(&self.sys_name);
    }
}

// ---------------------------------------------------------------------------
// Movement and appearance
// ---------------------------------------------------------------------------

/// Tile position update. `kind` is `0` for a normal step and `1` when the
/// position comes from an event relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MovePacket {
    pub id: u16,
    pub kind: i8,
    pub x: u16,
    pub y: u16,
}

impl MovePacket {
    pub fn new(kind: i8, x: u16, y: u16) -> Self {
        Self { id: 0, kind, x, y }
    }
}

impl Message for MovePacket {
    const TYPE: PacketType = PacketType::Move;

    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: r.read_u16()?,
            kind: r.read_s8()?,
            x: r.read_u16()?,
            y: r.read_u16()?,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u16(self.id);
        w.write_s8(self.kind);
        w.write_u16(self.x);
        w.write_u16(self.y);
    }
}

/// Instant relocation. Updates the cached position without a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TeleportPacket {
    pub x: u16,
    pub y: u16,
}

impl TeleportPacket {
    pub fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

impl Message for TeleportPacket {
    const TYPE: PacketType = PacketType::Teleport;

    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            x: r.read_u16()?,
            y: r.read_u16()?,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u16(self.x);
        w.write_u16(self.y);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JumpPacket {
    pub id: u16,
    pub x: u16,
    pub y: u16,
}

impl JumpPacket {
    pub fn new(x: u16, y: u16) -> Self {
        Self { id: 0, x, y }
    }
}

impl Message for JumpPacket {
    const TYPE: PacketType = PacketType::Jump;

    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: r.read_u16()?,
            x: r.read_u16()?,
            y: r.read_u16()?,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u16(self.id);
        w.write_u16(self.x);
        w.write_u16(self.y);
    }
}

/// Direction the character faces, `0..=3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FacingPacket {
    pub id: u16,
    pub facing: u8,
}

impl FacingPacket {
    pub fn new(facing: u8) -> Self {
        Self { id: 0, facing }
    }
}

impl Message for FacingPacket {
    const TYPE: PacketType = PacketType::Facing;

    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: r.read_u16()?,
            facing: r.read_u8()?,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u16(self.id);
        w.write_u8(self.facing);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpeedPacket {
    pub id: u16,
    pub speed: u16,
}

impl SpeedPacket {
    pub fn new(speed: u16) -> Self {
        Self { id: 0, speed }
    }
}

impl Message for SpeedPacket {
    const TYPE: PacketType = PacketType::Speed;

    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: r.read_u16()?,
            speed: r.read_u16()?,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u16(self.id);
        w.write_u16(self.speed);
    }
}

/// Character sheet and cell. An `index` of `-1` means "never set".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpritePacket {
    pub id: u16,
    pub name: String,
    pub index: i16,
}

impl SpritePacket {
    pub fn new(name: impl Into<String>, index: i16) -> Self {
        Self {
            id: 0,
            name: name.into(),
            index,
        }
    }

    pub fn is_set(&self) -> bool {
        self.index != -1
    }
}

impl Default for SpritePacket {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            index: -1,
        }
    }
}

impl Message for SpritePacket {
    const TYPE: PacketType = PacketType::Sprite;

    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: r.read_u16()?,
            name: r.read_string16(),
            index: r.read_s16()?,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u16(self.id);
        w.write_string16(&self.name);
        w.write_s16(self.index);
    }
}

/// Screen-flash color, power, and duration in frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlashColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub power: u8,
    pub frames: u8,
}

impl FlashColor {
    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            red: r.read_u8()?,
            green: r.read_u8()?,
            blue: r.read_u8()?,
            power: r.read_u8()?,
            frames: r.read_u8()?,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u8(self.red);
        w.write_u8(self.green);
        w.write_u8(self.blue);
        w.write_u8(self.power);
        w.write_u8(self.frames);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlashPacket {
    pub id: u16,
    pub color: FlashColor,
}

impl FlashPacket {
    pub fn new(color: FlashColor) -> Self {
        Self { id: 0, color }
    }
}

impl Message for FlashPacket {
    const TYPE: PacketType = PacketType::Flash;

    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: r.read_u16()?,
            color: FlashColor::decode(r)?,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u16(self.id);
        self.color.encode(w);
    }
}

/// A flash that keeps repeating until removed.
///
/// `available` is local bookkeeping and never travels on the wire: a
/// decoded packet is always available, and [`discard`](Self::discard)
/// marks a cached one as superseded so it is not replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatingFlashPacket {
    pub id: u16,
    pub color: FlashColor,
    available: bool,
}

impl RepeatingFlashPacket {
    pub fn new(color: FlashColor) -> Self {
        Self {
            id: 0,
            color,
            available: true,
        }
    }

    pub fn discard(&mut self) {
        self.available = false;
    }

    pub fn is_available(&self) -> bool {
        self.available
    }
}

impl Default for RepeatingFlashPacket {
    fn default() -> Self {
        Self::new(FlashColor::default())
    }
}

impl Message for RepeatingFlashPacket {
    const TYPE: PacketType = PacketType::RepeatingFlash;

    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: r.read_u16()?,
            color: FlashColor::decode(r)?,
            available: true,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u16(self.id);
        self.color.encode(w);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemoveRepeatingFlashPacket {
    pub id: u16,
}

impl Message for RemoveRepeatingFlashPacket {
    const TYPE: PacketType = PacketType::RemoveRepeatingFlash;

    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self { id: r.read_u16()? })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u16(self.id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HiddenPacket {
    pub id: u16,
    pub is_hidden: bool,
}

impl HiddenPacket {
    pub fn new(is_hidden: bool) -> Self {
        Self { id: 0, is_hidden }
    }
}

impl Message for HiddenPacket {
    const TYPE: PacketType = PacketType::Hidden;

    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: r.read_u16()?,
            is_hidden: r.read_bool()?,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u16(self.id);
        w.write_bool(self.is_hidden);
    }
}

/// Name of the window skin the player uses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SystemGraphicPacket {
    pub id: u16,
    pub name: String,
}

impl SystemGraphicPacket {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
        }
    }
}

impl Message for SystemGraphicPacket {
    const TYPE: PacketType = PacketType::SystemGraphic;

    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: r.read_u16()?,
            name: r.read_string16(),
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u16(self.id);
        w.write_string16(&self.name);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SoundEffectPacket {
    pub id: u16,
    pub name: String,
    pub volume: u16,
    pub tempo: u16,
    pub balance: u16,
}

impl SoundEffectPacket {
    pub fn new(name: impl Into<String>, volume: u16, tempo: u16, balance: u16) -> Self {
        Self {
            id: 0,
            name: name.into(),
            volume,
            tempo,
            balance,
        }
    }
}

impl Message for SoundEffectPacket {
    const TYPE: PacketType = PacketType::SoundEffect;

    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: r.read_u16()?,
            name: r.read_string16(),
            volume: r.read_u16()?,
            tempo: r.read_u16()?,
            balance: r.read_u16()?,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u16(self.id);
        w.write_string16(&self.name);
        w.write_u16(self.volume);
        w.write_u16(self.tempo);
        w.write_u16(self.balance);
    }
}

// ---------------------------------------------------------------------------
// Pictures
// ---------------------------------------------------------------------------

/// Where a picture sits relative to the map and screen.
///
/// Shared by show and move packets; written right after the player id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PicturePlacement {
    pub pic_id: u16,
    pub map_x: i16,
    pub map_y: i16,
    pub pan_x: i16,
    pub pan_y: i16,
}

impl PicturePlacement {
    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            pic_id: r.read_u16()?,
            map_x: r.read_s16()?,
            map_y: r.read_s16()?,
            pan_x: r.read_s16()?,
            pan_y: r.read_s16()?,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u16(self.pic_id);
        w.write_s16(self.map_x);
        w.write_s16(self.map_y);
        w.write_s16(self.pan_x);
        w.write_s16(self.pan_y);
    }
}

/// Visual parameters common to showing and moving a picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PictureParams {
    pub position_x: i16,
    pub position_y: i16,
    pub magnify: i16,
    pub top_trans: i16,
    pub bottom_trans: i16,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub saturation: u8,
    pub effect_mode: i16,
    pub effect_power: i16,
}

impl PictureParams {
    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            position_x: r.read_s16()?,
            position_y: r.read_s16()?,
            magnify: r.read_s16()?,
            top_trans: r.read_s16()?,
            bottom_trans: r.read_s16()?,
            red: r.read_u8()?,
            green: r.read_u8()?,
            blue: r.read_u8()?,
            saturation: r.read_u8()?,
            effect_mode: r.read_s16()?,
            effect_power: r.read_s16()?,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_s16(self.position_x);
        w.write_s16(self.position_y);
        w.write_s16(self.magnify);
        w.write_s16(self.top_trans);
        w.write_s16(self.bottom_trans);
        w.write_u8(self.red);
        w.write_u8(self.green);
        w.write_u8(self.blue);
        w.write_u8(self.saturation);
        w.write_s16(self.effect_mode);
        w.write_s16(self.effect_power);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShowPicturePacket {
    pub id: u16,
    pub placement: PicturePlacement,
    pub params: PictureParams,
    pub name: String,
    pub use_transparent_color: bool,
    pub fixed_to_map: bool,
}

impl ShowPicturePacket {
    /// Folds a move into this cached show: placement and common
    /// parameters follow the move, the picture file and flags stay.
    pub fn apply_move(&mut self, mv: &MovePicturePacket) {
        self.id = mv.id;
        self.placement = mv.placement;
        self.params = mv.params;
    }
}

impl Message for ShowPicturePacket {
    const TYPE: PacketType = PacketType::ShowPicture;

    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: r.read_u16()?,
            placement: PicturePlacement::decode(r)?,
            params: PictureParams::decode(r)?,
            name: r.read_string16(),
            use_transparent_color: r.read_bool()?,
            fixed_to_map: r.read_bool()?,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u16(self.id);
        self.placement.encode(w);
        self.params.encode(w);
        w.write_string16(&self.name);
        w.write_bool(self.use_transparent_color);
        w.write_bool(self.fixed_to_map);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MovePicturePacket {
    pub id: u16,
    pub placement: PicturePlacement,
    pub params: PictureParams,
    pub duration: i16,
}

impl Message for MovePicturePacket {
    const TYPE: PacketType = PacketType::MovePicture;

    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: r.read_u16()?,
            placement: PicturePlacement::decode(r)?,
            params: PictureParams::decode(r)?,
            duration: r.read_s16()?,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u16(self.id);
        self.placement.encode(w);
        self.params.encode(w);
        w.write_s16(self.duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErasePicturePacket {
    pub id: u16,
    pub pic_id: u16,
}

impl ErasePicturePacket {
    pub fn new(pic_id: u16) -> Self {
        Self { id: 0, pic_id }
    }
}

impl Message for ErasePicturePacket {
    const TYPE: PacketType = PacketType::ErasePicture;

    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: r.read_u16()?,
            pic_id: r.read_u16()?,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u16(self.id);
        w.write_u16(self.pic_id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShowBattleAnimationPacket {
    pub id: u16,
    pub anim_id: u16,
}

impl ShowBattleAnimationPacket {
    pub fn new(anim_id: u16) -> Self {
        Self { id: 0, anim_id }
    }
}

impl Message for ShowBattleAnimationPacket {
    const TYPE: PacketType = PacketType::ShowBattleAnimation;

    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: r.read_u16()?,
            anim_id: r.read_u16()?,
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u16(self.id);
        w.write_u16(self.anim_id);
    }
}

// ---------------------------------------------------------------------------
// Server configuration push
// ---------------------------------------------------------------------------

/// Server-wide sync settings, pushed to each client after it names itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPacket {
    pub kind: ConfigKind,
    pub config: String,
}

impl ConfigPacket {
    pub fn new(kind: ConfigKind, config: impl Into<String>) -> Self {
        Self {
            kind,
            config: config.into(),
        }
    }
}

impl Message for ConfigPacket {
    const TYPE: PacketType = PacketType::Config;

    fn decode(r: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            kind: ConfigKind::try_from(r.read_u8()?)?,
            config: r.read_string16(),
        })
    }

    fn encode(&self, w: &mut Writer) {
        w.write_u8(self.kind as u8);
        w.write_string16(&self.config);
    }
}

impl_has_player_id!(
    JoinPacket,
    LeavePacket,
    NamePacket,
    ChatPacket,
    MovePacket,
    JumpPacket,
    FacingPacket,
    SpeedPacket,
    SpritePacket,
    FlashPacket,
    RepeatingFlashPacket,
    RemoveRepeatingFlashPacket,
    HiddenPacket,
    SystemGraphicPacket,
    SoundEffectPacket,
    ShowPicturePacket,
    MovePicturePacket,
    ErasePicturePacket,
    ShowBattleAnimationPacket,
);

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

macro_rules! packet_catalogue {
    ($($variant:ident($ty:ty)),+ $(,)?) => {
        /// Any packet, owned. Outgoing queues hold these.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Packet {
            $($variant($ty)),+
        }

        impl Packet {
            /// The tag this packet is sent under.
            pub fn packet_type(&self) -> PacketType {
                match self {
                    $(Self::$variant(_) => <$ty as Message>::TYPE),+
                }
            }

            /// Serializes to `tag ++ fields ++ marker`.
            pub fn to_payload(&self) -> Vec<u8> {
                match self {
                    $(Self::$variant(p) => p.to_payload()),+
                }
            }

            /// Decodes the fields of a packet whose tag has already been
            /// read.
            pub fn decode_fields(
                packet_type: PacketType,
                r: &mut Reader<'_>,
            ) -> Result<Self, ProtocolError> {
                $(
                    if packet_type == <$ty as Message>::TYPE {
                        return <$ty as Message>::decode(r).map(Self::$variant);
                    }
                )+
                Err(ProtocolError::UnknownPacketType(packet_type.as_u8()))
            }
        }

        $(
            impl From<$ty> for Packet {
                fn from(p: $ty) -> Self {
                    Self::$variant(p)
                }
            }
        )+
    };
}

packet_catalogue!(
    Heartbeat(HeartbeatPacket),
    Room(RoomPacket),
    Join(JoinPacket),
    Leave(LeavePacket),
    Name(NamePacket),
    Chat(ChatPacket),
    Move(MovePacket),
    Teleport(TeleportPacket),
    Jump(JumpPacket),
    Facing(FacingPacket),
    Speed(SpeedPacket),
    Sprite(SpritePacket),
    Flash(FlashPacket),
    RepeatingFlash(RepeatingFlashPacket),
    RemoveRepeatingFlash(RemoveRepeatingFlashPacket),
    Hidden(HiddenPacket),
    SystemGraphic(SystemGraphicPacket),
    SoundEffect(SoundEffectPacket),
    ShowPicture(ShowPicturePacket),
    MovePicture(MovePicturePacket),
    ErasePicture(ErasePicturePacket),
    ShowBattleAnimation(ShowBattleAnimationPacket),
    Config(ConfigPacket),
);

impl Packet {
    /// Serializes to a self-delimiting sub-message.
    pub fn to_bytes(&self) -> Vec<u8> {
        serialize_string16(&self.to_payload())
    }

    /// Decodes one payload (`tag ++ fields [++ marker]`).
    ///
    /// The trailing marker is optional so that payloads built by hand in
    /// tests or by older peers still decode.
    pub fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        let (&tag, body) = payload.split_first().ok_or(ProtocolError::EmptyMessage)?;
        let packet_type = PacketType::try_from(tag)?;
        Self::decode_fields(packet_type, &mut Reader::new(strip_marker(body)))
    }
}

/// Drops the boundary marker from the end of a payload body, if present.
pub(crate) fn strip_marker(body: &[u8]) -> &[u8] {
    match body.split_last_chunk::<2>() {
        Some((head, marker)) if u16::from_be_bytes(*marker) == BOUNDARY_MARKER => head,
        _ => body,
    }
}
