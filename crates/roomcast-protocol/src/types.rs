//! Tags and small enums shared by the packet catalogue.

use std::fmt;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// PacketType
// ---------------------------------------------------------------------------

/// The one-byte tag that leads every packet on the wire.
///
/// These values are part of the wire format and must never be
/// renumbered; new packet kinds only ever append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PacketType {
    Heartbeat = 0x01,
    Room = 0x02,
    Join = 0x03,
    Leave = 0x04,
    Name = 0x05,
    Chat = 0x06,
    Move = 0x07,
    Teleport = 0x08,
    Jump = 0x09,
    Facing = 0x0a,
    Speed = 0x0b,
    Sprite = 0x0c,
    Flash = 0x0d,
    RepeatingFlash = 0x0e,
    RemoveRepeatingFlash = 0x0f,
    Hidden = 0x10,
    SystemGraphic = 0x11,
    SoundEffect = 0x12,
    ShowPicture = 0x13,
    MovePicture = 0x14,
    ErasePicture = 0x15,
    ShowBattleAnimation = 0x16,
    Config = 0x17,
}

impl PacketType {
    /// Every packet type, in tag order.
    pub const ALL: [PacketType; 23] = [
        Self::Heartbeat,
        Self::Room,
        Self::Join,
        Self::Leave,
        Self::Name,
        Self::Chat,
        Self::Move,
        Self::Teleport,
        Self::Jump,
        Self::Facing,
        Self::Speed,
        Self::Sprite,
        Self::Flash,
        Self::RepeatingFlash,
        Self::RemoveRepeatingFlash,
        Self::Hidden,
        Self::SystemGraphic,
        Self::SoundEffect,
        Self::ShowPicture,
        Self::MovePicture,
        Self::ErasePicture,
        Self::ShowBattleAnimation,
        Self::Config,
    ];

    /// Returns the wire byte for this packet type.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parses a wire byte, or `None` for unassigned tags.
    pub fn from_u8(byte: u8) -> Option<Self> {
        Self::ALL.get(usize::from(byte).wrapping_sub(1)).copied()
    }

    /// Human-readable name used in log fields.
    pub fn name(self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::Room => "room",
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Name => "name",
            Self::Chat => "chat",
            Self::Move => "move",
            Self::Teleport => "teleport",
            Self::Jump => "jump",
            Self::Facing => "facing",
            Self::Speed => "speed",
            Self::Sprite => "sprite",
            Self::Flash => "flash",
            Self::RepeatingFlash => "repeating_flash",
            Self::RemoveRepeatingFlash => "remove_repeating_flash",
            Self::Hidden => "hidden",
            Self::SystemGraphic => "system_graphic",
            Self::SoundEffect => "sound_effect",
            Self::ShowPicture => "show_picture",
            Self::MovePicture => "move_picture",
            Self::ErasePicture => "erase_picture",
            Self::ShowBattleAnimation => "show_battle_animation",
            Self::Config => "config",
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::from_u8(byte).ok_or(ProtocolError::UnknownPacketType(byte))
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Visibility
// ---------------------------------------------------------------------------

/// Who receives a broadcast.
///
/// The numeric values are flag-like for historical reasons and travel
/// inside chat packets, so they are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Visibility {
    /// No scope. On the server this addresses the sender alone.
    #[default]
    Null = 0,
    /// Everyone in the sender's room.
    Local = 1,
    /// Every connected client.
    Global = 2,
    /// Everyone sharing the sender's chat crypt key hash.
    Crypt = 4,
}

impl Visibility {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Visibility {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(Self::Null),
            1 => Ok(Self::Local),
            2 => Ok(Self::Global),
            4 => Ok(Self::Crypt),
            other => Err(ProtocolError::InvalidValue {
                field: "visibility",
                value: i64::from(other),
            }),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "NULL",
            Self::Local => "LOCAL",
            Self::Global => "GLOBAL",
            Self::Crypt => "CRYPT",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Sub-type enums
// ---------------------------------------------------------------------------

/// Distinguishes server notices from player chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ChatKind {
    /// Server-generated notice (joins, leaves).
    #[default]
    Info = 0,
    /// A message typed by a player.
    Chat = 1,
}

impl TryFrom<u8> for ChatKind {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(Self::Info),
            1 => Ok(Self::Chat),
            other => Err(ProtocolError::InvalidValue {
                field: "chat_kind",
                value: i64::from(other),
            }),
        }
    }
}

/// What a CONFIG packet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConfigKind {
    /// Comma-separated picture names every client should sync.
    PictureNames = 0,
    /// Comma-separated picture name prefixes every client should sync.
    PicturePrefixes = 1,
    /// `^`-separated per-room virtual 3D records.
    Virtual3dMaps = 2,
}

impl TryFrom<u8> for ConfigKind {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(Self::PictureNames),
            1 => Ok(Self::PicturePrefixes),
            2 => Ok(Self::Virtual3dMaps),
            other => Err(ProtocolError::InvalidValue {
                field: "config_kind",
                value: i64::from(other),
            }),
        }
    }
}
