//! Error types for the protocol layer.
//!
//! Each crate in Roomcast defines its own error enum. A `ProtocolError`
//! always means the bytes were wrong, never that the network was: the
//! dispatcher logs it, drops the offending sub-message, and keeps the
//! connection alive.

/// Errors that can occur while decoding or encoding packets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A fixed-width field ran past the end of the input.
    ///
    /// Every integer read is bounds-checked; a short payload surfaces
    /// here instead of reading stale or zeroed memory.
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// The leading type tag does not name any known packet.
    #[error("unknown packet type 0x{0:02x}")]
    UnknownPacketType(u8),

    /// A field decoded fine but holds a value outside its domain.
    #[error("invalid value {value} for field `{field}`")]
    InvalidValue { field: &'static str, value: i64 },

    /// A sub-message had no bytes at all, not even a type tag.
    #[error("empty message")]
    EmptyMessage,
}
