//! Error types for the room layer.

/// Errors that can occur in the relay engine.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The relay has been stopped and accepts no more work.
    #[error("relay is stopped")]
    Stopped,

    /// A configuration value is unusable, or the config file could not
    /// be read.
    #[error("invalid server config: {0}")]
    InvalidConfig(String),
}
