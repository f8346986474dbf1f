//! Relay server configuration.

use std::path::Path;
use std::time::Duration;

use roomcast_protocol::{ConfigKind, ConfigPacket};
use roomcast_transport::DEFAULT_PORT;
use serde::{Deserialize, Serialize};

use crate::RoomError;

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Configuration for a relay server.
///
/// Every field has a default, so a config file only needs the keys it
/// wants to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Main length-prefixed TCP listener.
    pub bind_address: String,

    /// Optional second TCP listener, typically the IPv6 wildcard.
    pub bind_address_2: Option<String>,

    /// Optional WebSocket listener.
    pub websocket_address: Option<String>,

    /// Connections beyond this many are turned away at accept time.
    pub max_users: usize,

    /// Disables the read timeout, for clients that never heartbeat.
    pub no_heartbeats: bool,

    /// Silence after which a client is dropped, in seconds. Zero
    /// disables.
    pub read_timeout_secs: u64,

    /// Synced picture names, sent as CONFIG 0.
    pub picture_names: String,

    /// Synced picture name prefixes, sent as CONFIG 1.
    pub picture_prefixes: String,

    /// Virtual 3D map records, sent as CONFIG 2.
    pub virtual_3d_maps: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("0.0.0.0:{DEFAULT_PORT}"),
            bind_address_2: None,
            websocket_address: None,
            max_users: 100,
            no_heartbeats: false,
            read_timeout_secs: 6,
            picture_names: String::new(),
            picture_prefixes: String::new(),
            virtual_3d_maps: String::new(),
        }
    }
}

impl ServerConfig {
    /// Loads a JSON config file. Missing keys keep their defaults.
    ///
    /// # Errors
    /// Returns [`RoomError::InvalidConfig`] if the file cannot be read or
    /// parsed, or if the result fails [`validate`](Self::validate).
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RoomError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RoomError::InvalidConfig(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| RoomError::InvalidConfig(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RoomError> {
        if self.max_users == 0 {
            return Err(RoomError::InvalidConfig("max_users must be positive".into()));
        }
        if self.bind_address.trim().is_empty() {
            return Err(RoomError::InvalidConfig("bind_address is empty".into()));
        }
        Ok(())
    }

    /// The read timeout to apply to client sockets, if any.
    pub fn read_timeout(&self) -> Option<Duration> {
        (!self.no_heartbeats && self.read_timeout_secs > 0)
            .then(|| Duration::from_secs(self.read_timeout_secs))
    }

    /// The CONFIG packets every client receives after naming itself.
    pub fn sync_packets(&self) -> [ConfigPacket; 3] {
        [
            ConfigPacket::new(ConfigKind::PictureNames, self.picture_names.clone()),
            ConfigPacket::new(ConfigKind::PicturePrefixes, self.picture_prefixes.clone()),
            ConfigPacket::new(ConfigKind::Virtual3dMaps, self.virtual_3d_maps.clone()),
        ]
    }
}
