//! Command-line options for `roomcast-server`.

use std::path::PathBuf;

use clap::Parser;
use roomcast_room::ServerConfig;

use crate::RoomcastError;

/// Relay server for room-scoped multiplayer state.
#[derive(Parser, Debug, Clone, Default, PartialEq)]
#[command(name = "roomcast-server", author, version, about)]
pub struct ServerArgs {
    /// Main TCP listen address, `host:port` or `[v6]:port`
    #[arg(short = 'a', long)]
    pub bind_address: Option<String>,

    /// Second TCP listen address, e.g. `[::]:6500`
    #[arg(short = 'A', long = "bind-address-2")]
    pub bind_address_2: Option<String>,

    /// WebSocket listen address
    #[arg(short = 'w', long)]
    pub websocket_address: Option<String>,

    /// Never time out silent clients
    #[arg(short = 'n', long)]
    pub no_heartbeats: bool,

    /// Connections beyond this many are refused
    #[arg(long)]
    pub max_users: Option<usize>,

    /// JSON config file; flags given here override its values
    #[arg(short = 'c', long)]
    pub config_path: Option<PathBuf>,
}

impl ServerArgs {
    /// Loads the config file, if any, and applies the flags on top.
    pub fn into_config(self) -> Result<ServerConfig, RoomcastError> {
        let mut config = match &self.config_path {
            Some(path) => ServerConfig::from_json_file(path)?,
            None => ServerConfig::default(),
        };
        if let Some(address) = self.bind_address {
            config.bind_address = address;
        }
        if self.bind_address_2.is_some() {
            config.bind_address_2 = self.bind_address_2;
        }
        if self.websocket_address.is_some() {
            config.websocket_address = self.websocket_address;
        }
        if self.no_heartbeats {
            config.no_heartbeats = true;
        }
        if let Some(max_users) = self.max_users {
            config.max_users = max_users;
        }
        config.validate()?;
        Ok(config)
    }
}
