//! Client configuration.

use std::time::Duration;

use roomcast_transport::socks5::DEFAULT_SOCKS5_PORT;
use roomcast_transport::{ConnectOptions, DEFAULT_PORT, TransportKind, parse_address};
use serde::{Deserialize, Serialize};

use crate::SessionError;

/// Everything a [`ClientSession`](crate::ClientSession) needs to know
/// before it connects.
///
/// Durations are written in seconds (fractions allowed) when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `host[:port]` of the relay server. The port defaults to 6500.
    pub server_address: String,

    /// `host[:port]` of a SOCKS5 proxy. The port defaults to 1080.
    pub socks5_address: Option<String>,

    pub transport: TransportKind,

    /// Request path for the WebSocket handshake.
    pub websocket_path: String,

    /// Disables the heartbeat and the read timeout.
    pub no_heartbeats: bool,

    #[serde(with = "seconds")]
    pub heartbeat_interval: Duration,

    /// Wait between a lost connection and the next attempt.
    #[serde(with = "seconds")]
    pub reconnect_delay: Duration,

    /// Silence after which the socket is considered dead. Zero disables.
    #[serde(with = "seconds")]
    pub read_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: format!("127.0.0.1:{DEFAULT_PORT}"),
            socks5_address: None,
            transport: TransportKind::Tcp,
            websocket_path: "/".into(),
            no_heartbeats: false,
            heartbeat_interval: Duration::from_secs(3),
            reconnect_delay: Duration::from_secs(3),
            read_timeout: Duration::from_secs(6),
        }
    }
}

impl ClientConfig {
    /// Resolves the address strings into the options used for every
    /// connection attempt.
    ///
    /// # Errors
    /// Returns [`SessionError::Transport`] for a malformed address and
    /// [`SessionError::InvalidConfig`] for a zero heartbeat interval.
    pub fn connect_options(&self) -> Result<ConnectOptions, SessionError> {
        if !self.no_heartbeats && self.heartbeat_interval.is_zero() {
            return Err(SessionError::InvalidConfig(
                "heartbeat_interval must be positive".into(),
            ));
        }

        let (host, port) = parse_address(&self.server_address, DEFAULT_PORT)?;
        let proxy = self
            .socks5_address
            .as_deref()
            .map(|address| parse_address(address, DEFAULT_SOCKS5_PORT))
            .transpose()?;

        let read_timeout = (!self.no_heartbeats && !self.read_timeout.is_zero())
            .then_some(self.read_timeout);

        Ok(ConnectOptions {
            host,
            port,
            kind: self.transport,
            proxy,
            read_timeout,
            websocket_path: self.websocket_path.clone(),
        })
    }
}

/// Serde adapter storing a `Duration` as fractional seconds.
mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_resolve() {
        let options = ClientConfig::default().connect_options().unwrap();
        assert_eq!(options.host, "127.0.0.1");
        assert_eq!(options.port, 6500);
        assert_eq!(options.proxy, None);
        assert_eq!(options.read_timeout, Some(Duration::from_secs(6)));
    }

    #[test]
    fn test_proxy_default_port() {
        let config = ClientConfig {
            socks5_address: Some("proxy.local".into()),
            ..ClientConfig::default()
        };
        let options = config.connect_options().unwrap();
        assert_eq!(options.proxy, Some(("proxy.local".into(), 1080)));
    }

    #[test]
    fn test_no_heartbeats_disables_read_timeout() {
        let config = ClientConfig {
            no_heartbeats: true,
            ..ClientConfig::default()
        };
        assert_eq!(config.connect_options().unwrap().read_timeout, None);
    }

    #[test]
    fn test_bad_address_is_rejected() {
        let config = ClientConfig {
            server_address: "host:notaport".into(),
            ..ClientConfig::default()
        };
        assert!(matches!(config.connect_options(), Err(SessionError::Transport(_))));
    }

    #[test]
    fn test_json_uses_seconds_and_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"server_address":"game.test:7000","reconnect_delay":0.5}"#)
                .unwrap();
        assert_eq!(config.server_address, "game.test:7000");
        assert_eq!(config.reconnect_delay, Duration::from_millis(500));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(3));
    }
}
