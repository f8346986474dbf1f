//! `RoomcastServer` builder and accept loops.
//!
//! This is the entry point for running a relay. It binds the configured
//! listeners and hands every accepted stream to the [`Relay`], which
//! does the rest.

use std::net::SocketAddr;
use std::sync::Arc;

use roomcast_room::{Relay, ServerConfig};
use roomcast_transport::{Listener, TransportKind};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::RoomcastError;

/// Builder for configuring and starting a relay server.
///
/// # Example
///
/// ```rust,no_run
/// # async fn demo() -> Result<(), roomcast::RoomcastError> {
/// use roomcast::prelude::*;
///
/// let server = RoomcastServer::builder()
///     .bind("0.0.0.0:6500")
///     .websocket("0.0.0.0:6501")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RoomcastServerBuilder {
    config: ServerConfig,
}

impl RoomcastServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the main TCP listen address.
    pub fn bind(mut self, address: &str) -> Self {
        self.config.bind_address = address.to_string();
        self
    }

    /// Adds a second TCP listener.
    pub fn bind_2(mut self, address: &str) -> Self {
        self.config.bind_address_2 = Some(address.to_string());
        self
    }

    /// Adds a WebSocket listener.
    pub fn websocket(mut self, address: &str) -> Self {
        self.config.websocket_address = Some(address.to_string());
        self
    }

    pub fn max_users(mut self, max_users: usize) -> Self {
        self.config.max_users = max_users;
        self
    }

    /// Validates the config, binds every listener and starts the relay.
    pub async fn build(self) -> Result<RoomcastServer, RoomcastError> {
        let config = self.config;
        config.validate()?;

        let mut listeners = vec![Listener::bind(&config.bind_address, TransportKind::Tcp).await?];
        if let Some(address) = &config.bind_address_2 {
            listeners.push(Listener::bind(address, TransportKind::Tcp).await?);
        }
        if let Some(address) = &config.websocket_address {
            listeners.push(Listener::bind(address, TransportKind::WebSocket).await?);
        }

        let (stop, _) = watch::channel(false);
        Ok(RoomcastServer {
            listeners,
            relay: Relay::new(config),
            stop: Arc::new(stop),
        })
    }
}

/// Stops a running server from anywhere. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    relay: Relay,
    stop: Arc<watch::Sender<bool>>,
}

impl ServerHandle {
    /// Sends every client the shutdown signal, closes them, and ends the
    /// accept loops. Idempotent.
    pub fn stop(&self) {
        self.relay.stop();
        self.stop.send_replace(true);
    }

    pub fn client_count(&self) -> usize {
        self.relay.client_count()
    }
}

/// A bound relay server.
///
/// Call [`run()`](Self::run) to start accepting connections.
#[derive(Debug)]
pub struct RoomcastServer {
    listeners: Vec<Listener>,
    relay: Relay,
    stop: Arc<watch::Sender<bool>>,
}

impl RoomcastServer {
    pub fn builder() -> RoomcastServerBuilder {
        RoomcastServerBuilder::new()
    }

    /// Address and transport of every listener, main TCP first.
    pub fn local_addrs(&self) -> Result<Vec<(TransportKind, SocketAddr)>, RoomcastError> {
        self.listeners
            .iter()
            .map(|l| Ok((l.kind(), l.local_addr()?)))
            .collect()
    }

    /// Address of the main TCP listener.
    pub fn local_addr(&self) -> Result<SocketAddr, RoomcastError> {
        Ok(self.listeners[0].local_addr()?)
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            relay: self.relay.clone(),
            stop: Arc::clone(&self.stop),
        }
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Accepts connections on every listener until stopped.
    pub async fn run(self) -> Result<(), RoomcastError> {
        let mut loops = JoinSet::new();
        for listener in self.listeners {
            if let Ok(address) = listener.local_addr() {
                tracing::info!(kind = %listener.kind(), %address, "listening");
            }
            loops.spawn(accept_loop(listener, self.relay.clone(), self.stop.subscribe()));
        }
        while loops.join_next().await.is_some() {}
        tracing::info!("server stopped");
        Ok(())
    }
}

async fn accept_loop(listener: Listener, relay: Relay, mut stop: watch::Receiver<bool>) {
    let kind = listener.kind();
    loop {
        tokio::select! {
            _ = stop.wait_for(|stopped| *stopped) => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Some(id) = relay.admit(stream, kind) {
                        tracing::debug!(%id, %peer, %kind, "accepted client");
                    }
                }
                Err(e) => tracing::warn!(%kind, error = %e, "accept failed"),
            },
        }
    }
}
