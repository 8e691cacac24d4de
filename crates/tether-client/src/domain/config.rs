//! Headless client configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// All runtime configuration for the headless client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Address of the tether server (page and socket).
    pub server_addr: SocketAddr,

    /// Client identity.  `None` loads the page first and uses the id it
    /// carries.
    pub client_id: Option<String>,

    /// Path of the WebSocket endpoint.
    pub ws_path: String,

    /// Pause before reconnecting after a clean close.
    pub reconnect_delay: Duration,
}

impl ClientConfig {
    /// `ws://{server_addr}{ws_path}?clientId={client_id}`.
    pub fn ws_url(&self, client_id: &str) -> String {
        format!("ws://{}{}?clientId={client_id}", self.server_addr, self.ws_path)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            // Compile-time-known valid socket address.
            server_addr: "127.0.0.1:7659".parse().unwrap(),
            client_id: None,
            ws_path: "/ws".to_string(),
            reconnect_delay: Duration::from_millis(500),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
