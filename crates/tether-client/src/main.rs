//! tether headless client: entry point.
//!
//! Connects to a tether server the way a browser tab would, logs every
//! script the server sends, and answers evaluations with `null`.  Useful
//! for watching a page's traffic without a browser.
//!
//! # Usage
//!
//! ```text
//! tether-headless [OPTIONS]
//!
//! Options:
//!   --server <ADDR>                Server address [default: 127.0.0.1:7659]
//!   --client-id <ID>               Resume this session instead of loading the page
//!   --ws-path <PATH>               WebSocket endpoint path [default: /ws]
//!   --reconnect-delay-ms <MILLIS>  Pause before reconnecting [default: 500]
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tether_client::infrastructure::{fetch_client_id, run, CannedScriptHost, RunOutcome};
use tether_client::{ClientConfig, ClientDispatcher};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Headless tether client.
#[derive(Debug, Parser)]
#[command(name = "tether-headless", version)]
struct Cli {
    /// Server address.
    #[arg(long, env = "TETHER_SERVER", default_value = "127.0.0.1:7659")]
    server: SocketAddr,

    /// Existing client id.  Without one the page is loaded to get a new id.
    #[arg(long, env = "TETHER_CLIENT_ID")]
    client_id: Option<String>,

    /// Path of the WebSocket endpoint.
    #[arg(long, env = "TETHER_WS_PATH", default_value = "/ws")]
    ws_path: String,

    /// Milliseconds to wait before reconnecting after a clean close.
    #[arg(long, env = "TETHER_RECONNECT_DELAY_MS", default_value_t = 500)]
    reconnect_delay_ms: u64,
}

impl Cli {
    /// # Errors
    ///
    /// Returns an error if the WebSocket path does not start with `/`.
    fn into_client_config(self) -> anyhow::Result<ClientConfig> {
        anyhow::ensure!(
            self.ws_path.starts_with('/'),
            "--ws-path must start with '/', got {:?}",
            self.ws_path
        );
        Ok(ClientConfig {
            server_addr: self.server,
            client_id: self.client_id,
            ws_path: self.ws_path,
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_client_config()?;
    let client_id = match &config.client_id {
        Some(id) => id.clone(),
        None => fetch_client_id(config.server_addr).await?,
    };
    info!("tether-headless: server={}, client_id={client_id}", config.server_addr);

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    let host = Arc::new(CannedScriptHost::new());
    let dispatcher = Arc::new(Mutex::new(ClientDispatcher::new(client_id, host)));
    // Nothing on this host fires page listeners; the sender stays open so
    // the runner keeps its queue.
    let (_outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

    match run(config, dispatcher, outgoing_rx, running).await? {
        RunOutcome::Stopped => info!("tether-headless stopped"),
        RunOutcome::Reload => warn!("session lost; reload the page to start a new one"),
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_match_client_config_defaults() {
        // Arrange
        let cli = Cli::parse_from(["tether-headless"]);

        // Act
        let config = cli.into_client_config().unwrap();

        // Assert
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "tether-headless",
            "--server",
            "10.0.0.5:8000",
            "--client-id",
            "abc",
            "--reconnect-delay-ms",
            "50",
        ]);

        let config = cli.into_client_config().unwrap();

        assert_eq!(config.server_addr.to_string(), "10.0.0.5:8000");
        assert_eq!(config.client_id.as_deref(), Some("abc"));
        assert_eq!(config.reconnect_delay, Duration::from_millis(50));
    }

    #[test]
    fn test_relative_ws_path_returns_error() {
        let cli = Cli::parse_from(["tether-headless", "--ws-path", "ws"]);

        assert!(cli.into_client_config().is_err());
    }
}
