//! tether server: entry point.
//!
//! Serves a small demo page (a click counter) to show the moving parts: a
//! page builder, element creation, an event listener, and an observable
//! binding.
//!
//! # Usage
//!
//! ```text
//! tether-server [OPTIONS]
//!
//! Options:
//!   --bind <ADDR>                 Listen address [default: 0.0.0.0:7659]
//!   --debug-tokens                Report client script failures back
//!   --render-mode <MODE>          shadow | catching [default: shadow]
//!   --orphan-timeout-secs <SECS>  Keep detached sessions this long [default: 60]
//!   --ws-path <PATH>              WebSocket endpoint path [default: /ws]
//!   --config <FILE>               Optional TOML file with the same keys
//! ```
//!
//! Each option can also be set through a `TETHER_*` environment variable.
//! Precedence: command line, then environment, then the config file, then
//! the built-in defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tether_server::application::{Document, DomError, Observable};
use tether_server::domain::{RenderMode, ServerConfig};
use tether_server::infrastructure::config_file::FileConfig;
use tether_server::infrastructure::{run_server, PageBuilder};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Remote-DOM server: drives browser pages over a WebSocket.
#[derive(Debug, Parser)]
#[command(name = "tether-server", version)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "TETHER_BIND")]
    bind: Option<SocketAddr>,

    /// Attach debug tokens so client script failures are reported back.
    #[arg(long, env = "TETHER_DEBUG_TOKENS")]
    debug_tokens: bool,

    /// How the initial page is built: `shadow` or `catching`.
    #[arg(long, env = "TETHER_RENDER_MODE")]
    render_mode: Option<RenderMode>,

    /// Seconds a session without a socket is kept for a reconnecting client.
    #[arg(long, env = "TETHER_ORPHAN_TIMEOUT_SECS")]
    orphan_timeout_secs: Option<u64>,

    /// Path of the WebSocket endpoint.
    #[arg(long, env = "TETHER_WS_PATH")]
    ws_path: Option<String>,

    /// TOML configuration file.
    #[arg(long, env = "TETHER_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Layers the config file (if any) and then the arguments over
    /// [`ServerConfig::default`].
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if a
    /// WebSocket path does not start with `/`.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = ServerConfig::default();
        if let Some(path) = &self.config {
            config = FileConfig::load(path)
                .and_then(|file| file.apply(config))
                .with_context(|| format!("invalid config file {}", path.display()))?;
        }

        if let Some(addr) = self.bind {
            config.bind_addr = addr;
        }
        if self.debug_tokens {
            config.debug_tokens = true;
        }
        if let Some(mode) = self.render_mode {
            config.render_mode = mode;
        }
        if let Some(secs) = self.orphan_timeout_secs {
            config.orphan_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = self.ws_path {
            anyhow::ensure!(path.starts_with('/'), "--ws-path must start with '/', got {path:?}");
            config.ws_path = path;
        }
        Ok(config)
    }
}

// ── Demo page ─────────────────────────────────────────────────────────────────

fn build_demo_page(doc: &Document) -> Result<(), DomError> {
    let body = doc.body();
    let mut page = body.new_children(None);
    let guard = page.guard();

    let heading = page.element("h1", [("id", "title")])?;
    heading.set_text("tether")?;

    let clicks = Observable::new("0 clicks".to_string());
    let counter = page.element("p", Vec::<(String, Value)>::new())?;
    counter.set_text_bound(&clicks)?;

    let button = page.element("button", [("type", "button")])?;
    button.set_text("Click me")?;
    let count = Arc::new(std::sync::atomic::AtomicU64::new(0));
    button.on("click", &["type"], None, move |_| {
        let n = count.fetch_add(1, Ordering::SeqCst) + 1;
        clicks.set(format!("{n} clicks"));
    });
    guard.keep();
    Ok(())
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_server_config()?;
    info!(
        "tether starting: bind={}, render_mode={}, debug_tokens={}",
        config.bind_addr, config.render_mode, config.debug_tokens
    );

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

    let builder: PageBuilder = Arc::new(|doc: &Document| {
        if let Err(e) = build_demo_page(doc) {
            warn!("client {}: page build failed: {e}", doc.client_id());
        }
    });
    run_server(config, builder, running).await?;

    info!("tether stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
