//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for runtime settings.  It is
//! a plain struct with no environment or file reads of its own: `main.rs`
//! layers CLI arguments, `TETHER_*` variables, and an optional TOML file on
//! top of [`ServerConfig::default`].

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the page-build closure reaches the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Build against a shadow document.  Every mutation is mirrored there and
    /// queued; the queue is flushed when the client's hello arrives.
    #[default]
    Shadow,

    /// Build with catching-outbound enabled.  Every mutation is rendered as
    /// script and the collected script is embedded in the page, so the
    /// client runs it before the socket opens.
    Catching,
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderMode::Shadow => f.write_str("shadow"),
            RenderMode::Catching => f.write_str("catching"),
        }
    }
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "shadow" => Ok(RenderMode::Shadow),
            "catching" => Ok(RenderMode::Catching),
            other => Err(format!("unknown render mode '{other}' (expected shadow or catching)")),
        }
    }
}

/// All runtime configuration for the tether server.
///
/// # Example
///
/// ```rust
/// use tether_server::domain::ServerConfig;
///
/// let cfg = ServerConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 7659);
/// assert_eq!(cfg.ws_path, "/ws");
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket listener binds to.
    pub bind_addr: SocketAddr,

    /// Attach a debug token to every execute and evaluate message so client
    /// script failures are reported back instead of thrown.
    pub debug_tokens: bool,

    pub render_mode: RenderMode,

    /// How long a session whose socket has gone away is kept for a
    /// reconnecting client before it is dropped.
    pub orphan_timeout: Duration,

    /// Path of the WebSocket endpoint.  Must start with `/`.
    pub ws_path: String,
}

impl Default for ServerConfig {
    /// | Field          | Default        |
    /// |----------------|----------------|
    /// | bind_addr      | `0.0.0.0:7659` |
    /// | debug_tokens   | `false`        |
    /// | render_mode    | `Shadow`       |
    /// | orphan_timeout | 60 seconds     |
    /// | ws_path        | `/ws`          |
    fn default() -> Self {
        Self {
            // Compile-time-known valid socket address.
            bind_addr: "0.0.0.0:7659".parse().unwrap(),
            debug_tokens: false,
            render_mode: RenderMode::Shadow,
            orphan_timeout: Duration::from_secs(60),
            ws_path: "/ws".to_string(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_is_7659() {
        // Arrange / Act
        let cfg = ServerConfig::default();
        // Assert
        assert_eq!(cfg.bind_addr.port(), 7659);
    }

    #[test]
    fn test_default_render_mode_is_shadow() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.render_mode, RenderMode::Shadow);
    }

    #[test]
    fn test_default_debug_tokens_off() {
        let cfg = ServerConfig::default();
        assert!(!cfg.debug_tokens);
    }

    #[test]
    fn test_default_orphan_timeout_is_60s() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.orphan_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_render_mode_parses_case_insensitively() {
        assert_eq!("Catching".parse::<RenderMode>(), Ok(RenderMode::Catching));
        assert_eq!("shadow".parse::<RenderMode>(), Ok(RenderMode::Shadow));
        assert!("eager".parse::<RenderMode>().is_err());
    }

    #[test]
    fn test_render_mode_display_matches_parse() {
        for mode in [RenderMode::Shadow, RenderMode::Catching] {
            assert_eq!(mode.to_string().parse::<RenderMode>(), Ok(mode));
        }
    }
}
