//! Optional TOML configuration file.
//!
//! Every key is optional; a key that is present overrides the built-in
//! default, and command-line arguments override the file.
//!
//! ```toml
//! bind_addr = "127.0.0.1:8080"
//! debug_tokens = true
//! render_mode = "catching"
//! orphan_timeout_secs = 30
//! ws_path = "/socket"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::{RenderMode, ServerConfig};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("ws_path must start with '/', got {0:?}")]
    InvalidWsPath(String),
}

/// The on-disk shape of the configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub bind_addr: Option<SocketAddr>,
    #[serde(default)]
    pub debug_tokens: Option<bool>,
    #[serde(default)]
    pub render_mode: Option<RenderMode>,
    #[serde(default)]
    pub orphan_timeout_secs: Option<u64>,
    #[serde(default)]
    pub ws_path: Option<String>,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Overlays the keys present in the file onto `config`.
    pub fn apply(self, mut config: ServerConfig) -> Result<ServerConfig, ConfigError> {
        if let Some(addr) = self.bind_addr {
            config.bind_addr = addr;
        }
        if let Some(debug_tokens) = self.debug_tokens {
            config.debug_tokens = debug_tokens;
        }
        if let Some(mode) = self.render_mode {
            config.render_mode = mode;
        }
        if let Some(secs) = self.orphan_timeout_secs {
            config.orphan_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = self.ws_path {
            if !path.starts_with('/') {
                return Err(ConfigError::InvalidWsPath(path));
            }
            config.ws_path = path;
        }
        Ok(config)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_keeps_defaults() {
        // Arrange
        let file = FileConfig::parse("").unwrap();

        // Act
        let config = file.apply(ServerConfig::default()).unwrap();

        // Assert
        assert_eq!(config.bind_addr.port(), 7659);
        assert_eq!(config.render_mode, RenderMode::Shadow);
    }

    #[test]
    fn test_present_keys_override_defaults() {
        let file = FileConfig::parse(
            "bind_addr = \"127.0.0.1:8080\"\n\
             debug_tokens = true\n\
             render_mode = \"catching\"\n\
             orphan_timeout_secs = 5\n\
             ws_path = \"/socket\"\n",
        )
        .unwrap();

        let config = file.apply(ServerConfig::default()).unwrap();

        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert!(config.debug_tokens);
        assert_eq!(config.render_mode, RenderMode::Catching);
        assert_eq!(config.orphan_timeout, Duration::from_secs(5));
        assert_eq!(config.ws_path, "/socket");
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(matches!(
            FileConfig::parse("colour = \"blue\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_relative_ws_path_is_rejected() {
        let file = FileConfig {
            ws_path: Some("ws".into()),
            ..FileConfig::default()
        };

        assert!(matches!(
            file.apply(ServerConfig::default()),
            Err(ConfigError::InvalidWsPath(p)) if p == "ws"
        ));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = FileConfig::load(Path::new("/nonexistent/tether.toml")).unwrap_err();

        assert!(err.to_string().contains("/nonexistent/tether.toml"));
    }
}
