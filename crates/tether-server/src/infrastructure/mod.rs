//! Infrastructure layer for tether-server.
//!
//! Everything that touches the network or the file system:
//!
//! - `ws_server`: the axum router serving the bootstrap page and the
//!   WebSocket endpoint
//! - `session_store`: sessions keyed by client id, with orphan expiry
//! - `page`: rendering of the bootstrap page
//! - `config_file`: the optional TOML configuration file

pub mod config_file;
pub mod page;
pub mod session_store;
pub mod ws_server;

pub use ws_server::{router, run_server, serve, AppState, PageBuilder};
