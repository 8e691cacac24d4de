//! Domain layer for tether-server.
//!
//! Plain configuration types with no I/O.  The protocol and document types
//! live in `tether-core`.

pub mod config;

pub use config::{RenderMode, ServerConfig};
