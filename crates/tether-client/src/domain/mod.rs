//! Domain layer for tether-client: configuration types.

pub mod config;

pub use config::ClientConfig;
