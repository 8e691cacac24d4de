//! # tether-client
//!
//! The client half of the tether protocol, in Rust.
//!
//! A browser runs the bootstrap script the server embeds in every page.
//! This crate implements the same contract so it can be tested and driven
//! without a browser:
//!
//! - **`application::dispatcher`** – [`ClientDispatcher`] applies `execute`,
//!   `evaluate`, and `instructions` messages and builds the replies.  Script
//!   evaluation goes through the [`ScriptHost`] trait.
//! - **`application::connection`** – hello-first flushing of queued frames
//!   and the reconnect-or-reload decision on close.
//! - **`infrastructure`** – the tokio-tungstenite runner and a script host
//!   that answers from a table.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{ClientDispatcher, Connection, ConnectionState, DispatchError, ScriptHost};
pub use domain::ClientConfig;
