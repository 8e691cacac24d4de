//! tether-server library crate.
//!
//! Lets server-resident Rust code drive a browser page: every page load gets
//! a session, and [`application::Element`] handles turn method calls into
//! messages on that session's WebSocket.
//!
//! # Architecture
//!
//! ```text
//! Browser  (bootstrap.js, JSON over WebSocket)
//!         ↕
//! [tether-server]
//!   ├── domain/           ServerConfig, RenderMode
//!   ├── application/      Session, Element, dispatcher, callback registry
//!   └── infrastructure/
//!         ├── ws_server/  axum router: page + WebSocket endpoint
//!         └── session_store/  client id → Session, orphan expiry
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//! use tether_server::application::Document;
//! use tether_server::domain::ServerConfig;
//! use tether_server::infrastructure::{run_server, PageBuilder};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let builder: PageBuilder = Arc::new(|doc: &Document| {
//!     let _ = doc.body().create_child("h1", [("id", "title")], None)
//!         .and_then(|h1| h1.set_text("Hello"));
//! });
//! run_server(ServerConfig::default(), builder, Arc::new(AtomicBool::new(true))).await
//! # }
//! ```

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: sessions, element handles, and protocol logic.
pub mod application;

/// Infrastructure layer: HTTP/WebSocket endpoint and session store.
pub mod infrastructure;
