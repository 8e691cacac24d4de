//! # tether-core
//!
//! Shared library for tether containing the browser wire protocol, the
//! structured DOM instruction model, and the in-memory document tree.
//!
//! This crate is used by both the server and the client dispatcher.
//! It has zero dependencies on sockets, async runtimes, or HTTP.
//!
//! # Architecture overview
//!
//! tether lets server-resident code drive a browser page as if the DOM were
//! local.  Every mutation and every event observation travels over one
//! WebSocket per browser tab.
//!
//! - **`protocol`** – The JSON messages exchanged over that socket.  The server
//!   sends `execute`, `evaluate`, or `instructions` messages; the client answers
//!   with `hello`, `callback`, or `error` messages.  Instructions are small,
//!   replay-safe DOM mutations addressed by element id.
//!
//! - **`domain`** – The [`DomTree`] document model.  The server uses it as the
//!   shadow copy of a page that is not connected yet; the client dispatcher
//!   applies instructions to it.

pub mod domain;
pub mod protocol;

pub use domain::document::{DocumentError, DomTree, NodeId, NodeKind};
pub use protocol::codec::{
    decode_client_message, decode_server_message, encode_client_message, encode_server_message,
    CodecError,
};
pub use protocol::instruction::Instruction;
pub use protocol::messages::{ClientMessage, Outbound, ScriptFailure, ServerMessage};
