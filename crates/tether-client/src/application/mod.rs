//! Application layer: message dispatch and connection policy.

pub mod connection;
pub mod dispatcher;

pub use connection::{Connection, ConnectionState, NORMAL_CLOSURE};
pub use dispatcher::{ClientDispatcher, DispatchError, ScriptHost};
