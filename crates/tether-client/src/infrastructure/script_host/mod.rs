//! [`ScriptHost`](crate::application::ScriptHost) implementations.

pub mod canned;

pub use canned::CannedScriptHost;
