//! Infrastructure layer: the WebSocket runner and script hosts.

pub mod network;
pub mod script_host;

pub use network::{fetch_client_id, run, ClientNetworkError, RunOutcome};
pub use script_host::CannedScriptHost;
