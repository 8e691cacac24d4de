//! Script host that answers from a table instead of running JavaScript.
//!
//! The headless client has no script engine.  `CannedScriptHost` records
//! every script it is asked to run, so tests and operators can see exactly
//! what the server sent, and answers with a configured value or failure.
//! Anything not configured completes with `null`.
//!
//! ```ignore
//! let host = Arc::new(CannedScriptHost::new().answer("2+2", json!(4)));
//! let dispatcher = ClientDispatcher::new(client_id, host.clone());
//! // ...
//! assert_eq!(host.scripts.lock().unwrap()[0], "2+2");
//! ```

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tracing::debug;

use tether_core::ScriptFailure;

use crate::application::ScriptHost;

/// Records scripts and replies with canned results.
#[derive(Default)]
pub struct CannedScriptHost {
    /// Every script passed to `run`, in order.
    pub scripts: Mutex<Vec<String>>,
    answers: HashMap<String, Value>,
    failures: HashMap<String, ScriptFailure>,
}

impl CannedScriptHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completes `js` with `value`.
    pub fn answer(mut self, js: impl Into<String>, value: Value) -> Self {
        self.answers.insert(js.into(), value);
        self
    }

    /// Makes `js` throw `name: message`.
    pub fn fail(mut self, js: impl Into<String>, name: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(
            js.into(),
            ScriptFailure {
                name: name.into(),
                message: message.into(),
            },
        );
        self
    }

    /// Snapshot of the recorded scripts.
    pub fn recorded(&self) -> Vec<String> {
        self.scripts
            .lock()
            .map(|scripts| scripts.clone())
            .unwrap_or_default()
    }
}

impl ScriptHost for CannedScriptHost {
    fn run(&self, js: &str) -> Result<Value, ScriptFailure> {
        debug!("script: {js}");
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push(js.to_string());
        }
        if let Some(failure) = self.failures.get(js) {
            return Err(failure.clone());
        }
        Ok(self.answers.get(js).cloned().unwrap_or(Value::Null))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
