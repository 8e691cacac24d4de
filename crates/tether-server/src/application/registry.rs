//! Per-session callback registry.
//!
//! Maps callback tokens to whatever is waiting for the client's answer:
//!
//! - a **one-shot** entry for an evaluation, resolved or rejected exactly once
//!   and removed at that point;
//! - a **listener** entry for an event listener, invoked on every matching
//!   callback until it is removed.
//!
//! Debug tokens are tracked alongside so that a client-reported script error
//! can be routed to the evaluation it belongs to.  Evaluation tokens live as
//! long as their evaluation.  Execute tokens never get an answer on success,
//! so only the most recent [`RECENT_EXECUTIONS`] are remembered.
//!
//! The registry is shared (`Arc`) between the session, pending evaluations,
//! and cleanup closures.  A single `std::sync::Mutex` guards the maps; it is
//! never held while a listener runs, so a listener may register or remove
//! callbacks itself.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use tether_core::ScriptFailure;

use crate::application::error::EvaluationError;

/// How many execute debug tokens are kept for error reports.
pub const RECENT_EXECUTIONS: usize = 64;

/// Sender half of a one-shot evaluation.
pub type Resolver = oneshot::Sender<Result<Value, EvaluationError>>;

/// A multi-fire event listener.
pub type Listener = Arc<dyn Fn(Value) + Send + Sync>;

enum Callback {
    OneShot(Resolver),
    Listener(Listener),
}

/// What a debug token was attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugOrigin {
    /// An evaluation; an error rejects the pending result.
    Evaluation(u64),
    /// A fire-and-forget script; the text is kept (truncated) for the log line.
    Execution(String),
}

/// Outcome of routing a client-reported script error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorRouting {
    /// The error rejected a pending evaluation.
    Rejected(u64),
    /// The error belonged to an execute message; nothing was waiting.
    Execution(String),
    /// The debug token is unknown or its evaluation is already gone.
    Unmatched,
}

#[derive(Default)]
struct RegistryState {
    callbacks: HashMap<u64, Callback>,
    /// Evaluation debug tokens, both directions.
    evaluation_tokens: HashMap<String, u64>,
    tokens_by_callback: HashMap<u64, String>,
    /// Recent execute tokens with their script snippet, oldest first.
    executions: VecDeque<(String, String)>,
}

impl RegistryState {
    fn forget_token_of(&mut self, callback_id: u64) {
        if let Some(token) = self.tokens_by_callback.remove(&callback_id) {
            self.evaluation_tokens.remove(&token);
        }
    }
}

/// Thread-safe map of outstanding callback tokens.
#[derive(Default)]
pub struct CallbackRegistry {
    state: Mutex<RegistryState>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // A poisoned registry still holds consistent maps; keep serving.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a one-shot entry and returns the receiving half.
    pub fn register_once(&self, callback_id: u64) -> oneshot::Receiver<Result<Value, EvaluationError>> {
        let (tx, rx) = oneshot::channel();
        self.lock().callbacks.insert(callback_id, Callback::OneShot(tx));
        rx
    }

    /// Registers a listener that is invoked on every callback for `callback_id`.
    pub fn register_listener(&self, callback_id: u64, listener: Listener) {
        self.lock()
            .callbacks
            .insert(callback_id, Callback::Listener(listener));
    }

    pub fn bind_debug_token(&self, token: String, origin: DebugOrigin) {
        let mut state = self.lock();
        match origin {
            DebugOrigin::Evaluation(callback_id) => {
                state.tokens_by_callback.insert(callback_id, token.clone());
                state.evaluation_tokens.insert(token, callback_id);
            }
            DebugOrigin::Execution(script) => {
                if state.executions.len() == RECENT_EXECUTIONS {
                    state.executions.pop_front();
                }
                state.executions.push_back((token, script));
            }
        }
    }

    /// Number of debug tokens currently remembered.
    pub fn debug_tokens(&self) -> usize {
        let state = self.lock();
        state.evaluation_tokens.len() + state.executions.len()
    }

    /// Delivers a callback payload.
    ///
    /// One-shot entries are removed and receive `data` unchanged.  Listeners
    /// stay registered and receive the payload decoded by
    /// [`decode_listener_payload`].  Returns `false` if nothing was
    /// registered under `callback_id`.
    pub fn resolve(&self, callback_id: u64, data: Value) -> bool {
        let mut state = self.lock();
        let listener = match state.callbacks.remove(&callback_id) {
            Some(Callback::OneShot(tx)) => {
                state.forget_token_of(callback_id);
                drop(state);
                if tx.send(Ok(data)).is_err() {
                    debug!("callback {callback_id}: receiver dropped before the answer arrived");
                }
                return true;
            }
            Some(Callback::Listener(listener)) => {
                state
                    .callbacks
                    .insert(callback_id, Callback::Listener(Arc::clone(&listener)));
                listener
            }
            None => {
                debug!("callback {callback_id}: no registered handler, dropping payload");
                return false;
            }
        };
        drop(state);
        listener(decode_listener_payload(data));
        true
    }

    /// Routes a client-reported script error by its debug token.
    pub fn reject(&self, debug_token: &str, failure: ScriptFailure) -> ErrorRouting {
        let mut state = self.lock();
        if let Some(callback_id) = state.evaluation_tokens.remove(debug_token) {
            state.tokens_by_callback.remove(&callback_id);
            return match state.callbacks.remove(&callback_id) {
                Some(Callback::OneShot(tx)) => {
                    drop(state);
                    let _ = tx.send(Err(EvaluationError::from(failure)));
                    ErrorRouting::Rejected(callback_id)
                }
                Some(other) => {
                    state.callbacks.insert(callback_id, other);
                    warn!("debug token {debug_token} points at listener {callback_id}");
                    ErrorRouting::Unmatched
                }
                None => ErrorRouting::Unmatched,
            };
        }
        match state.executions.iter().position(|(token, _)| token == debug_token) {
            Some(index) => state
                .executions
                .remove(index)
                .map_or(ErrorRouting::Unmatched, |(_, script)| ErrorRouting::Execution(script)),
            None => ErrorRouting::Unmatched,
        }
    }

    /// Removes an entry without resolving it.  A one-shot receiver observes
    /// [`EvaluationError::Abandoned`].
    pub fn remove(&self, callback_id: u64) -> bool {
        let mut state = self.lock();
        let removed = state.callbacks.remove(&callback_id).is_some();
        if removed {
            state.forget_token_of(callback_id);
        }
        removed
    }

    pub fn contains(&self, callback_id: u64) -> bool {
        self.lock().callbacks.contains_key(&callback_id)
    }

    pub fn len(&self) -> usize {
        self.lock().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry.  Outstanding evaluations observe `Abandoned`.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.callbacks.clear();
        state.evaluation_tokens.clear();
        state.tokens_by_callback.clear();
        state.executions.clear();
    }
}

/// Listener payloads arrive as JSON text (the client stringifies the event
/// object).  Anything that is not a string holding valid JSON is passed
/// through unchanged.
pub fn decode_listener_payload(data: Value) -> Value {
    match data {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn failure(message: &str) -> ScriptFailure {
        ScriptFailure {
            name: "Error".to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_one_shot_is_removed_after_resolution() {
        // Arrange
        let registry = CallbackRegistry::new();
        let mut rx = registry.register_once(1);

        // Act
        let first = registry.resolve(1, json!(4));
        let second = registry.resolve(1, json!(5));

        // Assert
        assert!(first);
        assert!(!second, "a one-shot entry must never fire twice");
        assert_eq!(rx.try_recv().unwrap(), Ok(json!(4)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_listener_fires_every_time() {
        let registry = CallbackRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        registry.register_listener(
            7,
            Arc::new(move |_: Value| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );

        registry.resolve(7, json!("{}"));
        registry.resolve(7, json!("{}"));
        registry.resolve(7, json!("{}"));

        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(registry.contains(7));
    }

    #[test]
    fn test_listener_receives_decoded_payload() {
        let registry = CallbackRegistry::new();
        let captured = Arc::new(Mutex::new(Value::Null));
        let sink = Arc::clone(&captured);
        registry.register_listener(2, Arc::new(move |v: Value| *sink.lock().unwrap() = v));

        registry.resolve(2, json!(r#"{"key":"Enter","retrieved":"abc"}"#));

        assert_eq!(
            *captured.lock().unwrap(),
            json!({"key": "Enter", "retrieved": "abc"})
        );
    }

    #[test]
    fn test_reject_routes_to_evaluation_and_removes_it() {
        // Arrange
        let registry = CallbackRegistry::new();
        let mut rx = registry.register_once(3);
        registry.bind_debug_token("d1".to_string(), DebugOrigin::Evaluation(3));

        // Act
        let routing = registry.reject("d1", failure("x"));

        // Assert
        assert_eq!(routing, ErrorRouting::Rejected(3));
        assert_eq!(
            rx.try_recv().unwrap(),
            Err(EvaluationError::Client {
                name: "Error".to_string(),
                message: "x".to_string()
            })
        );
        assert!(!registry.contains(3));
        assert!(!registry.resolve(3, json!(1)));
    }

    #[test]
    fn test_reject_for_execution_reports_script() {
        let registry = CallbackRegistry::new();
        registry.bind_debug_token("d2".to_string(), DebugOrigin::Execution("boom()".to_string()));

        assert_eq!(
            registry.reject("d2", failure("boom is not defined")),
            ErrorRouting::Execution("boom()".to_string())
        );
        assert_eq!(registry.reject("d2", failure("again")), ErrorRouting::Unmatched);
    }

    #[test]
    fn test_remove_abandons_one_shot() {
        let registry = CallbackRegistry::new();
        let mut rx = registry.register_once(9);

        assert!(registry.remove(9));

        assert!(rx.try_recv().is_err());
        assert!(!registry.remove(9));
    }

    #[test]
    fn test_unknown_callback_is_dropped() {
        let registry = CallbackRegistry::new();
        assert!(!registry.resolve(404, json!(null)));
    }

    #[test]
    fn test_decode_listener_payload_passes_through_non_json() {
        assert_eq!(decode_listener_payload(json!("plain")), json!("plain"));
        assert_eq!(decode_listener_payload(json!(4)), json!(4));
    }

    #[test]
    fn test_concurrent_registration_keeps_entries_distinct() {
        // Arrange
        let registry = Arc::new(CallbackRegistry::new());

        // Act: 8 threads each register and resolve their own token
        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                let r = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let mut rx = r.register_once(i);
                    assert!(r.resolve(i, json!(i)));
                    rx.try_recv().unwrap()
                })
            })
            .collect();

        // Assert
        for (i, h) in handles.into_iter().enumerate() {
            assert_eq!(h.join().unwrap(), Ok(json!(i as u64)));
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_execute_tokens_are_bounded() {
        // Arrange
        let registry = CallbackRegistry::new();

        // Act
        for n in 0..1000 {
            registry.bind_debug_token(format!("d{n}"), DebugOrigin::Execution(format!("f{n}()")));
        }

        // Assert: only the newest tokens are kept, and they still route
        assert_eq!(registry.debug_tokens(), RECENT_EXECUTIONS);
        assert_eq!(registry.reject("d0", failure("old")), ErrorRouting::Unmatched);
        assert_eq!(
            registry.reject("d999", failure("new")),
            ErrorRouting::Execution("f999()".to_string())
        );
    }

    #[test]
    fn test_evaluation_token_is_forgotten_on_resolution() {
        let registry = CallbackRegistry::new();
        let _rx = registry.register_once(4);
        registry.bind_debug_token("d1".to_string(), DebugOrigin::Evaluation(4));

        registry.resolve(4, json!(1));

        assert_eq!(registry.debug_tokens(), 0);
        assert_eq!(registry.reject("d1", failure("late")), ErrorRouting::Unmatched);
    }
}
