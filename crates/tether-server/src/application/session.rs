//! Per-connection session state.
//!
//! A [`Session`] is everything the server knows about one browser tab:
//!
//! - the outbound link: a queue while no socket is attached, or the sender
//!   half of the socket task's channel once the client has said hello;
//! - the catching-outbound buffer, present while script is being collected
//!   instead of sent;
//! - the optional shadow document, present from page build until the
//!   client's hello;
//! - the callback registry, per-element flags, and token counters.
//!
//! Sessions are shared as `Arc<Session>` by element handles, the socket task,
//! and the session store.  All state is behind `std::sync::Mutex`es that are
//! never held across an `.await` or while user callbacks run.
//!
//! # Flush on hello
//!
//! [`Session::transport_ready`] discards the shadow document and sends every
//! queued message in order, merging runs of consecutive instruction messages
//! into a single batch.  The link lock is held for the whole flush so a
//! concurrent mutation cannot overtake the queue.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tether_core::protocol::{Evaluate, Execute, TokenCounter};
use tether_core::{DomTree, Instruction, Outbound, ScriptFailure, ServerMessage};

use crate::application::error::DomError;
use crate::application::evaluation::PendingEvaluation;
use crate::application::registry::{CallbackRegistry, DebugOrigin, ErrorRouting, Listener};
use crate::application::scope::CleanupScope;

/// Longest script prefix kept for a debug-token log line.
const DEBUG_SNIPPET_CHARS: usize = 120;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

enum Link {
    /// No socket yet, or the socket went away.  Messages wait here.
    Pending(Vec<ServerMessage>),
    Live {
        tx: mpsc::UnboundedSender<ServerMessage>,
        attachment: u64,
    },
}

/// Server-side state for one browser tab.
pub struct Session {
    client_id: String,
    link: Mutex<Link>,
    catching: Mutex<Option<Vec<String>>>,
    shadow: Mutex<Option<DomTree>>,
    registry: Arc<CallbackRegistry>,
    flags: Mutex<HashSet<String>>,
    callback_ids: TokenCounter,
    element_ids: TokenCounter,
    debug_ids: TokenCounter,
    debug_tokens: bool,
    attachments: AtomicU64,
    scope: CleanupScope,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("client_id", &self.client_id)
            .field("live", &self.is_live())
            .field("shadow", &self.has_shadow())
            .field("catching", &self.is_catching())
            .field("callbacks", &self.registry.len())
            .finish()
    }
}

impl Session {
    /// Creates a detached session with no shadow document.
    pub fn new(client_id: impl Into<String>, debug_tokens: bool) -> Self {
        Self {
            client_id: client_id.into(),
            link: Mutex::new(Link::Pending(Vec::new())),
            catching: Mutex::new(None),
            shadow: Mutex::new(None),
            registry: Arc::new(CallbackRegistry::new()),
            flags: Mutex::new(HashSet::new()),
            callback_ids: TokenCounter::new(),
            element_ids: TokenCounter::new(),
            debug_ids: TokenCounter::new(),
            debug_tokens,
            attachments: AtomicU64::new(0),
            scope: CleanupScope::new(),
        }
    }

    /// Creates a session whose page will be built against a fresh shadow
    /// document (`<html><head/><body/></html>`).
    pub fn with_shadow(client_id: impl Into<String>, debug_tokens: bool) -> Self {
        let session = Self::new(client_id, debug_tokens);
        *lock(&session.shadow) = Some(DomTree::new());
        session
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    /// The session-wide cleanup scope; ended when the session is closed.
    pub fn scope(&self) -> &CleanupScope {
        &self.scope
    }

    pub fn has_shadow(&self) -> bool {
        lock(&self.shadow).is_some()
    }

    pub fn is_catching(&self) -> bool {
        lock(&self.catching).is_some()
    }

    pub fn is_live(&self) -> bool {
        matches!(*lock(&self.link), Link::Live { .. })
    }

    /// Number of messages waiting for a socket.
    pub fn queued(&self) -> usize {
        match &*lock(&self.link) {
            Link::Pending(queue) => queue.len(),
            Link::Live { .. } => 0,
        }
    }

    /// Number of times a socket has been attached.
    pub fn attachments(&self) -> u64 {
        self.attachments.load(Ordering::SeqCst)
    }

    /// Runs `f` against the shadow document, if there is one.
    pub fn with_shadow_document<R>(&self, f: impl FnOnce(&mut DomTree) -> R) -> Option<R> {
        lock(&self.shadow).as_mut().map(f)
    }

    /// Allocates a fresh element id (`K1`, `K2`, ...).
    pub fn next_element_id(&self) -> String {
        format!("K{}", self.element_ids.next())
    }

    pub fn next_callback_id(&self) -> u64 {
        self.callback_ids.next()
    }

    // ── Per-element flags ─────────────────────────────────────────────────────

    /// Sets a flag; returns `false` if it was already set.
    pub fn set_flag(&self, flag: String) -> bool {
        lock(&self.flags).insert(flag)
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        lock(&self.flags).contains(flag)
    }

    // ── Outbound ─────────────────────────────────────────────────────────────

    /// Runs `js` on the client for its side effects.
    ///
    /// While catching, the script is collected instead of sent.
    pub fn execute(&self, js: &str) {
        if let Some(buffer) = lock(&self.catching).as_mut() {
            buffer.push(js.to_string());
            return;
        }
        let debug_token = self.debug_token(|| DebugOrigin::Execution(snippet(js)));
        self.deliver(Outbound::Execute(Execute {
            js: js.to_string(),
            debug_token,
        }));
    }

    /// Evaluates `js` on the client and returns the pending result.
    ///
    /// # Errors
    ///
    /// [`DomError::EvaluateWhileCatching`] while outbound script is being
    /// collected: the answer could never be correlated.
    pub fn evaluate(&self, js: &str) -> Result<PendingEvaluation, DomError> {
        if self.is_catching() {
            return Err(DomError::EvaluateWhileCatching);
        }
        let callback_id = self.next_callback_id();
        let rx = self.registry.register_once(callback_id);
        let debug_token = self.debug_token(|| DebugOrigin::Evaluation(callback_id));
        self.deliver(Outbound::Evaluate(Evaluate {
            js: js.to_string(),
            callback_id,
            debug_token,
        }));
        Ok(PendingEvaluation::waiting(
            callback_id,
            rx,
            Arc::clone(&self.registry),
        ))
    }

    /// Registers `listener` under `callback_id`, then executes `js` (which is
    /// expected to call `callbackWs(callback_id, ...)` on the client).
    pub fn execute_with_callback(&self, js: &str, callback_id: u64, listener: Listener) {
        self.registry.register_listener(callback_id, listener);
        self.execute(js);
    }

    pub fn remove_callback(&self, callback_id: u64) -> bool {
        self.registry.remove(callback_id)
    }

    pub(crate) fn send_instruction(&self, instruction: Instruction) {
        self.deliver(Outbound::Instructions(vec![instruction]));
    }

    fn debug_token(&self, origin: impl FnOnce() -> DebugOrigin) -> Option<String> {
        if !self.debug_tokens {
            return None;
        }
        let token = format!("d{}", self.debug_ids.next());
        self.registry.bind_debug_token(token.clone(), origin());
        Some(token)
    }

    fn deliver(&self, body: Outbound) {
        let msg = ServerMessage {
            client_id: self.client_id.clone(),
            body,
        };
        let mut link = lock(&self.link);
        match &mut *link {
            Link::Pending(queue) => queue.push(msg),
            Link::Live { tx, .. } => {
                if let Err(mpsc::error::SendError(msg)) = tx.send(msg) {
                    debug!("client {}: socket task gone, queueing", self.client_id);
                    *link = Link::Pending(vec![msg]);
                }
            }
        }
    }

    // ── Catching outbound ─────────────────────────────────────────────────────

    /// Runs `f` with catching-outbound enabled and returns the collected
    /// script alongside `f`'s result.  Nothing is sent.
    ///
    /// Catching nests: an inner call collects only what happens inside it.
    pub fn catch_outbound<R>(&self, f: impl FnOnce() -> R) -> (R, String) {
        let guard = CatchGuard::begin(&self.catching);
        let result = f();
        let scripts = guard.finish();
        (result, scripts.join("\n"))
    }

    /// Runs `f` with catching-outbound enabled, then sends everything it
    /// produced as a single execute message.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let (result, js) = self.catch_outbound(f);
        if !js.is_empty() {
            self.execute(&js);
        }
        result
    }

    // ── Transport lifecycle ───────────────────────────────────────────────────

    /// Attaches a socket.  Discards the shadow document and flushes the
    /// queue in order.  Returns the attachment number to pass to
    /// [`detach_transport`](Self::detach_transport).
    pub fn transport_ready(&self, tx: mpsc::UnboundedSender<ServerMessage>) -> u64 {
        let attachment = self.attachments.fetch_add(1, Ordering::SeqCst) + 1;
        let mut link = lock(&self.link);
        let queued = match std::mem::replace(&mut *link, Link::Pending(Vec::new())) {
            Link::Pending(queue) => queue,
            Link::Live { .. } => Vec::new(),
        };
        if lock(&self.shadow).take().is_some() {
            debug!("client {}: shadow document discarded", self.client_id);
        }
        let batches = coalesce(queued);
        info!(
            "client {}: transport ready, flushing {} message(s)",
            self.client_id,
            batches.len()
        );
        for msg in batches {
            if tx.send(msg).is_err() {
                warn!("client {}: socket closed during flush", self.client_id);
                break;
            }
        }
        *link = Link::Live { tx, attachment };
        attachment
    }

    /// Detaches the socket of the given attachment.  Later messages queue
    /// until the next [`transport_ready`](Self::transport_ready).  Returns
    /// `false` if a newer socket has already replaced it.
    pub fn detach_transport(&self, attachment: u64) -> bool {
        let mut link = lock(&self.link);
        match &*link {
            Link::Live { attachment: current, .. } if *current == attachment => {
                *link = Link::Pending(Vec::new());
                info!("client {}: transport detached", self.client_id);
                true
            }
            _ => false,
        }
    }

    /// Ends the session: runs its cleanup scope and abandons every
    /// outstanding evaluation.
    pub fn close(&self) {
        self.scope.end();
        self.registry.clear();
        *lock(&self.link) = Link::Pending(Vec::new());
        info!("client {}: session closed", self.client_id);
    }

    // ── Inbound ──────────────────────────────────────────────────────────────

    /// Delivers a callback payload to its registry entry.
    pub fn handle_callback(&self, callback_id: u64, data: serde_json::Value) -> bool {
        self.registry.resolve(callback_id, data)
    }

    /// Routes a client-reported script failure.
    pub fn handle_error(&self, debug_token: &str, error: ScriptFailure) {
        match self.registry.reject(debug_token, error.clone()) {
            ErrorRouting::Rejected(callback_id) => debug!(
                "client {}: evaluation {callback_id} failed: {}: {}",
                self.client_id, error.name, error.message
            ),
            ErrorRouting::Execution(script) => warn!(
                "client {}: script failed ({}: {}): {script}",
                self.client_id, error.name, error.message
            ),
            ErrorRouting::Unmatched => warn!(
                "client {}: error for unknown debug token {debug_token}: {}: {}",
                self.client_id, error.name, error.message
            ),
        }
    }
}

/// Merges runs of consecutive instruction messages, keeping order.
fn coalesce(queue: Vec<ServerMessage>) -> Vec<ServerMessage> {
    let mut out: Vec<ServerMessage> = Vec::with_capacity(queue.len());
    for msg in queue {
        if let (Some(ServerMessage {
            body: Outbound::Instructions(batch),
            ..
        }), Outbound::Instructions(next)) = (out.last_mut(), &msg.body)
        {
            batch.extend(next.iter().cloned());
            continue;
        }
        out.push(msg);
    }
    out
}

fn snippet(js: &str) -> String {
    let mut chars = js.chars();
    let head: String = chars.by_ref().take(DEBUG_SNIPPET_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Restores the previous catching state even if the caught closure panics.
struct CatchGuard<'a> {
    slot: &'a Mutex<Option<Vec<String>>>,
    previous: Option<Option<Vec<String>>>,
}

impl<'a> CatchGuard<'a> {
    fn begin(slot: &'a Mutex<Option<Vec<String>>>) -> Self {
        let previous = lock(slot).replace(Vec::new());
        Self {
            slot,
            previous: Some(previous),
        }
    }

    fn finish(mut self) -> Vec<String> {
        let previous = self.previous.take().unwrap_or_default();
        std::mem::replace(&mut *lock(self.slot), previous).unwrap_or_default()
    }
}

impl Drop for CatchGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *lock(self.slot) = previous;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
