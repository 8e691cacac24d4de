//! Cleanup scopes.
//!
//! A [`CleanupScope`] collects deregistration closures (listener removal,
//! observable unsubscription) registered while an element subtree is built.
//! Ending the scope runs each closure exactly once, newest first.  Scopes
//! nest: a child scope is ended when its parent ends.
//!
//! [`ScopeGuard`] ends a scope on drop, so cleanup also runs when the
//! building code returns early or panics.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

type Cleanup = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct ScopeState {
    cleanups: Vec<Cleanup>,
    closed: bool,
}

/// A shared list of cleanup closures.  Clones refer to the same scope.
#[derive(Clone, Default)]
pub struct CleanupScope {
    state: Arc<Mutex<ScopeState>>,
}

impl fmt::Debug for CleanupScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("CleanupScope")
            .field("pending", &state.cleanups.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl CleanupScope {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScopeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers `f` to run when the scope ends.  If the scope has already
    /// ended, `f` runs immediately.
    pub fn on_cleanup(&self, f: impl FnOnce() + Send + 'static) {
        let mut state = self.lock();
        if state.closed {
            drop(state);
            f();
        } else {
            state.cleanups.push(Box::new(f));
        }
    }

    /// Creates a scope that ends no later than this one.
    pub fn child(&self) -> CleanupScope {
        let child = CleanupScope::new();
        let handle = child.clone();
        self.on_cleanup(move || handle.end());
        child
    }

    /// Runs every registered closure, newest first.  Later calls do nothing.
    pub fn end(&self) {
        let cleanups = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.cleanups)
        };
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
    }

    pub fn is_ended(&self) -> bool {
        self.lock().closed
    }

    /// Number of closures waiting to run.
    pub fn pending(&self) -> usize {
        self.lock().cleanups.len()
    }

    /// Returns a guard that ends this scope when dropped.
    pub fn guard(&self) -> ScopeGuard {
        ScopeGuard {
            scope: self.clone(),
            armed: true,
        }
    }
}

/// Ends its scope on drop, unless [`keep`](ScopeGuard::keep) was called.
#[must_use = "the scope ends as soon as the guard is dropped"]
pub struct ScopeGuard {
    scope: CleanupScope,
    armed: bool,
}

impl ScopeGuard {
    pub fn scope(&self) -> &CleanupScope {
        &self.scope
    }

    /// Disarms the guard and leaves the scope open.
    pub fn keep(mut self) -> CleanupScope {
        self.armed = false;
        self.scope.clone()
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if self.armed {
            self.scope.end();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
