//! Per-session counter for callback tokens and generated element ids.
//!
//! # Why a counter instead of random tokens?
//!
//! A callback token links an outbound `evaluate` or listener registration to
//! the client's eventual `callback` message.  Two outstanding requests must
//! never share a token, or one response would resolve the wrong caller.
//! Random tokens make that a matter of luck (the birthday bound); a counter
//! that only moves forward makes it impossible while fewer than 2^64 tokens
//! have been issued in one session.
//!
//! # Thread safety
//!
//! The counter uses `AtomicU64` internally, so tasks on different runtime
//! threads can allocate tokens for the same session without a lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// A thread-safe, monotonically increasing token source.
///
/// Tokens start at 1 so that 0 never appears on the wire; a client that
/// sends `callbackId: 0` is therefore always answering something unknown.
///
/// # Examples
///
/// ```rust
/// use tether_core::protocol::TokenCounter;
///
/// let tokens = TokenCounter::new();
/// assert_eq!(tokens.next(), 1);
/// assert_eq!(tokens.next(), 2);
/// ```
#[derive(Debug)]
pub struct TokenCounter {
    inner: AtomicU64,
}

impl TokenCounter {
    /// Creates a new counter whose first token is 1.
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(1),
        }
    }

    /// Returns the next token and atomically advances the counter.
    ///
    /// `Ordering::Relaxed` is enough: tokens only need to be distinct, they
    /// do not publish any other memory.
    pub fn next(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the token the next call to [`next`](Self::next) will hand out.
    pub fn peek(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}
