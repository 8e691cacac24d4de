//! Observable values.
//!
//! An [`Observable`] holds a value and a list of subscribers.  `set` replaces
//! the value and calls every subscriber synchronously, on the caller's
//! thread, with the old and new values.  Setting an equal value is a no-op.
//!
//! Element methods such as `set_text_bound` subscribe to an observable and
//! register the matching `unsubscribe` in the element's cleanup scope.

use std::sync::{Arc, Mutex, MutexGuard};

type Subscriber<T> = Arc<dyn Fn(&T, &T) + Send + Sync>;

struct Inner<T> {
    value: T,
    subscribers: Vec<(u64, Subscriber<T>)>,
    next_id: u64,
}

/// Identifies one subscription; pass it to [`Observable::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

/// A shared, observable value.  Clones refer to the same value.
pub struct Observable<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Observable<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                value,
                subscribers: Vec::new(),
                next_id: 1,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self) -> T {
        self.lock().value.clone()
    }

    /// Replaces the value and notifies subscribers if it changed.
    pub fn set(&self, value: T) {
        let (old, subscribers) = {
            let mut inner = self.lock();
            if inner.value == value {
                return;
            }
            let old = std::mem::replace(&mut inner.value, value.clone());
            let subscribers: Vec<Subscriber<T>> =
                inner.subscribers.iter().map(|(_, s)| Arc::clone(s)).collect();
            (old, subscribers)
        };
        for subscriber in subscribers {
            subscriber(&old, &value);
        }
    }

    /// Applies `f` to a copy of the current value and stores the result.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.get());
        self.set(next);
    }

    /// Calls `f(old, new)` after every change.
    pub fn subscribe(&self, f: impl Fn(&T, &T) + Send + Sync + 'static) -> SubscriptionHandle {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, Arc::new(f)));
        SubscriptionHandle(id)
    }

    /// Removes a subscription.  Returns `false` if it was already removed.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut inner = self.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(id, _)| *id != handle.0);
        inner.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
