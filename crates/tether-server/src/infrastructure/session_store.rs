//! Sessions keyed by client id, with orphan expiry.
//!
//! A session whose socket goes away is kept for `orphan_timeout`.  If no
//! socket re-attaches within that window the session is removed and closed,
//! which runs its cleanup scope and abandons outstanding evaluations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::info;

use crate::application::session::{lock, Session};

/// Thread-safe map of live sessions.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    orphan_timeout: Duration,
}

impl SessionStore {
    pub fn new(orphan_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            orphan_timeout,
        })
    }

    pub fn insert(&self, session: Arc<Session>) {
        let id = session.client_id().to_string();
        if let Some(old) = lock(&self.sessions).insert(id.clone(), session) {
            old.close();
        }
        info!("client {id}: session created");
    }

    pub fn get(&self, client_id: &str) -> Option<Arc<Session>> {
        lock(&self.sessions).get(client_id).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and closes a session.  Returns `false` if it was not present.
    pub fn remove(&self, client_id: &str) -> bool {
        let removed = lock(&self.sessions).remove(client_id);
        match removed {
            Some(session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    /// Starts the orphan timer for a session whose socket has gone.  A new
    /// attachment before the timer fires keeps the session alive.
    pub fn schedule_expiry(self: &Arc<Self>, session: &Arc<Session>) {
        let store = Arc::clone(self);
        let client_id = session.client_id().to_string();
        let seen = session.attachments();
        let timeout = self.orphan_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            store.expire_if_orphaned(&client_id, seen);
        });
    }

    /// Removes the session if it has not been attached since attachment
    /// number `seen` and is still detached.
    pub fn expire_if_orphaned(&self, client_id: &str, seen: u64) -> bool {
        let mut sessions = lock(&self.sessions);
        let orphaned = sessions
            .get(client_id)
            .is_some_and(|s| s.attachments() == seen && !s.is_live());
        if !orphaned {
            return false;
        }
        let session = sessions.remove(client_id);
        drop(sessions);
        if let Some(session) = session {
            info!("client {client_id}: orphaned session expired");
            session.close();
        }
        true
    }

    /// Closes every session (server shutdown).
    pub fn close_all(&self) {
        let sessions: Vec<_> = lock(&self.sessions).drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.close();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
