//! Connection lifecycle: outgoing queue, hello, and reconnect policy.
//!
//! Frames produced while the socket is not open are queued.  When a socket
//! opens, the hello goes out first and the queue is flushed behind it in
//! order.  A clean close (code 1000) reconnects with the same client id;
//! any other close or a transport error means the page must be reloaded.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use tether_core::{encode_client_message, ClientMessage, CodecError};

/// Normal closure.  The only close code that allows a reconnect.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Where the connection stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket requested but not open yet.
    Connecting,
    Open,
    /// Closed cleanly; the same client id will be used again.
    Reconnecting,
    /// Closed abnormally; the session cannot be resumed.
    Reload,
}

/// Per-page connection bookkeeping, independent of the socket library.
#[derive(Debug)]
pub struct Connection {
    client_id: String,
    state: ConnectionState,
    outbox: VecDeque<String>,
}

impl Connection {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            state: ConnectionState::Connecting,
            outbox: VecDeque::new(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn queued(&self) -> usize {
        self.outbox.len()
    }

    /// Returns the frame if it can be written now, or queues it and
    /// returns `None`.
    pub fn send(&mut self, frame: String) -> Option<String> {
        if self.state == ConnectionState::Open {
            Some(frame)
        } else {
            debug!("client {}: socket not open, queueing frame", self.client_id);
            self.outbox.push_back(frame);
            None
        }
    }

    /// Marks the socket open and returns the frames to write, hello first.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the hello cannot be encoded.
    pub fn on_open(&mut self) -> Result<Vec<String>, CodecError> {
        let hello = encode_client_message(&ClientMessage::Hello {
            client_id: Some(self.client_id.clone()),
        })?;
        self.state = ConnectionState::Open;
        let mut frames = Vec::with_capacity(self.outbox.len() + 1);
        frames.push(hello);
        frames.extend(self.outbox.drain(..));
        info!("client {}: socket open, flushing {} queued frame(s)", self.client_id, frames.len() - 1);
        Ok(frames)
    }

    /// Records a close.  `None` means the socket went away without a close
    /// frame, which counts as unclean.
    pub fn on_close(&mut self, code: Option<u16>) -> ConnectionState {
        self.state = match code {
            Some(NORMAL_CLOSURE) => {
                info!("client {}: socket closed cleanly, will reconnect", self.client_id);
                ConnectionState::Reconnecting
            }
            other => {
                warn!("client {}: socket closed with {other:?}, reload required", self.client_id);
                ConnectionState::Reload
            }
        };
        self.state
    }

    pub fn on_error(&mut self) -> ConnectionState {
        warn!("client {}: socket error, reload required", self.client_id);
        self.state = ConnectionState::Reload;
        self.state
    }

    /// Starts a new attempt after a clean close.  No effect in any other
    /// state.
    pub fn reconnect(&mut self) -> bool {
        if self.state == ConnectionState::Reconnecting {
            self.state = ConnectionState::Connecting;
            true
        } else {
            false
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_queue_until_open_then_follow_hello() {
        // Arrange
        let mut conn = Connection::new("c1");
        assert_eq!(conn.send("a".into()), None);
        assert_eq!(conn.send("b".into()), None);

        // Act
        let frames = conn.on_open().unwrap();

        // Assert
        assert_eq!(frames, vec![r#"{"id":"c1","hello":true}"#, "a", "b"]);
        assert_eq!(conn.queued(), 0);
        assert_eq!(conn.send("c".into()), Some("c".to_string()));
    }

    #[test]
    fn test_clean_close_reconnects_with_same_id() {
        let mut conn = Connection::new("c1");
        conn.on_open().unwrap();

        assert_eq!(conn.on_close(Some(1000)), ConnectionState::Reconnecting);
        assert!(conn.reconnect());
        let frames = conn.on_open().unwrap();

        assert_eq!(frames[0], r#"{"id":"c1","hello":true}"#);
        assert_eq!(conn.client_id(), "c1");
    }

    #[test]
    fn test_abnormal_close_requires_reload() {
        let mut conn = Connection::new("c1");
        conn.on_open().unwrap();

        assert_eq!(conn.on_close(Some(4001)), ConnectionState::Reload);
        assert!(!conn.reconnect());
    }

    #[test]
    fn test_close_without_frame_requires_reload() {
        let mut conn = Connection::new("c1");
        assert_eq!(conn.on_close(None), ConnectionState::Reload);
    }

    #[test]
    fn test_error_requires_reload() {
        let mut conn = Connection::new("c1");
        conn.on_open().unwrap();
        assert_eq!(conn.on_error(), ConnectionState::Reload);
    }

    #[test]
    fn test_frames_sent_while_reconnecting_are_queued() {
        let mut conn = Connection::new("c1");
        conn.on_open().unwrap();
        conn.on_close(Some(1000));

        assert_eq!(conn.send("late".into()), None);
        conn.reconnect();
        let frames = conn.on_open().unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], "late");
    }
}
