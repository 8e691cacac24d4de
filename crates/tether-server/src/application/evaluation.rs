//! Pending evaluation results.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::application::error::EvaluationError;
use crate::application::registry::CallbackRegistry;

enum State {
    /// Answered locally (for example from the shadow document).
    Ready(Option<Result<Value, EvaluationError>>),
    Waiting {
        callback_id: u64,
        rx: oneshot::Receiver<Result<Value, EvaluationError>>,
        registry: Arc<CallbackRegistry>,
    },
}

/// The result of an evaluation that the client has not answered yet.
///
/// Awaiting it suspends only the awaiting task; the session keeps accepting
/// other operations.  There is no built-in timeout: wrap it in
/// `tokio::time::timeout` if one is needed, and call
/// [`abandon`](Self::abandon) when giving up so the registry entry is freed.
pub struct PendingEvaluation {
    state: State,
}

impl PendingEvaluation {
    pub(crate) fn waiting(
        callback_id: u64,
        rx: oneshot::Receiver<Result<Value, EvaluationError>>,
        registry: Arc<CallbackRegistry>,
    ) -> Self {
        Self {
            state: State::Waiting {
                callback_id,
                rx,
                registry,
            },
        }
    }

    /// An evaluation that is already answered.
    pub fn ready(result: Result<Value, EvaluationError>) -> Self {
        Self {
            state: State::Ready(Some(result)),
        }
    }

    /// The callback token this evaluation waits on, if it was sent.
    pub fn callback_id(&self) -> Option<u64> {
        match &self.state {
            State::Waiting { callback_id, .. } => Some(*callback_id),
            State::Ready(_) => None,
        }
    }

    /// Gives up on the answer and removes the registry entry.  Nothing is
    /// sent to the client; a late answer is logged and dropped.
    pub fn abandon(self) {
        if let State::Waiting {
            callback_id,
            registry,
            ..
        } = self.state
        {
            registry.remove(callback_id);
        }
    }
}

impl Future for PendingEvaluation {
    type Output = Result<Value, EvaluationError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            State::Ready(result) => {
                Poll::Ready(result.take().unwrap_or(Err(EvaluationError::Abandoned)))
            }
            State::Waiting { rx, .. } => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(_)) => Poll::Ready(Err(EvaluationError::Abandoned)),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[test]
    fn test_waits_until_registry_resolves() {
        // Arrange
        let registry = Arc::new(CallbackRegistry::new());
        let rx = registry.register_once(5);
        let mut pending = task::spawn(PendingEvaluation::waiting(5, rx, Arc::clone(&registry)));

        // Act / Assert
        assert_pending!(pending.poll());
        registry.resolve(5, json!(4));
        assert!(pending.is_woken());
        assert_ready_eq!(pending.poll(), Ok(json!(4)));
    }

    #[test]
    fn test_removed_entry_reads_as_abandoned() {
        let registry = Arc::new(CallbackRegistry::new());
        let rx = registry.register_once(6);
        let mut pending = task::spawn(PendingEvaluation::waiting(6, rx, Arc::clone(&registry)));

        registry.clear();

        assert_ready_eq!(pending.poll(), Err(EvaluationError::Abandoned));
    }

    #[test]
    fn test_abandon_frees_registry_entry() {
        let registry = Arc::new(CallbackRegistry::new());
        let rx = registry.register_once(8);
        let pending = PendingEvaluation::waiting(8, rx, Arc::clone(&registry));

        pending.abandon();

        assert!(!registry.contains(8));
    }

    #[tokio::test]
    async fn test_ready_resolves_immediately() {
        let result = PendingEvaluation::ready(Ok(json!("cached"))).await;
        assert_eq!(result, Ok(json!("cached")));
    }
}
