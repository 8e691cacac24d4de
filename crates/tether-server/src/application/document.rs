//! The page-level handle passed to page builders.

use std::sync::Arc;

use crate::application::dispatcher::js_string;
use crate::application::element::Element;
use crate::application::error::DomError;
use crate::application::evaluation::PendingEvaluation;
use crate::application::session::Session;

/// Entry point to one session's page: `document.body`, `document.head`, and
/// lookups by id.
#[derive(Debug, Clone)]
pub struct Document {
    session: Arc<Session>,
}

impl Document {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn client_id(&self) -> &str {
        self.session.client_id()
    }

    pub fn get_element_by_id(&self, id: &str) -> Element {
        Element::by_id(Arc::clone(&self.session), id)
    }

    pub fn body(&self) -> Element {
        Element::from_expression(Arc::clone(&self.session), "document.body", Some("body"))
    }

    pub fn head(&self) -> Element {
        Element::from_expression(Arc::clone(&self.session), "document.head", Some("head"))
    }

    /// Runs `document.execCommand(command)` on the client.
    pub fn exec_command(&self, command: &str) {
        self.session
            .execute(&format!("document.execCommand({});", js_string(command)));
    }

    /// The page's `window.location.origin`.
    pub fn origin(&self) -> Result<PendingEvaluation, DomError> {
        self.session.evaluate("window.location.origin")
    }

    pub fn execute(&self, js: &str) {
        self.session.execute(js);
    }

    pub fn evaluate(&self, js: &str) -> Result<PendingEvaluation, DomError> {
        self.session.evaluate(js)
    }

    /// See [`Session::batch`].
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.session.batch(f)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
