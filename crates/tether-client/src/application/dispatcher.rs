//! ClientDispatcher: applies server messages and produces the replies.
//!
//! This is the behavior every client must reproduce for the server's model
//! to stay correct:
//!
//! - A message addressed to another client id is a protocol error.
//! - `execute` runs script.  A failure is reported as an error message when
//!   the server attached a debug token, and is otherwise returned as
//!   [`DispatchError::UnhandledScript`] (the browser client lets it throw).
//! - `evaluate` runs script and answers with a callback carrying the value,
//!   or with an error message under the same rule as `execute`.
//! - `instructions` are applied to the document in list order.
//!
//! Script evaluation is delegated to a [`ScriptHost`], so the dispatcher can
//! be driven without a JavaScript engine.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use tether_core::protocol::attribute_text;
use tether_core::{
    decode_server_message, encode_client_message, ClientMessage, CodecError, DocumentError,
    DomTree, Instruction, Outbound, ScriptFailure, ServerMessage,
};

/// Error type for message dispatch.
#[derive(Debug, Error, PartialEq)]
pub enum DispatchError {
    #[error("message for client {got} received by client {expected}")]
    ClientMismatch { expected: String, got: String },

    /// An instruction named an element the document does not have, or was
    /// otherwise rejected by the document.
    #[error("instruction failed: {0}")]
    Document(#[from] DocumentError),

    /// A script without a debug token threw.
    #[error("unhandled script failure {}: {}", .0.name, .0.message)]
    UnhandledScript(ScriptFailure),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Runs script on behalf of the dispatcher.
///
/// Each supported environment provides an implementation in the
/// infrastructure layer.
#[cfg_attr(test, mockall::automock)]
pub trait ScriptHost: Send + Sync {
    /// Runs `js` and returns its completion value (`null` for none).
    fn run(&self, js: &str) -> Result<Value, ScriptFailure>;
}

/// The client side of one session.
pub struct ClientDispatcher {
    client_id: String,
    host: Arc<dyn ScriptHost>,
    document: DomTree,
}

impl ClientDispatcher {
    pub fn new(client_id: impl Into<String>, host: Arc<dyn ScriptHost>) -> Self {
        Self::with_document(client_id, host, DomTree::new())
    }

    /// Starts from an existing document, for pages whose markup already has
    /// elements with ids.
    pub fn with_document(client_id: impl Into<String>, host: Arc<dyn ScriptHost>, document: DomTree) -> Self {
        Self {
            client_id: client_id.into(),
            host,
            document,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn document(&self) -> &DomTree {
        &self.document
    }

    /// The hello sent first on every opened socket.
    pub fn hello(&self) -> ClientMessage {
        ClientMessage::Hello {
            client_id: Some(self.client_id.clone()),
        }
    }

    /// What a page listener sends when it fires: `data` travels as JSON
    /// text, as `callbackWs` does in the browser.
    pub fn callback_ws(&self, callback_id: u64, data: &Value) -> ClientMessage {
        ClientMessage::Callback {
            client_id: self.client_id.clone(),
            callback_id,
            data: Value::String(data.to_string()),
        }
    }

    /// Handles one decoded server message and returns the replies to send.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] for a misaddressed message, a failed
    /// instruction, or a script that threw without a debug token.  The
    /// browser treats all of these as fatal.
    pub fn handle(&mut self, msg: ServerMessage) -> Result<Vec<ClientMessage>, DispatchError> {
        if msg.client_id != self.client_id {
            return Err(DispatchError::ClientMismatch {
                expected: self.client_id.clone(),
                got: msg.client_id,
            });
        }
        let mut replies = Vec::new();
        match msg.body {
            Outbound::Execute(execute) => {
                if let Err(failure) = self.host.run(&execute.js) {
                    replies.push(self.report(execute.debug_token, failure)?);
                }
            }
            Outbound::Evaluate(evaluate) => match self.host.run(&evaluate.js) {
                Ok(data) => replies.push(ClientMessage::Callback {
                    client_id: self.client_id.clone(),
                    callback_id: evaluate.callback_id,
                    data,
                }),
                Err(failure) => replies.push(self.report(evaluate.debug_token, failure)?),
            },
            Outbound::Instructions(list) => {
                for instruction in list {
                    self.apply(instruction)?;
                }
            }
        }
        Ok(replies)
    }

    /// Decodes a text frame, handles it, and encodes the replies.
    pub fn handle_text(&mut self, text: &str) -> Result<Vec<String>, DispatchError> {
        let msg = decode_server_message(text)?;
        debug!("client {}: handling {}", self.client_id, msg.body.kind());
        self.handle(msg)?
            .iter()
            .map(|reply| encode_client_message(reply).map_err(DispatchError::from))
            .collect()
    }

    fn report(&self, debug_token: Option<String>, failure: ScriptFailure) -> Result<ClientMessage, DispatchError> {
        match debug_token {
            Some(debug_token) => {
                warn!(
                    "client {}: script failed ({}: {}), reporting under {debug_token}",
                    self.client_id, failure.name, failure.message
                );
                Ok(ClientMessage::Error {
                    client_id: self.client_id.clone(),
                    debug_token,
                    error: failure,
                })
            }
            None => Err(DispatchError::UnhandledScript(failure)),
        }
    }

    fn apply(&mut self, instruction: Instruction) -> Result<(), DocumentError> {
        let doc = &mut self.document;
        match instruction {
            Instruction::SetAttribute { id, name, value } => {
                let node = doc.require_id(&id)?;
                doc.set_attribute(node, &name, &attribute_text(&value))
            }
            Instruction::RemoveAttribute { id, name } => {
                let node = doc.require_id(&id)?;
                doc.remove_attribute(node, &name).map(|_| ())
            }
            Instruction::CreateElement {
                tag,
                attributes,
                new_id,
                parent_id,
                position,
            } => {
                let parent = doc.require_id(&parent_id)?;
                let child = doc.create_element(
                    &tag,
                    attributes
                        .iter()
                        .filter(|(name, _)| name.as_str() != "id")
                        .map(|(name, value)| (name.clone(), attribute_text(value))),
                );
                doc.set_attribute(child, "id", &new_id)?;
                doc.insert_child(parent, child, position)
            }
            Instruction::AddText { id, text } => {
                let node = doc.require_id(&id)?;
                doc.append_text(node, &text)
            }
            Instruction::SetText { id, text } => {
                let node = doc.require_id(&id)?;
                doc.set_text(node, &text)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use serde_json::{json, Map};

    fn document_with_list() -> DomTree {
        let mut doc = DomTree::new();
        let body = doc.body();
        let list = doc.create_element("ul", [("id", "list")]);
        doc.insert_child(body, list, None).unwrap();
        doc
    }

    fn li(new_id: &str, position: Option<usize>) -> Instruction {
        Instruction::CreateElement {
            tag: "li".into(),
            attributes: Map::new(),
            new_id: new_id.into(),
            parent_id: "list".into(),
            position,
        }
    }

    #[test]
    fn test_evaluate_answers_with_callback() {
        // Arrange
        let mut host = MockScriptHost::new();
        host.expect_run()
            .with(eq("2+2"))
            .times(1)
            .returning(|_| Ok(json!(4)));
        let mut dispatcher = ClientDispatcher::new("c1", Arc::new(host));

        // Act
        let replies = dispatcher
            .handle(ServerMessage::evaluate("c1", "2+2", 7, None))
            .unwrap();

        // Assert
        assert_eq!(
            replies,
            vec![ClientMessage::Callback {
                client_id: "c1".into(),
                callback_id: 7,
                data: json!(4)
            }]
        );
    }

    #[test]
    fn test_failing_execute_with_token_reports_error() {
        let mut host = MockScriptHost::new();
        host.expect_run().returning(|_| {
            Err(ScriptFailure {
                name: "Error".into(),
                message: "x".into(),
            })
        });
        let mut dispatcher = ClientDispatcher::new("c1", Arc::new(host));

        let replies = dispatcher
            .handle(ServerMessage::execute("c1", "throw new Error('x')", Some("d1".into())))
            .unwrap();

        assert_eq!(
            replies,
            vec![ClientMessage::Error {
                client_id: "c1".into(),
                debug_token: "d1".into(),
                error: ScriptFailure {
                    name: "Error".into(),
                    message: "x".into()
                }
            }]
        );
    }

    #[test]
    fn test_failing_execute_without_token_is_unhandled() {
        let mut host = MockScriptHost::new();
        host.expect_run().returning(|_| {
            Err(ScriptFailure {
                name: "Error".into(),
                message: "x".into(),
            })
        });
        let mut dispatcher = ClientDispatcher::new("c1", Arc::new(host));

        let result = dispatcher.handle(ServerMessage::execute("c1", "throw new Error('x')", None));

        assert!(matches!(result, Err(DispatchError::UnhandledScript(f)) if f.message == "x"));
    }

    #[test]
    fn test_failing_evaluate_without_token_is_unhandled() {
        // Arrange
        let mut host = MockScriptHost::new();
        host.expect_run().times(1).returning(|_| {
            Err(ScriptFailure {
                name: "TypeError".into(),
                message: "boom".into(),
            })
        });
        let mut dispatcher = ClientDispatcher::new("c1", Arc::new(host));

        // Act
        let result = dispatcher.handle(ServerMessage::evaluate("c1", "missing.prop", 7, None));

        // Assert: no callback reply for 7, the failure surfaces instead
        assert!(matches!(
            result,
            Err(DispatchError::UnhandledScript(f)) if f.name == "TypeError" && f.message == "boom"
        ));
    }

    #[test]
    fn test_message_for_other_client_is_rejected() {
        let host = MockScriptHost::new();
        let mut dispatcher = ClientDispatcher::new("c1", Arc::new(host));

        let result = dispatcher.handle(ServerMessage::execute("c2", "x()", None));

        assert_eq!(
            result,
            Err(DispatchError::ClientMismatch {
                expected: "c1".into(),
                got: "c2".into()
            })
        );
    }

    #[test]
    fn test_create_element_inserts_at_position() {
        // Arrange: list holds A and C
        let host = MockScriptHost::new();
        let mut dispatcher = ClientDispatcher::with_document("c1", Arc::new(host), document_with_list());
        dispatcher
            .handle(ServerMessage::instructions("c1", vec![li("A", None), li("C", None)]))
            .unwrap();

        // Act
        dispatcher
            .handle(ServerMessage::instructions("c1", vec![li("B", Some(1))]))
            .unwrap();

        // Assert
        let doc = dispatcher.document();
        let list = doc.element_by_id("list").unwrap();
        let ids: Vec<_> = doc
            .element_children(list)
            .unwrap()
            .into_iter()
            .map(|n| doc.attribute(n, "id").unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_create_element_ignores_id_attribute() {
        let host = MockScriptHost::new();
        let mut dispatcher = ClientDispatcher::with_document("c1", Arc::new(host), document_with_list());
        let mut attributes = Map::new();
        attributes.insert("id".into(), json!("wrong"));
        attributes.insert("class".into(), json!("item"));

        dispatcher
            .handle(ServerMessage::instructions(
                "c1",
                vec![Instruction::CreateElement {
                    tag: "li".into(),
                    attributes,
                    new_id: "K1".into(),
                    parent_id: "list".into(),
                    position: None,
                }],
            ))
            .unwrap();

        let doc = dispatcher.document();
        assert!(doc.element_by_id("wrong").is_none());
        let node = doc.element_by_id("K1").unwrap();
        assert_eq!(doc.attribute(node, "class"), Some("item"));
    }

    #[test]
    fn test_instructions_apply_in_order() {
        let host = MockScriptHost::new();
        let mut dispatcher = ClientDispatcher::with_document("c1", Arc::new(host), document_with_list());

        dispatcher
            .handle(ServerMessage::instructions(
                "c1",
                vec![
                    li("K1", None),
                    Instruction::SetText {
                        id: "K1".into(),
                        text: "one".into(),
                    },
                    Instruction::AddText {
                        id: "K1".into(),
                        text: " two".into(),
                    },
                    Instruction::SetAttribute {
                        id: "K1".into(),
                        name: "title".into(),
                        value: json!(true),
                    },
                ],
            ))
            .unwrap();

        let doc = dispatcher.document();
        let node = doc.element_by_id("K1").unwrap();
        assert_eq!(doc.text_content(node).unwrap(), "one two");
        assert_eq!(doc.attribute(node, "title"), Some("true"));
    }

    #[test]
    fn test_unknown_element_is_an_error() {
        let host = MockScriptHost::new();
        let mut dispatcher = ClientDispatcher::new("c1", Arc::new(host));

        let result = dispatcher.handle(ServerMessage::instructions(
            "c1",
            vec![Instruction::SetText {
                id: "ghost".into(),
                text: "x".into(),
            }],
        ));

        assert_eq!(
            result,
            Err(DispatchError::Document(DocumentError::UnknownElement("ghost".into())))
        );
    }

    #[test]
    fn test_handle_text_round_trip() {
        let mut host = MockScriptHost::new();
        host.expect_run().returning(|_| Ok(json!("ok")));
        let mut dispatcher = ClientDispatcher::new("c1", Arc::new(host));

        let replies = dispatcher
            .handle_text(r#"{"id":"c1","evaluate":{"js":"f()","callbackId":3}}"#)
            .unwrap();

        assert_eq!(replies, vec![r#"{"id":"c1","callback":{"callbackId":3,"data":"ok"}}"#]);
    }

    #[test]
    fn test_callback_ws_stringifies_data() {
        let dispatcher = ClientDispatcher::new("c1", Arc::new(MockScriptHost::new()));

        let msg = dispatcher.callback_ws(5, &json!({"key": "Enter"}));

        assert!(matches!(msg, ClientMessage::Callback { data: Value::String(ref s), .. } if s == r#"{"key":"Enter"}"#));
    }
}
