//! JSON message types for the browser-facing WebSocket protocol.
//!
//! # Message flow
//!
//! ```text
//! Server → Client:  ServerMessage  { id, execute? | evaluate? | instructions? }
//! Client → Server:  ClientMessage  { hello } | { id, callback } | { id, error }
//! ```
//!
//! Both directions use "one populated branch" objects rather than a `type`
//! tag, because that is the shape the browser dispatcher reads.  The typed
//! enums ([`Outbound`], [`ClientMessage`]) make it impossible to build a
//! message with two branches; the `Raw*` structs are only the wire view.
//!
//! # Example
//!
//! ```json
//! {"id":"c1","evaluate":{"js":"2+2","callbackId":7}}
//! {"id":"c1","callback":{"callbackId":7,"data":4}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::codec::CodecError;
use crate::protocol::instruction::{Instruction, RawInstruction};

// ── Server → Client messages ──────────────────────────────────────────────────

/// Run `js` on the client for its side effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execute {
    pub js: String,
    /// When present, a failure is reported back as an error message carrying
    /// this token instead of surfacing as an uncaught client fault.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_token: Option<String>,
}

/// Evaluate `js` on the client and answer with a callback carrying the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluate {
    pub js: String,
    pub callback_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_token: Option<String>,
}

/// The single populated branch of a [`ServerMessage`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Execute(Execute),
    Evaluate(Evaluate),
    /// Applied by the client in list order.  May be empty.
    Instructions(Vec<Instruction>),
}

impl Outbound {
    /// Short branch name for log lines (never includes script text).
    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::Execute(_) => "execute",
            Outbound::Evaluate(_) => "evaluate",
            Outbound::Instructions(_) => "instructions",
        }
    }
}

/// A message from the server to exactly one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawServerMessage", into = "RawServerMessage")]
pub struct ServerMessage {
    /// The client identity this message is addressed to.
    pub client_id: String,
    pub body: Outbound,
}

impl ServerMessage {
    pub fn execute(client_id: impl Into<String>, js: impl Into<String>, debug_token: Option<String>) -> Self {
        Self {
            client_id: client_id.into(),
            body: Outbound::Execute(Execute {
                js: js.into(),
                debug_token,
            }),
        }
    }

    pub fn evaluate(
        client_id: impl Into<String>,
        js: impl Into<String>,
        callback_id: u64,
        debug_token: Option<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            body: Outbound::Evaluate(Evaluate {
                js: js.into(),
                callback_id,
                debug_token,
            }),
        }
    }

    pub fn instructions(client_id: impl Into<String>, instructions: Vec<Instruction>) -> Self {
        Self {
            client_id: client_id.into(),
            body: Outbound::Instructions(instructions),
        }
    }
}

/// Wire view of a [`ServerMessage`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawServerMessage {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute: Option<Execute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluate: Option<Evaluate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<Vec<RawInstruction>>,
}

impl From<ServerMessage> for RawServerMessage {
    fn from(msg: ServerMessage) -> Self {
        let mut raw = RawServerMessage {
            id: msg.client_id,
            ..Default::default()
        };
        match msg.body {
            Outbound::Execute(e) => raw.execute = Some(e),
            Outbound::Evaluate(e) => raw.evaluate = Some(e),
            Outbound::Instructions(list) => {
                raw.instructions = Some(list.into_iter().map(RawInstruction::from).collect())
            }
        }
        raw
    }
}

impl TryFrom<RawServerMessage> for ServerMessage {
    type Error = CodecError;

    fn try_from(raw: RawServerMessage) -> Result<Self, Self::Error> {
        let body = match (raw.execute, raw.evaluate, raw.instructions) {
            (Some(e), None, None) => Outbound::Execute(e),
            (None, Some(e), None) => Outbound::Evaluate(e),
            (None, None, Some(list)) => Outbound::Instructions(
                list.into_iter()
                    .map(Instruction::try_from)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            (None, None, None) => return Err(CodecError::NoBranch),
            _ => return Err(CodecError::MultipleBranches),
        };
        Ok(ServerMessage {
            client_id: raw.id,
            body,
        })
    }
}

// ── Client → Server messages ──────────────────────────────────────────────────

/// The `{name, message}` pair the client reports when a script throws.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptFailure {
    pub name: String,
    pub message: String,
}

/// All messages a client can send to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawClientMessage", into = "RawClientMessage")]
pub enum ClientMessage {
    /// First message on every newly opened socket.
    ///
    /// The identity may be omitted on the wire; the server then falls back to
    /// the identity carried in the socket URL.
    Hello { client_id: Option<String> },

    /// The result of an evaluation, or one firing of an event listener.
    Callback {
        client_id: String,
        callback_id: u64,
        data: Value,
    },

    /// A script sent with a debug token failed on the client.
    Error {
        client_id: String,
        debug_token: String,
        error: ScriptFailure,
    },
}

impl ClientMessage {
    /// Short variant name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Hello { .. } => "hello",
            ClientMessage::Callback { .. } => "callback",
            ClientMessage::Error { .. } => "error",
        }
    }

    /// The identity the client claims, if it sent one.
    pub fn client_id(&self) -> Option<&str> {
        match self {
            ClientMessage::Hello { client_id } => client_id.as_deref(),
            ClientMessage::Callback { client_id, .. } | ClientMessage::Error { client_id, .. } => {
                Some(client_id)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCallback {
    pub callback_id: u64,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawError {
    pub debug_token: String,
    pub error: ScriptFailure,
}

/// Wire view of a [`ClientMessage`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawClientMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hello: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<RawCallback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RawError>,
}

impl From<ClientMessage> for RawClientMessage {
    fn from(msg: ClientMessage) -> Self {
        match msg {
            ClientMessage::Hello { client_id } => RawClientMessage {
                id: client_id,
                hello: Some(true),
                ..Default::default()
            },
            ClientMessage::Callback {
                client_id,
                callback_id,
                data,
            } => RawClientMessage {
                id: Some(client_id),
                callback: Some(RawCallback { callback_id, data }),
                ..Default::default()
            },
            ClientMessage::Error {
                client_id,
                debug_token,
                error,
            } => RawClientMessage {
                id: Some(client_id),
                error: Some(RawError { debug_token, error }),
                ..Default::default()
            },
        }
    }
}

impl TryFrom<RawClientMessage> for ClientMessage {
    type Error = CodecError;

    fn try_from(raw: RawClientMessage) -> Result<Self, CodecError> {
        match (raw.hello, raw.callback, raw.error) {
            (Some(true), None, None) => Ok(ClientMessage::Hello { client_id: raw.id }),
            (None | Some(false), Some(cb), None) => Ok(ClientMessage::Callback {
                client_id: raw.id.ok_or(CodecError::MissingClientId)?,
                callback_id: cb.callback_id,
                data: cb.data,
            }),
            (None | Some(false), None, Some(err)) => Ok(ClientMessage::Error {
                client_id: raw.id.ok_or(CodecError::MissingClientId)?,
                debug_token: err.debug_token,
                error: err.error,
            }),
            (None | Some(false), None, None) => Err(CodecError::NoBranch),
            _ => Err(CodecError::MultipleBranches),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_execute_serializes_with_single_branch() {
        // Arrange
        let msg = ServerMessage::execute("c1", "alert(1)", None);

        // Act
        let value = serde_json::to_value(&msg).unwrap();

        // Assert: only `id` and `execute` are present; no debugToken when absent
        assert_eq!(value, json!({"id": "c1", "execute": {"js": "alert(1)"}}));
    }

    #[test]
    fn test_evaluate_uses_camel_case_field_names() {
        let msg = ServerMessage::evaluate("c1", "2+2", 7, Some("d7".to_string()));

        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(
            value,
            json!({"id": "c1", "evaluate": {"js": "2+2", "callbackId": 7, "debugToken": "d7"}})
        );
    }

    #[test]
    fn test_empty_instruction_list_is_a_valid_message() {
        let json = r#"{"id":"c1","instructions":[]}"#;

        let msg: ServerMessage = serde_json::from_str(json).unwrap();

        assert_eq!(msg.body, Outbound::Instructions(vec![]));
    }

    #[test]
    fn test_server_message_with_two_branches_is_rejected() {
        let raw = RawServerMessage {
            id: "c1".to_string(),
            execute: Some(Execute {
                js: "a()".to_string(),
                debug_token: None,
            }),
            instructions: Some(vec![]),
            ..Default::default()
        };

        assert_eq!(ServerMessage::try_from(raw), Err(CodecError::MultipleBranches));
    }

    #[test]
    fn test_server_message_without_branch_is_rejected() {
        let raw = RawServerMessage {
            id: "c1".to_string(),
            ..Default::default()
        };

        assert_eq!(ServerMessage::try_from(raw), Err(CodecError::NoBranch));
    }

    #[test]
    fn test_bare_hello_decodes_without_identity() {
        let msg: ClientMessage = serde_json::from_str(r#"{"hello":true}"#).unwrap();

        assert_eq!(msg, ClientMessage::Hello { client_id: None });
    }

    #[test]
    fn test_hello_with_identity_decodes() {
        let msg: ClientMessage = serde_json::from_str(r#"{"id":"c9","hello":true}"#).unwrap();

        assert_eq!(msg.client_id(), Some("c9"));
        assert_eq!(msg.kind(), "hello");
    }

    #[test]
    fn test_callback_decodes_string_and_json_data() {
        let with_number: ClientMessage =
            serde_json::from_str(r#"{"id":"c1","callback":{"callbackId":3,"data":4}}"#).unwrap();
        let with_string: ClientMessage = serde_json::from_str(
            r#"{"id":"c1","callback":{"callbackId":4,"data":"{\"x\":1}"}}"#,
        )
        .unwrap();

        assert!(matches!(with_number, ClientMessage::Callback { callback_id: 3, ref data, .. } if *data == json!(4)));
        assert!(matches!(with_string, ClientMessage::Callback { callback_id: 4, ref data, .. } if data.is_string()));
    }

    #[test]
    fn test_error_message_decodes_name_and_message() {
        let json = r#"{"id":"c1","error":{"debugToken":"d2","error":{"name":"Error","message":"x"}}}"#;

        let msg: ClientMessage = serde_json::from_str(json).unwrap();

        match msg {
            ClientMessage::Error {
                debug_token, error, ..
            } => {
                assert_eq!(debug_token, "d2");
                assert_eq!(error.message, "x");
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn test_callback_without_identity_is_rejected() {
        let raw = RawClientMessage {
            callback: Some(RawCallback {
                callback_id: 1,
                data: Value::Null,
            }),
            ..Default::default()
        };

        assert_eq!(ClientMessage::try_from(raw), Err(CodecError::MissingClientId));
    }

    #[test]
    fn test_outbound_kind_names() {
        assert_eq!(ServerMessage::instructions("c", vec![]).body.kind(), "instructions");
        assert_eq!(ServerMessage::execute("c", "x", None).body.kind(), "execute");
    }
}
