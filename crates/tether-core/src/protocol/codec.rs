//! JSON text codec for the browser wire protocol.
//!
//! Every WebSocket text frame carries exactly one JSON object.  Decoding is
//! done in two steps: `serde_json` parses the permissive `Raw*` wire view,
//! then `TryFrom` enforces the one-branch rule and the instruction parameter
//! layout.  Splitting the steps keeps the typed [`CodecError`] intact instead
//! of flattening it into a serde message string.

use thiserror::Error;
use tracing::debug;

use crate::protocol::messages::{ClientMessage, RawClientMessage, RawServerMessage, ServerMessage};

/// Errors that can occur while encoding or decoding a wire message.
///
/// On the client every one of these is fatal: a frame that cannot be
/// understood means the document can no longer be trusted to match the
/// server's view.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The frame was not valid JSON or did not match the wire shape.
    #[error("malformed JSON: {0}")]
    Json(String),

    /// An instruction carried a `type` this protocol does not define.
    #[error("unknown instruction type: {0}")]
    UnknownInstruction(String),

    /// An instruction parameter was missing or had the wrong JSON type.
    #[error("bad parameter {index} for {kind}: {reason}")]
    BadParameter {
        kind: String,
        index: usize,
        reason: String,
    },

    /// The object had none of the branches its direction allows.
    #[error("message has no recognised branch")]
    NoBranch,

    /// The object populated more than one branch.
    #[error("message populates more than one branch")]
    MultipleBranches,

    /// A callback or error message arrived without the sender's identity.
    #[error("message is missing the client id")]
    MissingClientId,
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::Json(e.to_string())
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a server → client message as one JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails (it cannot for the
/// types in this crate, but the signature leaves room for future payloads).
///
/// # Examples
///
/// ```rust
/// use tether_core::{encode_server_message, ServerMessage};
///
/// let text = encode_server_message(&ServerMessage::execute("c1", "f()", None)).unwrap();
/// assert_eq!(text, r#"{"id":"c1","execute":{"js":"f()"}}"#);
/// ```
pub fn encode_server_message(msg: &ServerMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(msg)?)
}

/// Decodes one server → client message from a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError`] if the text is not JSON, populates zero or several
/// branches, or contains an instruction that does not decode.
pub fn decode_server_message(text: &str) -> Result<ServerMessage, CodecError> {
    let raw: RawServerMessage = serde_json::from_str(text).map_err(|e| {
        debug!("rejecting server frame: {e}");
        CodecError::from(e)
    })?;
    ServerMessage::try_from(raw)
}

/// Encodes a client → server message as one JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails.
pub fn encode_client_message(msg: &ClientMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(msg)?)
}

/// Decodes one client → server message from a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError`] if the text is not JSON, has no recognised branch,
/// or is a callback/error without the client's identity.
///
/// # Examples
///
/// ```rust
/// use tether_core::{decode_client_message, ClientMessage};
///
/// let msg = decode_client_message(r#"{"id":"c1","callback":{"callbackId":2,"data":4}}"#).unwrap();
/// assert!(matches!(msg, ClientMessage::Callback { callback_id: 2, .. }));
/// ```
pub fn decode_client_message(text: &str) -> Result<ClientMessage, CodecError> {
    let raw: RawClientMessage = serde_json::from_str(text).map_err(|e| {
        debug!("rejecting client frame: {e}");
        CodecError::from(e)
    })?;
    ClientMessage::try_from(raw)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
