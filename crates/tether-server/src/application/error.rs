//! Error types for the application layer.

use tether_core::{DocumentError, ScriptFailure};
use thiserror::Error;

/// Why an evaluation did not produce a value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    /// The client ran the script and it threw.  Only reported for scripts
    /// sent with a debug token.
    #[error("client reported {name}: {message}")]
    Client { name: String, message: String },

    /// The registry entry was removed before an answer arrived: the caller
    /// abandoned it, or the session ended.
    #[error("evaluation abandoned before the client answered")]
    Abandoned,
}

impl From<ScriptFailure> for EvaluationError {
    fn from(f: ScriptFailure) -> Self {
        EvaluationError::Client {
            name: f.name,
            message: f.message,
        }
    }
}

/// Usage errors raised by element and session operations.
///
/// These are reported to the calling code synchronously and never produce a
/// wire message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomError {
    /// A class name passed to `add_classes`/`remove_classes` contains whitespace.
    #[error("class name {0:?} must not contain whitespace")]
    InvalidClassName(String),

    /// A per-element flag that may only be set once is already set.
    #[error("{0} may only be attached once per element")]
    DuplicateFlag(&'static str),

    /// An operation depends on a flag that has not been set.
    #[error("{0} must be attached first")]
    MissingFlag(&'static str),

    /// `attach_key_specific_keyup` needs at least one key.
    #[error("at least one key is required")]
    NoKeys,

    /// Evaluations cannot be answered while outbound script is being caught.
    #[error("cannot evaluate while catching outbound script")]
    EvaluateWhileCatching,

    /// The shadow document rejected the mutation.
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}
