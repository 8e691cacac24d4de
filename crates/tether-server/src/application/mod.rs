//! Application layer: sessions, element handles, and the protocol logic that
//! connects them to a client.
//!
//! - [`session`] owns the outbound queue, the shadow document, and the
//!   callback registry of one client.
//! - [`dispatcher`] chooses how each DOM mutation travels.
//! - [`element`], [`events`], [`style`], and [`document`] are the handles a
//!   page builder works with.
//! - [`registry`] and [`evaluation`] correlate client answers with the calls
//!   that asked for them.
//! - [`scope`] and [`observable`] tie listeners and bindings to element
//!   lifetimes.

pub(crate) mod dispatcher;
pub mod document;
pub mod element;
pub mod error;
pub mod evaluation;
pub mod events;
pub mod observable;
pub mod registry;
pub mod scope;
pub mod session;
pub mod style;

pub use document::Document;
pub use element::{Element, ElementCreator, ACTIVE_CLASS};
pub use error::{DomError, EvaluationError};
pub use evaluation::PendingEvaluation;
pub use events::{KEY_SPECIFIC_KEYUP_EVENT, RETRIEVED_KEY};
pub use observable::{Observable, SubscriptionHandle};
pub use registry::{CallbackRegistry, DebugOrigin, ErrorRouting, Listener};
pub use scope::{CleanupScope, ScopeGuard};
pub use session::Session;
pub use style::{DisplayValue, StyleReceiver};
