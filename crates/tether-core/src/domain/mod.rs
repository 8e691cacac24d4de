//! Domain layer: the in-memory document model.
//!
//! Nothing in here touches sockets or runtimes.  The same [`DomTree`] type
//! is used twice:
//!
//! - on the server, as the shadow document of a page whose socket is not
//!   open yet;
//! - in the client dispatcher, as the document instructions are applied to.

pub mod document;

pub use document::{DocumentError, DomTree, NodeId, NodeKind};
