//! Editable syntax-tree documents with transactional change notifications.
//!
//! grove wraps the arena tree from [`xylem`] in a [`Document`] whose edits
//! happen inside transactions. Each edit is registered with the
//! transaction's change set before it is applied, and a committed
//! transaction reports what changed, in document order, to an
//! [`EventSink`].
//!
//! # Example
//!
//! ```rust
//! use grove::{Document, TreeBuilder, TreeChangeEvent};
//!
//! let mut builder = TreeBuilder::new("list", Some("list"));
//! let a = builder.leaf("item", "a", Some("a"));
//! builder.leaf("item", "b", Some("b"));
//! let mut doc = Document::new(builder.finish());
//!
//! let mut events = Vec::new();
//! doc.transaction(&mut events, |tx| {
//!     let x = tx.new_leaf("item", "x", Some("x"));
//!     tx.insert_after(a, x)?;
//!     tx.set_text(a, "aa")
//! })
//! .unwrap();
//!
//! assert_eq!(doc.text(), "aaxb");
//! assert_eq!(
//!     events,
//!     vec![
//!         TreeChangeEvent::ChildrenChanged { parent: Some("a"), offset: 0, old_length: 1 },
//!         TreeChangeEvent::ChildAdded { parent: Some("list"), child: "x", offset: 2 },
//!     ]
//! );
//! ```

mod tracing_macros;

mod builder;
mod document;
mod error;

pub use builder::TreeBuilder;
pub use document::{Document, Transaction};
pub use error::TreeError;

// Re-export the engine types callers deal with
pub use xylem::indextree::NodeId;
pub use xylem::{
    ChangeKind, ChangeSet, ElementaryChangeInfo, EventSink, FnSink, TrackingConfig, Tree,
    TreeChangeEvent,
};
