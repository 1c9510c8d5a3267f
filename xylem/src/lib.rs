//! # Xylem
//!
//! Incremental change tracking and notification for ordered trees that are
//! edited in place, such as syntax trees inside an editor.
//!
//! Named after the tissue that carries sap up through a tree: changes made
//! deep in the tree are carried up to the nearest region that already
//! changed.
//!
//! ## Model
//!
//! During one editing transaction the code that mutates the tree calls
//! [`ChangeSet::register_elementary_change`] with the parent whose children
//! are about to change, *before* applying the edit. The change set keeps one
//! [`ChangeRecord`] per independent edit region:
//!
//! - a change under a parent that sits inside an already recorded subtree is
//!   folded into the enclosing record, which marks the covering child as
//!   changed in place;
//! - a change above existing records absorbs them, carrying their length
//!   deltas forward.
//!
//! Each record snapshots its parent's children once and diffs that snapshot
//! against the live children lazily, in a single forward pass. Siblings may
//! be inserted, removed or mutated in place, but never permuted.
//!
//! At commit, [`ChangeSet::fire_events`] reports [`TreeChangeEvent`]s in
//! document order to an [`EventSink`].
//!
//! ## Usage
//!
//! ```
//! use xylem::{ChangeSet, NodeData, Tree, TreeChangeEvent};
//!
//! let mut tree: Tree<&str> = Tree::new(NodeData::branch("list", Some("list")));
//! let root = tree.root;
//! let a = tree.add_child(root, NodeData::leaf("item", "a", Some("a")));
//! tree.add_child(root, NodeData::leaf("item", "b", Some("b")));
//!
//! let mut changes = ChangeSet::new(root);
//! let x = tree.new_node(NodeData::leaf("item", "x", Some("x")));
//! changes.register_elementary_change(&tree, root);
//! tree.insert_after(a, x);
//!
//! let mut events = Vec::new();
//! changes.fire_events(&tree, &mut events);
//! assert_eq!(
//!     events,
//!     vec![TreeChangeEvent::ChildAdded { parent: Some("list"), child: "x", offset: 1 }]
//! );
//! ```

#![warn(missing_docs)]
#![warn(clippy::std_instead_of_core)]

pub use indextree;

mod tracing_macros;

mod change_info;
mod change_set;
mod config;
mod event;
mod record;
/// Tree capability and reference arena tree
pub mod tree;

pub use change_info::{ChangeKind, ElementaryChangeInfo, ReplaceChangeInfo};
pub use change_set::ChangeSet;
pub use config::TrackingConfig;
pub use event::{EventSink, FnSink, TreeChangeEvent};
pub use record::{ChangeRecord, ChildChanges};
pub use tree::{NodeData, TrackedTree, Tree};
