//! Editable documents and the transactions that edit them.
//!
//! Every mutation goes through a [`Transaction`], which registers the edit
//! with its [`ChangeSet`] before touching the tree. When the outermost
//! transaction succeeds the collected changes are reported to the caller's
//! [`EventSink`] in document order.

use core::fmt;

use compact_str::CompactString;
use xylem::indextree::NodeId;
use xylem::{
    ChangeSet, ElementaryChangeInfo, EventSink, NodeData, ReplaceChangeInfo, TrackedTree,
    TrackingConfig, Tree,
};

use crate::error::TreeError;
use crate::tracing_macros::{debug, trace};

/// A tree together with the configuration its transactions track changes with.
#[derive(Debug, Clone)]
pub struct Document<S> {
    tree: Tree<S>,
    config: TrackingConfig,
}

impl<S: Clone + fmt::Debug> Document<S> {
    /// Wrap a tree.
    pub fn new(tree: Tree<S>) -> Self {
        Self::with_config(tree, TrackingConfig::default())
    }

    /// Wrap a tree, tracking changes with an explicit configuration.
    pub fn with_config(tree: Tree<S>, config: TrackingConfig) -> Self {
        Self { tree, config }
    }

    /// The current tree.
    pub fn tree(&self) -> &Tree<S> {
        &self.tree
    }

    /// The root node.
    pub fn root(&self) -> NodeId {
        self.tree.root
    }

    /// Full text of the document.
    pub fn text(&self) -> String {
        self.tree.text(self.tree.root)
    }

    /// Unwrap the tree, dropping the configuration.
    pub fn into_tree(self) -> Tree<S> {
        self.tree
    }

    /// Run `edit` as one transaction.
    ///
    /// On success the changes are reported to `sink` and the closure's value
    /// is returned. On error the change set is abandoned without reporting
    /// anything; edits already applied to the tree stay applied.
    pub fn transaction<K, R, F>(&mut self, sink: &mut K, edit: F) -> Result<R, TreeError>
    where
        K: EventSink<S> + ?Sized,
        F: FnOnce(&mut Transaction<'_, S>) -> Result<R, TreeError>,
    {
        let changes = ChangeSet::with_config(self.tree.root, self.config.clone());
        let mut tx = Transaction {
            tree: &mut self.tree,
            changes,
            outer: Vec::new(),
        };
        debug!("begin transaction");

        match edit(&mut tx) {
            Ok(value) => {
                let Transaction { tree, changes, .. } = tx;
                debug!(records = changes.len(), "commit transaction");
                changes.fire_events(&*tree, sink);
                Ok(value)
            }
            Err(err) => {
                debug!(records = tx.changes.len(), "abandon transaction: {err}");
                Err(err)
            }
        }
    }
}

/// An open editing transaction over a [`Document`].
pub struct Transaction<'a, S> {
    tree: &'a mut Tree<S>,
    changes: ChangeSet,
    /// Sets of the enclosing transactions while a nested one is open.
    outer: Vec<ChangeSet>,
}

impl<S: Clone + fmt::Debug> Transaction<'_, S> {
    /// The tree as edited so far.
    pub fn tree(&self) -> &Tree<S> {
        self.tree
    }

    /// Changes recorded so far in the innermost open transaction.
    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    /// Create a detached leaf, ready to be inserted.
    pub fn new_leaf(
        &mut self,
        kind: impl Into<CompactString>,
        text: impl Into<CompactString>,
        semantic: Option<S>,
    ) -> NodeId {
        self.tree.new_node(NodeData::leaf(kind, text, semantic))
    }

    /// Create a detached branch, ready to be inserted.
    pub fn new_node(&mut self, kind: impl Into<CompactString>, semantic: Option<S>) -> NodeId {
        self.tree.new_node(NodeData::branch(kind, semantic))
    }

    /// Append `child` as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.check_insertable(parent, child)?;
        self.check_order(parent, child, self.tree.child_count(parent), None)?;
        self.changes.register_elementary_change(&*self.tree, parent);
        self.tree.append(parent, child);
        Ok(())
    }

    /// Insert `child` so that it becomes the `index`-th child of `parent`.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        index: usize,
        child: NodeId,
    ) -> Result<(), TreeError> {
        let len = self.tree.child_count(parent);
        if index > len {
            return Err(TreeError::IndexOutOfBounds { index, len });
        }
        self.check_insertable(parent, child)?;
        self.check_order(parent, child, index, None)?;
        self.changes.register_elementary_change(&*self.tree, parent);
        match self.tree.nth_child(parent, index) {
            Some(sibling) => self.tree.insert_before(sibling, child),
            None => self.tree.append(parent, child),
        }
        Ok(())
    }

    /// Insert `child` right before `sibling`.
    pub fn insert_before(&mut self, sibling: NodeId, child: NodeId) -> Result<(), TreeError> {
        let parent = self.parent_of(sibling)?;
        self.check_insertable(parent, child)?;
        self.check_order(parent, child, self.tree.child_index(sibling), None)?;
        self.changes.register_elementary_change(&*self.tree, parent);
        self.tree.insert_before(sibling, child);
        Ok(())
    }

    /// Insert `child` right after `sibling`.
    pub fn insert_after(&mut self, sibling: NodeId, child: NodeId) -> Result<(), TreeError> {
        let parent = self.parent_of(sibling)?;
        self.check_insertable(parent, child)?;
        self.check_order(parent, child, self.tree.child_index(sibling) + 1, None)?;
        self.changes.register_elementary_change(&*self.tree, parent);
        self.tree.insert_after(sibling, child);
        Ok(())
    }

    /// Detach `child` from `parent`. The node stays valid and may be
    /// inserted again.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        if self.tree.parent(child) != Some(parent) {
            return Err(TreeError::NotAChild {
                parent: usize::from(parent),
                child: usize::from(child),
            });
        }
        self.changes.register_elementary_change(&*self.tree, parent);
        self.tree.detach(child);
        Ok(())
    }

    /// Put the detached node `new` where `old` is and detach `old`.
    ///
    /// `old` keeps the char table of the context it was removed from.
    pub fn replace_child(
        &mut self,
        old: NodeId,
        new: NodeId,
    ) -> Result<ElementaryChangeInfo, TreeError> {
        let parent = self.parent_of(old)?;
        self.check_insertable(parent, new)?;
        self.check_order(parent, new, self.tree.child_index(old), Some(old))?;
        self.changes.register_elementary_change(&*self.tree, parent);

        self.tree.insert_before(old, new);
        let mut replace = ReplaceChangeInfo::new(&*self.tree, new);
        replace.set_replaced(&mut *self.tree, old);
        self.tree.detach(old);

        let change = replace.into_change_info();
        trace!(%change, "replaced child");
        Ok(change)
    }

    /// Replace the text of a leaf in place.
    pub fn set_text(
        &mut self,
        leaf: NodeId,
        text: impl Into<CompactString>,
    ) -> Result<(), TreeError> {
        if !self.tree.get(leaf).is_leaf() {
            return Err(TreeError::NotALeaf {
                node: usize::from(leaf),
            });
        }
        self.changes.mark_child_changed(&*self.tree, leaf);
        self.tree.set_text(leaf, text);
        Ok(())
    }

    /// Run `edit` as a nested transaction.
    ///
    /// The outer changes are frozen first, the nested edits are recorded in a
    /// fresh change set, and that set is merged back whether or not `edit`
    /// succeeds: its edits have happened either way.
    pub fn nested<R>(
        &mut self,
        edit: impl FnOnce(&mut Self) -> Result<R, TreeError>,
    ) -> Result<R, TreeError> {
        self.changes.freeze_before_nested_transaction(&*self.tree);
        let inner = ChangeSet::with_config(self.changes.root(), self.changes.config().clone());
        let outer = core::mem::replace(&mut self.changes, inner);
        debug!(outer = outer.len(), "begin nested transaction");
        self.outer.push(outer);

        let result = edit(self);

        if let Some(outer) = self.outer.pop() {
            let inner = core::mem::replace(&mut self.changes, outer);
            self.changes.merge(&*self.tree, inner);
        }
        result
    }

    fn parent_of(&self, node: NodeId) -> Result<NodeId, TreeError> {
        self.tree.parent(node).ok_or(TreeError::NoParent {
            node: usize::from(node),
        })
    }

    /// Refuse to put a node back among the children a live record
    /// snapshotted unless the snapshot order survives. `index` counts
    /// children after `replacing` is gone.
    fn check_order(
        &self,
        parent: NodeId,
        child: NodeId,
        index: usize,
        replacing: Option<NodeId>,
    ) -> Result<(), TreeError> {
        let mut snapshots = self
            .outer
            .iter()
            .chain(core::iter::once(&self.changes))
            .filter_map(|changes| changes.record(parent))
            .filter(|record| record.initial_length(child).is_some())
            .peekable();
        if snapshots.peek().is_none() {
            return Ok(());
        }

        let mut children: Vec<NodeId> = self
            .tree
            .children(parent)
            .filter(|&node| Some(node) != replacing)
            .collect();
        children.insert(index, child);
        if snapshots.all(|record| record.keeps_snapshot_order(children.iter().copied())) {
            return Ok(());
        }
        Err(TreeError::WouldReorder {
            parent: usize::from(parent),
            child: usize::from(child),
        })
    }

    fn check_insertable(&self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        if child == self.tree.root || self.tree.parent(child).is_some() {
            return Err(TreeError::AlreadyAttached {
                node: usize::from(child),
            });
        }
        if self.tree.descendants(child).any(|node| node == parent) {
            return Err(TreeError::WouldCycle {
                node: usize::from(child),
            });
        }
        Ok(())
    }
}

impl<S> fmt::Debug for Transaction<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("changes", &self.changes)
            .finish_non_exhaustive()
    }
}
