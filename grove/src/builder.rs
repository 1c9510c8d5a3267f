//! Declarative construction of trees.

use compact_str::CompactString;
use xylem::indextree::NodeId;
use xylem::{NodeData, Tree};

/// Builds a [`Tree`] top-down with nested closures.
///
/// ```
/// use grove::TreeBuilder;
///
/// let mut builder = TreeBuilder::new("file", Some("file"));
/// builder.node("call", Some("call"), |b| {
///     b.leaf("ident", "print", Some("print"));
///     b.leaf("punct", "(", None);
///     b.leaf("punct", ")", None);
/// });
/// let tree = builder.finish();
/// assert_eq!(tree.text(tree.root), "print()");
/// ```
pub struct TreeBuilder<S> {
    tree: Tree<S>,
    current: NodeId,
}

impl<S> TreeBuilder<S> {
    /// Start a tree whose root is a branch of the given kind.
    pub fn new(kind: impl Into<CompactString>, semantic: Option<S>) -> Self {
        let tree = Tree::new(NodeData::branch(kind, semantic));
        let current = tree.root;
        Self { tree, current }
    }

    /// Place the finished tree at an absolute offset within a larger document.
    pub fn root_offset(mut self, offset: u32) -> Self {
        self.tree = self.tree.with_root_offset(offset);
        self
    }

    /// Append a branch under the current node and build its children.
    pub fn node(
        &mut self,
        kind: impl Into<CompactString>,
        semantic: Option<S>,
        children: impl FnOnce(&mut Self),
    ) -> NodeId {
        let id = self
            .tree
            .add_child(self.current, NodeData::branch(kind, semantic));
        let outer = core::mem::replace(&mut self.current, id);
        children(self);
        self.current = outer;
        id
    }

    /// Append a leaf under the current node.
    pub fn leaf(
        &mut self,
        kind: impl Into<CompactString>,
        text: impl Into<CompactString>,
        semantic: Option<S>,
    ) -> NodeId {
        self.tree
            .add_child(self.current, NodeData::leaf(kind, text, semantic))
    }

    /// Root of the tree being built.
    pub fn root(&self) -> NodeId {
        self.tree.root
    }

    /// Hand over the finished tree.
    pub fn finish(self) -> Tree<S> {
        self.tree
    }
}
