//! The tree capability the change tracker reads from, and an arena-backed
//! reference tree implementing it.

use core::cell::Cell;
use core::fmt;

use compact_str::CompactString;
use indextree::{Arena, NodeId};
use rapidhash::RapidHashMap as HashMap;

use crate::tracing_macros::trace;

/// Read access to a mutable ordered tree whose nodes carry text spans.
///
/// Nodes are addressed by arena handles; the tracker never owns node
/// lifetimes and never changes topology through this trait.
///
/// Between the creation of a [`ChangeRecord`](crate::ChangeRecord) and the
/// moment its diff is computed, the children of the recorded parent may only
/// be inserted, removed or mutated in place. They must never be permuted.
pub trait TrackedTree {
    /// Higher-level representation of a node, handed to event sinks.
    type Semantic: Clone + fmt::Debug;

    /// Root node of the tree.
    fn root(&self) -> NodeId;

    /// Parent of a node, `None` for the root and for detached nodes.
    fn parent(&self, id: NodeId) -> Option<NodeId>;

    /// Live children of a node, in order.
    fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_;

    /// Length of the text spanned by a node. Implementations may cache it.
    fn text_length(&self, id: NodeId) -> u32;

    /// Length of the text spanned by a node, bypassing any cache.
    fn text_length_uncached(&self, id: NodeId) -> u32 {
        self.text_length(id)
    }

    /// Semantic counterpart of a node, `None` for pure scaffolding.
    fn semantic(&self, id: NodeId) -> Option<Self::Semantic>;

    /// Absolute offset of the root within its containing document.
    fn root_offset(&self) -> u32 {
        0
    }

    /// Index of a node among its siblings (0 for parentless nodes).
    fn child_index(&self, id: NodeId) -> usize {
        match self.parent(id) {
            Some(parent) => self
                .children(parent)
                .position(|child| child == id)
                .unwrap_or(0),
            None => 0,
        }
    }

    /// Offset of a node's text relative to the start of its parent.
    fn start_offset_in_parent(&self, id: NodeId) -> u32 {
        let Some(parent) = self.parent(id) else {
            return 0;
        };
        self.children(parent)
            .take_while(|&child| child != id)
            .map(|child| self.text_length(child))
            .sum()
    }

    /// Absolute start offset of a node.
    fn start_offset(&self, id: NodeId) -> u32 {
        let mut offset = self.start_offset_in_parent(id);
        for ancestor in self.ancestors(id) {
            offset += self.start_offset_in_parent(ancestor);
        }
        self.root_offset() + offset
    }

    /// Ancestors of a node, from its parent up to the top of its tree.
    fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        core::iter::successors(self.parent(id), move |&node| self.parent(node))
    }

    /// Hand the char-table association of `from`'s tree context over to `to`.
    ///
    /// Called when `to` is about to be replaced by `from` so that the
    /// detached node can still resolve its text.
    fn transfer_char_table(&mut self, from: NodeId, to: NodeId) {
        let _ = (from, to);
    }
}

/// Payload of a node in a [`Tree`].
#[derive(Debug, Clone)]
pub struct NodeData<S> {
    /// Syntactic kind, e.g. `"block"` or `"ident"`.
    pub kind: CompactString,
    /// Text of a leaf. Branches have `None` and span their children's text.
    pub text: Option<CompactString>,
    /// Semantic counterpart, if the node has one.
    pub semantic: Option<S>,
    cached_length: Cell<Option<u32>>,
}

impl<S> NodeData<S> {
    /// A node that spans the text of its children.
    pub fn branch(kind: impl Into<CompactString>, semantic: Option<S>) -> Self {
        Self {
            kind: kind.into(),
            text: None,
            semantic,
            cached_length: Cell::new(None),
        }
    }

    /// A node holding its own text.
    pub fn leaf(
        kind: impl Into<CompactString>,
        text: impl Into<CompactString>,
        semantic: Option<S>,
    ) -> Self {
        Self {
            kind: kind.into(),
            text: Some(text.into()),
            semantic,
            cached_length: Cell::new(None),
        }
    }

    /// Whether this node holds text of its own.
    pub fn is_leaf(&self) -> bool {
        self.text.is_some()
    }
}

/// Arena-backed ordered tree with cached text lengths.
///
/// Mutations here are raw: they keep lengths consistent but report nothing.
/// Editing code registers its changes with a [`ChangeSet`](crate::ChangeSet)
/// before calling them.
#[derive(Debug, Clone)]
pub struct Tree<S> {
    arena: Arena<NodeData<S>>,
    /// Root node
    pub root: NodeId,
    root_offset: u32,
    char_tables: HashMap<NodeId, u32>,
}

impl<S> Tree<S> {
    /// Create a tree with the given root payload.
    pub fn new(root: NodeData<S>) -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(root);
        Self {
            arena,
            root,
            root_offset: 0,
            char_tables: HashMap::default(),
        }
    }

    /// Place the root at an absolute offset within a larger document.
    pub fn with_root_offset(mut self, offset: u32) -> Self {
        self.root_offset = offset;
        self
    }

    /// Payload of a node.
    pub fn get(&self, id: NodeId) -> &NodeData<S> {
        self.arena[id].get()
    }

    /// Create a detached node.
    pub fn new_node(&mut self, data: NodeData<S>) -> NodeId {
        self.arena.new_node(data)
    }

    /// Create a node and append it under `parent`.
    pub fn add_child(&mut self, parent: NodeId, data: NodeData<S>) -> NodeId {
        let id = self.arena.new_node(data);
        self.append(parent, id);
        id
    }

    /// Parent of a node.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena[id].parent()
    }

    /// Children of a node, in order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.children(&self.arena)
    }

    /// Number of children of a node.
    pub fn child_count(&self, id: NodeId) -> usize {
        id.children(&self.arena).count()
    }

    /// The `index`-th child of a node.
    pub fn nth_child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        id.children(&self.arena).nth(index)
    }

    /// Whether a node is connected to this tree's root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        id.ancestors(&self.arena).last() == Some(self.root)
    }

    /// Concatenated text of a subtree.
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in id.descendants(&self.arena) {
            if let Some(text) = &self.arena[node].get().text {
                out.push_str(text);
            }
        }
        out
    }

    /// Pre-order walk of the subtree under `id`, including `id`.
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.descendants(&self.arena)
    }

    /// Append `child` as the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        parent.append(child, &mut self.arena);
        self.invalidate_lengths(parent);
    }

    /// Insert `node` right before `sibling`.
    pub fn insert_before(&mut self, sibling: NodeId, node: NodeId) {
        sibling.insert_before(node, &mut self.arena);
        if let Some(parent) = self.parent(sibling) {
            self.invalidate_lengths(parent);
        }
    }

    /// Insert `node` right after `sibling`.
    pub fn insert_after(&mut self, sibling: NodeId, node: NodeId) {
        sibling.insert_after(node, &mut self.arena);
        if let Some(parent) = self.parent(sibling) {
            self.invalidate_lengths(parent);
        }
    }

    /// Detach a node (and its subtree) from its parent. The node stays in
    /// the arena and may be attached again.
    pub fn detach(&mut self, id: NodeId) {
        let parent = self.parent(id);
        id.detach(&mut self.arena);
        if let Some(parent) = parent {
            self.invalidate_lengths(parent);
        }
    }

    /// Replace the text of a leaf.
    pub fn set_text(&mut self, id: NodeId, text: impl Into<CompactString>) {
        self.arena[id].get_mut().text = Some(text.into());
        self.invalidate_lengths(id);
    }

    /// Associate a char table with a node's subtree.
    pub fn set_char_table(&mut self, id: NodeId, table: u32) {
        self.char_tables.insert(id, table);
    }

    /// Char table in effect for a node: its own or its nearest ancestor's.
    pub fn char_table(&self, id: NodeId) -> Option<u32> {
        id.ancestors(&self.arena)
            .find_map(|node| self.char_tables.get(&node).copied())
    }

    fn invalidate_lengths(&self, from: NodeId) {
        for node in from.ancestors(&self.arena) {
            self.arena[node].get().cached_length.set(None);
        }
    }

    fn compute_length(&self, id: NodeId) -> u32 {
        let data = self.arena[id].get();
        match &data.text {
            Some(text) => span_length(text.len()),
            None => id
                .children(&self.arena)
                .map(|child| self.compute_length(child))
                .fold(0, u32::saturating_add),
        }
    }
}

impl<S: Clone + fmt::Debug> TrackedTree for Tree<S> {
    type Semantic = S;

    fn root(&self) -> NodeId {
        self.root
    }

    fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena[id].parent()
    }

    fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.children(&self.arena)
    }

    fn text_length(&self, id: NodeId) -> u32 {
        let data = self.arena[id].get();
        if let Some(length) = data.cached_length.get() {
            return length;
        }
        let length = match &data.text {
            Some(text) => span_length(text.len()),
            None => id
                .children(&self.arena)
                .map(|child| self.text_length(child))
                .fold(0, u32::saturating_add),
        };
        data.cached_length.set(Some(length));
        length
    }

    fn text_length_uncached(&self, id: NodeId) -> u32 {
        self.compute_length(id)
    }

    fn semantic(&self, id: NodeId) -> Option<S> {
        self.arena[id].get().semantic.clone()
    }

    fn root_offset(&self) -> u32 {
        self.root_offset
    }

    fn child_index(&self, id: NodeId) -> usize {
        id.preceding_siblings(&self.arena).count() - 1
    }

    fn start_offset_in_parent(&self, id: NodeId) -> u32 {
        id.preceding_siblings(&self.arena)
            .skip(1)
            .map(|sibling| self.text_length(sibling))
            .sum()
    }

    fn transfer_char_table(&mut self, from: NodeId, to: NodeId) {
        if let Some(table) = self.char_table(from) {
            trace!(
                from = usize::from(from),
                to = usize::from(to),
                table,
                "transfer char table"
            );
            self.char_tables.insert(to, table);
        }
    }
}

/// Lengths are `u32`; anything longer saturates instead of wrapping.
fn span_length(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_testhelpers::test;

    fn sample() -> (Tree<u32>, NodeId, NodeId, NodeId) {
        let mut tree = Tree::new(NodeData::branch("file", Some(0)));
        let root = tree.root;
        let block = tree.add_child(root, NodeData::branch("block", Some(1)));
        let a = tree.add_child(block, NodeData::leaf("ident", "abc", Some(2)));
        let b = tree.add_child(block, NodeData::leaf("ws", "  ", None));
        (tree, block, a, b)
    }

    #[test]
    fn test_lengths_follow_mutations() {
        let (mut tree, block, a, b) = sample();
        assert_eq!(tree.text_length(tree.root), 5);
        assert_eq!(tree.start_offset_in_parent(b), 3);

        tree.set_text(a, "abcdef");
        assert_eq!(tree.text_length(block), 8);
        assert_eq!(tree.text_length(tree.root), 8);
        assert_eq!(tree.start_offset(b), 6);

        tree.detach(a);
        assert_eq!(tree.text_length(tree.root), 2);
        assert_eq!(tree.start_offset(b), 0);
        assert_eq!(tree.text_length(a), 6, "detached node keeps its length");
    }

    #[test]
    fn test_uncached_length_matches_cached() {
        let (mut tree, block, _a, b) = sample();
        let _ = tree.text_length(block);
        tree.set_text(b, "\n");
        assert_eq!(tree.text_length(block), tree.text_length_uncached(block));
        assert_eq!(tree.text_length_uncached(block), 4);
    }

    #[test]
    fn test_root_offset_shifts_absolute_offsets() {
        let (tree, block, _a, b) = sample();
        let tree = tree.with_root_offset(100);
        assert_eq!(tree.start_offset(block), 100);
        assert_eq!(tree.start_offset(b), 103);
    }

    #[test]
    fn test_ancestors_and_attachment() {
        let (mut tree, block, a, _b) = sample();
        let chain: Vec<_> = tree.ancestors(a).collect();
        assert_eq!(chain, vec![block, tree.root]);
        assert_eq!(tree.child_index(a), 0);

        let loose = tree.new_node(NodeData::leaf("ident", "x", None));
        assert!(!tree.is_attached(loose));
        tree.append(block, loose);
        assert!(tree.is_attached(loose));
        assert_eq!(tree.child_index(loose), 2);
    }

    #[test]
    fn test_char_table_transfer() {
        let (mut tree, block, a, _b) = sample();
        tree.set_char_table(block, 7);
        let replacement = tree.new_node(NodeData::leaf("ident", "xyz", None));
        tree.insert_before(a, replacement);
        tree.transfer_char_table(replacement, a);
        tree.detach(a);
        assert_eq!(tree.char_table(a), Some(7));
        assert_eq!(tree.char_table(replacement), Some(7));
    }

    #[test]
    fn test_oversized_lengths_saturate() {
        assert_eq!(span_length(17), 17);
        assert_eq!(span_length(u32::MAX as usize), u32::MAX);
        assert_eq!(span_length(usize::MAX), u32::MAX);
    }
}
