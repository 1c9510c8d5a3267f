//! Per-parent change state.
//!
//! A [`ChangeRecord`] freezes the children of one parent when tracking
//! starts and, on demand, diffs that snapshot against the live children in
//! a single forward pass. The result is memoized until the next
//! registration touches the record.

use core::cmp::Ordering;
use core::fmt;

use indexmap::IndexMap;
use indextree::NodeId;
use rapidhash::RapidHashSet as HashSet;

use crate::change_info::ElementaryChangeInfo;
use crate::event::{EventSink, TreeChangeEvent};
use crate::tree::TrackedTree;
use crate::tracing_macros::{debug, trace, warn};

/// Changes of one parent's direct children, keyed by affected child.
pub type ChildChanges = IndexMap<NodeId, ElementaryChangeInfo>;

/// Diff state for exactly one changed parent.
pub struct ChangeRecord {
    parent: NodeId,
    /// From the parent's parent up to the top, captured once.
    ancestor_chain: Vec<NodeId>,
    /// Children and their lengths when tracking started.
    initial_children: IndexMap<NodeId, u32>,
    content_changed: HashSet<NodeId>,
    cached_diff: Option<ChildChanges>,
}

impl ChangeRecord {
    /// Start tracking `parent`, snapshotting its current children.
    pub fn new<T: TrackedTree>(tree: &T, parent: NodeId) -> Self {
        let ancestor_chain = tree.ancestors(parent).collect();
        let initial_children = tree
            .children(parent)
            .map(|child| (child, tree.text_length(child)))
            .collect();
        Self {
            parent,
            ancestor_chain,
            initial_children,
            content_changed: HashSet::default(),
            cached_diff: None,
        }
    }

    /// The changed parent.
    pub fn parent(&self) -> NodeId {
        self.parent
    }

    /// Ancestors of the parent at creation time, nearest first.
    pub fn ancestor_chain(&self) -> &[NodeId] {
        &self.ancestor_chain
    }

    /// Snapshot of the parent's children with their original lengths.
    pub fn initial_children(&self) -> impl Iterator<Item = (NodeId, u32)> + '_ {
        self.initial_children
            .iter()
            .map(|(&child, &length)| (child, length))
    }

    /// Original length of a child in the snapshot.
    pub fn initial_length(&self, child: NodeId) -> Option<u32> {
        self.initial_children.get(&child).copied()
    }

    /// Whether the snapshotted nodes among `children` appear in snapshot
    /// order. Nodes the snapshot never saw are skipped.
    pub fn keeps_snapshot_order(&self, children: impl IntoIterator<Item = NodeId>) -> bool {
        let mut last = None;
        for child in children {
            let Some(index) = self.initial_children.get_index_of(&child) else {
                continue;
            };
            if last.is_some_and(|last| index <= last) {
                return false;
            }
            last = Some(index);
        }
        true
    }

    /// Children explicitly flagged as having changed contents.
    pub fn content_changed_children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.content_changed.iter().copied()
    }

    /// Whether `child` is flagged as having changed contents.
    pub fn is_content_changed(&self, child: NodeId) -> bool {
        self.content_changed.contains(&child)
    }

    /// Whether a diff is currently memoized.
    pub fn is_cached(&self) -> bool {
        self.cached_diff.is_some()
    }

    /// Forget the memoized diff.
    pub fn clear_cache(&mut self) {
        self.cached_diff = None;
    }

    /// Flag `child` as changed in place.
    ///
    /// `length_delta` is how much the child has already grown since the
    /// snapshot was taken; the snapshot length is corrected by it so the
    /// diff still sees the child's original length.
    pub fn mark_child_changed(&mut self, child: NodeId, length_delta: i64) {
        trace!(
            parent = usize::from(self.parent),
            child = usize::from(child),
            length_delta,
            "mark child changed"
        );
        self.content_changed.insert(child);
        if length_delta != 0
            && let Some(length) = self.initial_children.get_mut(&child)
        {
            let original = i64::from(*length) - length_delta;
            debug_assert!(original >= 0, "negative original length for child");
            *length = original.max(0) as u32;
        }
        self.clear_cache();
    }

    /// Take over the content-changed flags of another record for the same
    /// parent.
    pub fn append_changes(&mut self, other: &ChangeRecord) {
        debug_assert_eq!(self.parent, other.parent, "records for different parents");
        self.content_changed
            .extend(other.content_changed.iter().copied());
        self.clear_cache();
    }

    /// The child-level changes, computed on first use after any registration.
    pub fn changes<T: TrackedTree>(&mut self, tree: &T) -> &ChildChanges {
        if self.cached_diff.is_none() {
            let changes = self.compute_changes(tree);
            debug!(
                parent = usize::from(self.parent),
                changes = changes.len(),
                "computed child changes"
            );
            self.cached_diff = Some(changes);
        }
        self.cached_diff.get_or_insert_default()
    }

    /// Children affected by a change, in child order.
    pub fn affected_children<T: TrackedTree>(&mut self, tree: &T) -> Vec<NodeId> {
        self.changes(tree).keys().copied().collect()
    }

    /// The change affecting `child`, looked up by either side.
    pub fn change_by_child<T: TrackedTree>(
        &mut self,
        tree: &T,
        child: NodeId,
    ) -> Option<ElementaryChangeInfo> {
        let changes = self.changes(tree);
        changes.get(&child).copied().or_else(|| {
            changes
                .values()
                .find(|change| change.old_child() == Some(child))
                .copied()
        })
    }

    /// Net growth of the parent.
    pub fn length_delta<T: TrackedTree>(&mut self, tree: &T) -> i64 {
        self.changes(tree)
            .values()
            .map(ElementaryChangeInfo::length_delta)
            .sum()
    }

    /// Length of the parent before the tracked changes.
    pub fn old_length<T: TrackedTree>(&mut self, tree: &T) -> u32 {
        let delta = self.length_delta(tree);
        previous_length(tree.text_length(self.parent), delta)
    }

    /// The child of `ancestor` on the path down to this record's parent.
    pub fn child_under(&self, ancestor: NodeId) -> Option<NodeId> {
        let depth = self
            .ancestor_chain
            .iter()
            .position(|&node| node == ancestor)?;
        Some(match depth {
            0 => self.parent,
            _ => self.ancestor_chain[depth - 1],
        })
    }

    /// Single forward pass over the snapshot and the live children.
    fn compute_changes<T: TrackedTree>(&self, tree: &T) -> ChildChanges {
        let current: Vec<NodeId> = tree.children(self.parent).collect();
        let alive: HashSet<NodeId> = current.iter().copied().collect();

        let mut old_iter = self.initial_children().peekable();
        let mut new_iter = current.iter().copied().peekable();
        let mut offset = 0u32;
        let mut result = ChildChanges::new();

        loop {
            let old = old_iter.peek().copied();
            let new = new_iter.peek().copied();

            match (old, new) {
                (None, None) => break,
                (Some((old_child, old_length)), Some(new_child)) if old_child == new_child => {
                    if self.content_changed.contains(&old_child) {
                        let change = ElementaryChangeInfo::create(
                            tree,
                            Some(old_child),
                            Some(new_child),
                            offset,
                            old_length,
                        );
                        offset += change.new_length();
                        result.insert(old_child, change);
                    } else {
                        offset += old_length;
                    }
                    old_iter.next();
                    new_iter.next();
                }
                _ => {
                    let mut old_gone = old.is_some_and(|(child, _)| !alive.contains(&child));
                    let mut new_fresh =
                        new.is_some_and(|child| !self.initial_children.contains_key(&child));
                    debug_assert!(
                        old_gone || new_fresh,
                        "children of node {} were reordered",
                        usize::from(self.parent)
                    );
                    if !old_gone && !new_fresh {
                        warn!(
                            parent = usize::from(self.parent),
                            "children were reordered, reporting a replacement"
                        );
                        old_gone = old.is_some();
                        new_fresh = new.is_some();
                    }

                    let old_child = old.filter(|_| old_gone);
                    let change = ElementaryChangeInfo::create(
                        tree,
                        old_child.map(|(child, _)| child),
                        new.filter(|_| new_fresh),
                        offset,
                        old_child.map_or(0, |(_, length)| length),
                    );
                    trace!(%change, "child change");
                    offset += change.new_length();
                    result.insert(change.affected_child(), change);

                    if old_gone {
                        old_iter.next();
                    }
                    if new_fresh {
                        new_iter.next();
                    }
                }
            }
        }

        result
    }

    /// Document order of two records: compare their paths from the root
    /// down, at the first depth where they name different nodes.
    pub fn compare_positions<T: TrackedTree>(&self, other: &ChangeRecord, tree: &T) -> Ordering {
        let this_path = self
            .ancestor_chain
            .iter()
            .rev()
            .copied()
            .chain(core::iter::once(self.parent));
        let that_path = other
            .ancestor_chain
            .iter()
            .rev()
            .copied()
            .chain(core::iter::once(other.parent));

        for (this, that) in this_path.zip(that_path).skip(1) {
            let ordering = compare_siblings(tree, this, that);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Report this record's changes to `sink`.
    ///
    /// If any affected child lacks a semantic counterpart, a single coarse
    /// `ChildrenChanged` covering the whole parent is reported instead.
    pub fn fire_events<T, K>(&mut self, tree: &T, sink: &mut K)
    where
        T: TrackedTree,
        K: EventSink<T::Semantic> + ?Sized,
    {
        let parent = self.parent;
        let parent_start = tree.start_offset(parent);
        let changes = self.changes(tree);
        if changes.is_empty() {
            return;
        }

        if changes.values().all(|change| change.has_semantics(tree)) {
            for change in changes.values() {
                change.fire(tree, parent, parent_start, sink);
            }
            return;
        }

        let delta: i64 = changes
            .values()
            .map(ElementaryChangeInfo::length_delta)
            .sum();
        debug!(
            parent = usize::from(parent),
            "child without semantics, reporting whole parent"
        );
        sink.event(TreeChangeEvent::ChildrenChanged {
            parent: tree.semantic(parent),
            offset: parent_start,
            old_length: previous_length(tree.text_length(parent), delta),
        });
    }
}

fn previous_length(current: u32, delta: i64) -> u32 {
    let previous = i64::from(current) - delta;
    debug_assert!(previous >= 0, "parent shrank below zero");
    previous.max(0) as u32
}

/// Order two siblings by start offset, then by index for empty nodes.
fn compare_siblings<T: TrackedTree>(tree: &T, a: NodeId, b: NodeId) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    tree.start_offset_in_parent(a)
        .cmp(&tree.start_offset_in_parent(b))
        .then_with(|| tree.child_index(a).cmp(&tree.child_index(b)))
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeRecord({}", usize::from(self.parent))?;
        match &self.cached_diff {
            Some(changes) => {
                write!(f, ":")?;
                for change in changes.values() {
                    write!(f, " {change}")?;
                }
            }
            None => write!(
                f,
                " pending, {} children flagged",
                self.content_changed.len()
            )?,
        }
        write!(f, ")")
    }
}

impl fmt::Debug for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeRecord")
            .field("parent", &self.parent)
            .field("ancestor_chain", &self.ancestor_chain)
            .field("initial_children", &self.initial_children)
            .field("content_changed", &self.content_changed)
            .field("cached_diff", &self.cached_diff)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_info::ChangeKind;
    use crate::tree::{NodeData, Tree};
    use facet_testhelpers::test;

    type TestTree = Tree<&'static str>;

    /// parent with children a, b, c of length 1 each
    fn abc() -> (TestTree, [NodeId; 3]) {
        let mut tree = Tree::new(NodeData::branch("parent", Some("parent")));
        let root = tree.root;
        let a = tree.add_child(root, NodeData::leaf("item", "a", Some("a")));
        let b = tree.add_child(root, NodeData::leaf("item", "b", Some("b")));
        let c = tree.add_child(root, NodeData::leaf("item", "c", Some("c")));
        (tree, [a, b, c])
    }

    #[test]
    fn test_remove_middle_child() {
        let (mut tree, [_a, b, _c]) = abc();
        let mut record = ChangeRecord::new(&tree, tree.root);
        tree.detach(b);

        let changes: Vec<_> = record.changes(&tree).values().copied().collect();
        assert_eq!(changes, vec![ElementaryChangeInfo::new(Some(b), None, 1, 1, 0)]);
        assert_eq!(tree.text_length(tree.root), 2);
        assert_eq!(record.old_length(&tree), 3);
    }

    #[test]
    fn test_snapshot_order_check() {
        let (mut tree, [a, b, c]) = abc();
        let record = ChangeRecord::new(&tree, tree.root);
        let x = tree.new_node(NodeData::leaf("item", "x", Some("x")));

        assert!(record.keeps_snapshot_order([a, x, c]));
        assert!(record.keeps_snapshot_order([x, a, b, c, x]));
        assert!(record.keeps_snapshot_order(Vec::<NodeId>::new()));
        assert!(!record.keeps_snapshot_order([b, c, a]));
        assert!(!record.keeps_snapshot_order([a, a]));
    }

    #[test]
    fn test_insert_between() {
        let (mut tree, [_a, b, _c]) = abc();
        let mut record = ChangeRecord::new(&tree, tree.root);
        let x = tree.new_node(NodeData::leaf("item", "x", Some("x")));
        tree.insert_before(b, x);

        let changes: Vec<_> = record.changes(&tree).values().copied().collect();
        assert_eq!(changes, vec![ElementaryChangeInfo::new(None, Some(x), 1, 0, 1)]);
        assert_eq!(changes[0].change_kind(), ChangeKind::Add);
    }

    #[test]
    fn test_replace_in_place() {
        let (mut tree, [a, b, c]) = abc();
        let mut record = ChangeRecord::new(&tree, tree.root);
        let y = tree.new_node(NodeData::leaf("item", "yyy", Some("y")));
        tree.insert_after(b, y);
        tree.detach(b);

        let change = record.change_by_child(&tree, y).expect("change for y");
        assert_eq!(change.change_kind(), ChangeKind::Replace);
        assert_eq!(change.old_child(), Some(b));
        assert_eq!(change.offset_in_parent(), 1);
        assert_eq!(change.old_length(), 1);
        assert_eq!(change.new_length(), 3);
        assert_eq!(record.change_by_child(&tree, b), Some(change));
        assert_eq!(record.change_by_child(&tree, a), None);
        assert_eq!(record.change_by_child(&tree, c), None);
        assert_eq!(record.length_delta(&tree), 2);
    }

    #[test]
    fn test_content_change_is_reported_in_place() {
        let (mut tree, [a, b, c]) = abc();
        let mut record = ChangeRecord::new(&tree, tree.root);
        record.mark_child_changed(b, 0);
        tree.set_text(b, "bbbb");

        let changes: Vec<_> = record.changes(&tree).values().copied().collect();
        assert_eq!(
            changes,
            vec![ElementaryChangeInfo::new(Some(b), Some(b), 1, 1, 4)]
        );
        assert_eq!(record.affected_children(&tree), vec![b]);
        assert!(!record.affected_children(&tree).contains(&a));
        assert!(!record.affected_children(&tree).contains(&c));
    }

    #[test]
    fn test_mark_child_changed_restores_original_length() {
        let (mut tree, [_a, b, _c]) = abc();
        tree.set_text(b, "bbbbb");
        // snapshot taken after b already grew by 4
        let mut record = ChangeRecord::new(&tree, tree.root);
        record.mark_child_changed(b, 4);

        assert_eq!(record.initial_length(b), Some(1));
        assert_eq!(record.length_delta(&tree), 4);
        assert_eq!(record.old_length(&tree), 3);
    }

    #[test]
    fn test_offsets_accumulate_across_changes() {
        let (mut tree, [a, b, c]) = abc();
        let mut record = ChangeRecord::new(&tree, tree.root);
        let x = tree.new_node(NodeData::leaf("item", "xx", Some("x")));
        let z = tree.new_node(NodeData::leaf("item", "zzz", Some("z")));
        tree.insert_before(a, x);
        tree.detach(b);
        tree.insert_after(c, z);

        let changes: Vec<_> = record.changes(&tree).values().copied().collect();
        assert_eq!(
            changes,
            vec![
                ElementaryChangeInfo::new(None, Some(x), 0, 0, 2),
                ElementaryChangeInfo::new(Some(b), None, 3, 1, 0),
                ElementaryChangeInfo::new(None, Some(z), 4, 0, 3),
            ]
        );
        let old_total: i64 = record.initial_children().map(|(_, l)| i64::from(l)).sum();
        assert_eq!(
            old_total + record.length_delta(&tree),
            i64::from(tree.text_length(tree.root))
        );
    }

    #[test]
    fn test_cache_is_invalidated_by_marking() {
        let (mut tree, [a, b, _c]) = abc();
        let mut record = ChangeRecord::new(&tree, tree.root);
        assert!(record.changes(&tree).is_empty());
        assert!(record.is_cached());

        tree.set_text(a, "aa");
        assert!(
            record.changes(&tree).is_empty(),
            "memoized diff is reused until invalidated"
        );

        record.mark_child_changed(a, 0);
        assert!(!record.is_cached());
        assert_eq!(record.affected_children(&tree), vec![a]);

        tree.detach(b);
        record.clear_cache();
        assert_eq!(record.affected_children(&tree), vec![a, b]);
    }

    #[test]
    fn test_append_changes_merges_flags() {
        let (tree, [a, b, _c]) = abc();
        let mut first = ChangeRecord::new(&tree, tree.root);
        first.mark_child_changed(a, 0);
        let mut second = ChangeRecord::new(&tree, tree.root);
        second.mark_child_changed(b, 0);

        let _ = first.changes(&tree);
        first.append_changes(&second);
        assert!(!first.is_cached());
        assert!(first.is_content_changed(a));
        assert!(first.is_content_changed(b));
    }

    #[test]
    fn test_child_under_ancestor() {
        let mut tree: TestTree = Tree::new(NodeData::branch("root", None));
        let root = tree.root;
        let p = tree.add_child(root, NodeData::branch("p", None));
        let g = tree.add_child(p, NodeData::branch("g", None));
        tree.add_child(g, NodeData::leaf("leaf", "x", None));

        let record = ChangeRecord::new(&tree, g);
        assert_eq!(record.ancestor_chain(), &[p, root]);
        assert_eq!(record.child_under(p), Some(g));
        assert_eq!(record.child_under(root), Some(p));
        assert_eq!(record.child_under(g), None);
    }

    #[test]
    fn test_compare_positions_follows_document_order() {
        let mut tree: TestTree = Tree::new(NodeData::branch("root", None));
        let root = tree.root;
        let left = tree.add_child(root, NodeData::branch("left", None));
        let left_inner = tree.add_child(left, NodeData::branch("inner", None));
        tree.add_child(left_inner, NodeData::leaf("t", "ab", None));
        let empty = tree.add_child(root, NodeData::branch("empty", None));
        let right = tree.add_child(root, NodeData::branch("right", None));
        tree.add_child(right, NodeData::leaf("t", "cd", None));

        let inner = ChangeRecord::new(&tree, left_inner);
        let empty_record = ChangeRecord::new(&tree, empty);
        let right_record = ChangeRecord::new(&tree, right);

        // `empty` and `right` start at the same offset, index breaks the tie
        assert_eq!(
            empty_record.compare_positions(&right_record, &tree),
            Ordering::Less
        );
        assert_eq!(
            right_record.compare_positions(&empty_record, &tree),
            Ordering::Greater
        );
        assert_eq!(inner.compare_positions(&right_record, &tree), Ordering::Less);
        assert_eq!(inner.compare_positions(&inner, &tree), Ordering::Equal);
    }

    #[test]
    fn test_fire_falls_back_without_semantics() {
        let (mut tree, [_a, b, _c]) = abc();
        let mut record = ChangeRecord::new(&tree, tree.root);
        let ws = tree.new_node(NodeData::leaf("ws", "   ", None));
        tree.insert_after(b, ws);

        let mut events = Vec::new();
        record.fire_events(&tree, &mut events);
        assert_eq!(
            events,
            vec![TreeChangeEvent::ChildrenChanged {
                parent: Some("parent"),
                offset: 0,
                old_length: 3,
            }]
        );
    }

    #[test]
    fn test_fire_granular_in_child_order() {
        let (mut tree, [a, _b, c]) = abc();
        let tree_offset = 40;
        let mut record = ChangeRecord::new(&tree, tree.root);
        tree.detach(a);
        let d = tree.new_node(NodeData::leaf("item", "d", Some("d")));
        tree.insert_after(c, d);
        let tree = tree.with_root_offset(tree_offset);

        let mut events = Vec::new();
        record.fire_events(&tree, &mut events);
        assert_eq!(
            events,
            vec![
                TreeChangeEvent::ChildRemoved {
                    parent: Some("parent"),
                    child: "a",
                    offset: 40,
                    old_length: 1,
                },
                TreeChangeEvent::ChildAdded {
                    parent: Some("parent"),
                    child: "d",
                    offset: 42,
                },
            ]
        );
    }
}
