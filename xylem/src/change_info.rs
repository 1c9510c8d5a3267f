//! Child-level change descriptions.
//!
//! An [`ElementaryChangeInfo`] records one difference between a parent's
//! children as they were when tracking started and as they are now. Its
//! [`ChangeKind`] is derived purely from which sides are present.

use core::fmt;

use indextree::NodeId;

use crate::event::{EventSink, TreeChangeEvent};
use crate::tree::TrackedTree;

/// Classification of an [`ElementaryChangeInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// A child was inserted.
    Add,
    /// A child was removed.
    Removed,
    /// A child was replaced by a different node.
    Replace,
    /// A child kept its place but its contents changed.
    ContentsChanged,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Add => "ADD",
            ChangeKind::Removed => "REMOVED",
            ChangeKind::Replace => "REPLACE",
            ChangeKind::ContentsChanged => "CONTENTS_CHANGED",
        })
    }
}

/// One child-level difference inside a changed parent.
///
/// `offset_in_parent` is expressed in the parent's current coordinates:
/// every change that precedes this one has already been applied to it.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ElementaryChangeInfo {
    old_child: Option<NodeId>,
    new_child: Option<NodeId>,
    offset_in_parent: u32,
    old_length: u32,
    new_length: u32,
}

impl ElementaryChangeInfo {
    /// Describe a change with explicit lengths.
    ///
    /// At least one side must be present. Passing the same node on both
    /// sides describes a pure content change.
    pub fn new(
        old_child: Option<NodeId>,
        new_child: Option<NodeId>,
        offset_in_parent: u32,
        old_length: u32,
        new_length: u32,
    ) -> Self {
        assert!(
            old_child.is_some() || new_child.is_some(),
            "a change needs an old or a new child"
        );
        Self {
            old_child,
            new_child,
            offset_in_parent,
            old_length,
            new_length,
        }
    }

    /// Describe a change, reading the new side's length from the live tree.
    pub fn create<T: TrackedTree>(
        tree: &T,
        old_child: Option<NodeId>,
        new_child: Option<NodeId>,
        offset_in_parent: u32,
        old_length: u32,
    ) -> Self {
        let new_length = new_child.map_or(0, |child| tree.text_length(child));
        Self::new(
            old_child,
            new_child,
            offset_in_parent,
            old_length,
            new_length,
        )
    }

    /// What kind of change this is.
    pub fn change_kind(&self) -> ChangeKind {
        match (self.old_child, self.new_child) {
            (old, new) if old == new => ChangeKind::ContentsChanged,
            (Some(_), None) => ChangeKind::Removed,
            (Some(_), Some(_)) => ChangeKind::Replace,
            (None, _) => ChangeKind::Add,
        }
    }

    /// The child that was there before, if any.
    pub fn old_child(&self) -> Option<NodeId> {
        self.old_child
    }

    /// The child that is there now, if any.
    pub fn new_child(&self) -> Option<NodeId> {
        self.new_child
    }

    /// The child this change is keyed by: the new child if present,
    /// otherwise the old one.
    pub fn affected_child(&self) -> NodeId {
        match (self.new_child, self.old_child) {
            (Some(child), _) | (None, Some(child)) => child,
            (None, None) => unreachable!("change without children"),
        }
    }

    /// Offset of the change relative to the start of the parent.
    pub fn offset_in_parent(&self) -> u32 {
        self.offset_in_parent
    }

    /// Length of the range before the change.
    pub fn old_length(&self) -> u32 {
        self.old_length
    }

    /// Length of the range after the change.
    pub fn new_length(&self) -> u32 {
        self.new_length
    }

    /// How much the parent grew (positive) or shrank (negative).
    pub fn length_delta(&self) -> i64 {
        i64::from(self.new_length) - i64::from(self.old_length)
    }

    /// Whether every node this change mentions has a semantic counterpart.
    pub fn has_semantics<T: TrackedTree>(&self, tree: &T) -> bool {
        self.old_child
            .into_iter()
            .chain(self.new_child)
            .all(|child| tree.semantic(child).is_some())
    }

    /// Send this change to `sink`.
    ///
    /// `parent_start` is the absolute offset of `parent`. Nodes lacking a
    /// semantic counterpart cannot be reported and make this a no-op;
    /// [`ChangeRecord`](crate::ChangeRecord) falls back to a coarse event
    /// before that can happen.
    pub fn fire<T, K>(&self, tree: &T, parent: NodeId, parent_start: u32, sink: &mut K)
    where
        T: TrackedTree,
        K: EventSink<T::Semantic> + ?Sized,
    {
        let offset = parent_start + self.offset_in_parent;
        let old = self.old_child.and_then(|child| tree.semantic(child));
        let new = self.new_child.and_then(|child| tree.semantic(child));
        let event = match (self.change_kind(), old, new) {
            (ChangeKind::Add, _, Some(child)) => TreeChangeEvent::ChildAdded {
                parent: tree.semantic(parent),
                child,
                offset,
            },
            (ChangeKind::Removed, Some(child), _) => TreeChangeEvent::ChildRemoved {
                parent: tree.semantic(parent),
                child,
                offset,
                old_length: self.old_length,
            },
            (ChangeKind::Replace, Some(old_child), Some(new_child)) => {
                TreeChangeEvent::ChildReplaced {
                    parent: tree.semantic(parent),
                    old_child,
                    new_child,
                    offset,
                    old_length: self.old_length,
                }
            }
            (ChangeKind::ContentsChanged, Some(child), _) => TreeChangeEvent::ChildrenChanged {
                parent: Some(child),
                offset,
                old_length: self.old_length,
            },
            _ => return,
        };
        sink.event(event);
    }
}

impl fmt::Display for ElementaryChangeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.change_kind())?;
        match (self.old_child, self.new_child) {
            (Some(old), Some(new)) if old == new => write!(f, "{}", usize::from(old))?,
            (Some(old), Some(new)) => write!(f, "{} → {}", usize::from(old), usize::from(new))?,
            (Some(old), None) => write!(f, "{}", usize::from(old))?,
            (None, Some(new)) => write!(f, "{}", usize::from(new))?,
            (None, None) => {}
        }
        write!(
            f,
            " @{} {}→{})",
            self.offset_in_parent, self.old_length, self.new_length
        )
    }
}

impl fmt::Debug for ElementaryChangeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A replacement described in two steps: first the incoming node, then the
/// node it replaces once that is known.
///
/// Until [`set_replaced`](Self::set_replaced) is called this describes an
/// insertion of the new node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceChangeInfo {
    new_child: NodeId,
    old_child: Option<NodeId>,
    offset_in_parent: u32,
    old_length: u32,
    new_length: u32,
}

impl ReplaceChangeInfo {
    /// Start describing the arrival of `new_child`, which must already sit
    /// where the replaced node starts.
    pub fn new<T: TrackedTree>(tree: &T, new_child: NodeId) -> Self {
        Self {
            new_child,
            old_child: None,
            offset_in_parent: tree.start_offset_in_parent(new_child),
            old_length: 0,
            new_length: tree.text_length(new_child),
        }
    }

    /// Complete the description with the node being replaced.
    ///
    /// The old length is measured without trusting cached lengths, and the
    /// char-table association of the new node's context is carried over to
    /// `old_child` so it stays readable after it is detached.
    pub fn set_replaced<T: TrackedTree>(&mut self, tree: &mut T, old_child: NodeId) {
        self.old_length = tree.text_length_uncached(old_child);
        tree.transfer_char_table(self.new_child, old_child);
        self.old_child = Some(old_child);
    }

    /// The node being replaced, once known.
    pub fn replaced(&self) -> Option<NodeId> {
        self.old_child
    }

    /// The incoming node.
    pub fn new_child(&self) -> NodeId {
        self.new_child
    }

    /// The finished change.
    pub fn into_change_info(self) -> ElementaryChangeInfo {
        ElementaryChangeInfo::new(
            self.old_child,
            Some(self.new_child),
            self.offset_in_parent,
            self.old_length,
            self.new_length,
        )
    }
}

impl From<ReplaceChangeInfo> for ElementaryChangeInfo {
    fn from(info: ReplaceChangeInfo) -> Self {
        info.into_change_info()
    }
}


#[cfg(test)]
mod contract_tests {
    use super::*;

    #[test]
    #[should_panic(expected = "a change needs an old or a new child")]
    fn test_empty_change_is_rejected() {
        let _ = ElementaryChangeInfo::new(None, None, 0, 0, 0);
    }
}
