//! All changes of one editing transaction.
//!
//! A [`ChangeSet`] keeps at most one [`ChangeRecord`] per independent edit
//! region. Registering a change under a parent that already sits inside a
//! recorded subtree folds it into the enclosing record; registering a change
//! above existing records absorbs them. Live records therefore never nest.

use core::fmt;

use indexmap::IndexMap;
use indextree::NodeId;
use rapidhash::RapidHashMap as HashMap;
use smallvec::SmallVec;

use crate::config::TrackingConfig;
use crate::event::EventSink;
use crate::record::ChangeRecord;
use crate::tree::TrackedTree;
use crate::tracing_macros::{debug, trace};

/// Where a node sits relative to the live records.
enum Location {
    /// `child` is a direct child of the recorded `parent`.
    Enclosed { parent: NodeId, child: NodeId },
    /// No record encloses the node, and it is attached to the tracked root.
    Untracked,
    /// The node is not connected to the tracked root.
    Detached,
}

/// The change records of one transaction.
pub struct ChangeSet {
    root: NodeId,
    config: TrackingConfig,
    by_parent: IndexMap<NodeId, ChangeRecord>,
    /// Every ancestor of every recorded parent, mapped to those parents.
    by_any_ancestor: HashMap<NodeId, SmallVec<[NodeId; 4]>>,
}

impl ChangeSet {
    /// An empty change set for the tree rooted at `root`.
    pub fn new(root: NodeId) -> Self {
        Self::with_config(root, TrackingConfig::default())
    }

    /// An empty change set with explicit configuration.
    pub fn with_config(root: NodeId, config: TrackingConfig) -> Self {
        Self {
            root,
            config,
            by_parent: IndexMap::new(),
            by_any_ancestor: HashMap::default(),
        }
    }

    /// Root of the tracked tree.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The configuration this set was created with.
    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.by_parent.is_empty()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.by_parent.len()
    }

    /// Parents with a live record, in registration order.
    pub fn changed_parents(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.by_parent.keys().copied()
    }

    /// The live record for `parent`.
    pub fn record(&self, parent: NodeId) -> Option<&ChangeRecord> {
        self.by_parent.get(&parent)
    }

    /// The live record for `parent`, mutably (to query its lazy diff).
    pub fn record_mut(&mut self, parent: NodeId) -> Option<&mut ChangeRecord> {
        self.by_parent.get_mut(&parent)
    }

    /// All live records, in registration order.
    pub fn records(&self) -> impl Iterator<Item = &ChangeRecord> + '_ {
        self.by_parent.values()
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.by_parent.clear();
        self.by_any_ancestor.clear();
    }

    /// Note that the children of `parent` are about to change.
    ///
    /// Must be called before the structural edit is applied, so that a new
    /// record snapshots the children as they were.
    pub fn register_elementary_change<T: TrackedTree>(&mut self, tree: &T, parent: NodeId) {
        if let Some(record) = self.by_parent.get_mut(&parent) {
            trace!(parent = usize::from(parent), "parent already recorded");
            record.clear_cache();
            return;
        }

        match self.locate(tree, parent) {
            Location::Enclosed {
                parent: enclosing,
                child,
            } => self.mark_enclosed(enclosing, child),
            Location::Untracked => {
                let record = ChangeRecord::new(tree, parent);
                self.merge_record(tree, record);
            }
            Location::Detached => {
                trace!(parent = usize::from(parent), "ignoring detached parent");
            }
        }
        self.verify(tree);
    }

    /// Note that the contents of `child` are about to change in place.
    ///
    /// The child is flagged in whichever record covers it: its parent's
    /// record, an enclosing record (through the covering ancestor), or a
    /// new record for its parent.
    pub fn mark_child_changed<T: TrackedTree>(&mut self, tree: &T, child: NodeId) {
        let Some(parent) = tree.parent(child) else {
            trace!(child = usize::from(child), "ignoring parentless child");
            return;
        };

        match self.locate(tree, child) {
            Location::Enclosed {
                parent: enclosing,
                child: covering,
            } => self.mark_enclosed(enclosing, covering),
            Location::Untracked => {
                let mut record = ChangeRecord::new(tree, parent);
                record.mark_child_changed(child, 0);
                self.merge_record(tree, record);
            }
            Location::Detached => {
                trace!(child = usize::from(child), "ignoring detached child");
            }
        }
        self.verify(tree);
    }

    /// Fold the changes of a nested transaction into this one.
    pub fn merge<T: TrackedTree>(&mut self, tree: &T, other: ChangeSet) {
        debug!(
            records = other.by_parent.len(),
            into = self.by_parent.len(),
            "merge change set"
        );
        for (parent, record) in other.by_parent {
            if let Some(existing) = self.by_parent.get_mut(&parent) {
                existing.append_changes(&record);
                continue;
            }
            match self.locate(tree, parent) {
                Location::Enclosed {
                    parent: enclosing,
                    child,
                } => self.mark_enclosed(enclosing, child),
                Location::Untracked => self.merge_record(tree, record),
                Location::Detached => {
                    trace!(parent = usize::from(parent), "dropping detached record");
                }
            }
        }
        self.verify(tree);
    }

    /// Compute every pending diff now, before a nested transaction starts
    /// editing the tree.
    pub fn freeze_before_nested_transaction<T: TrackedTree>(&mut self, tree: &T) {
        for record in self.by_parent.values_mut() {
            let _ = record.changes(tree);
        }
    }

    /// Live records' parents in firing order.
    pub fn sorted_parents<T: TrackedTree>(&self, tree: &T) -> Vec<NodeId> {
        let mut parents: Vec<NodeId> = self.by_parent.keys().copied().collect();
        parents.sort_by(|a, b| self.by_parent[a].compare_positions(&self.by_parent[b], tree));
        parents
    }

    /// Report every change to `sink`, records in document order and each
    /// record's changes in child order.
    pub fn fire_events<T, K>(mut self, tree: &T, sink: &mut K)
    where
        T: TrackedTree,
        K: EventSink<T::Semantic> + ?Sized,
    {
        self.verify(tree);
        let order = self.sorted_parents(tree);
        debug!(records = order.len(), "fire events");
        for parent in order {
            if let Some(record) = self.by_parent.get_mut(&parent) {
                record.fire_events(tree, sink);
            }
        }
    }

    /// Panic if the indexes disagree or two live records nest.
    pub fn check_invariants<T: TrackedTree>(&self, tree: &T) {
        for (&parent, record) in &self.by_parent {
            assert_eq!(record.parent(), parent, "record filed under the wrong parent");
            for ancestor in record.ancestor_chain() {
                assert!(
                    self.by_any_ancestor
                        .get(ancestor)
                        .is_some_and(|parents| parents.contains(&parent)),
                    "record {} missing from the index of ancestor {}",
                    usize::from(parent),
                    usize::from(*ancestor)
                );
                assert!(
                    !self.by_parent.contains_key(ancestor),
                    "record {} nested under record {}",
                    usize::from(parent),
                    usize::from(*ancestor)
                );
            }
        }
        for (ancestor, parents) in &self.by_any_ancestor {
            assert!(!parents.is_empty(), "empty ancestor index entry");
            for parent in parents {
                assert!(
                    self.by_parent
                        .get(parent)
                        .is_some_and(|record| record.ancestor_chain().contains(ancestor)),
                    "stale ancestor index entry {} -> {}",
                    usize::from(*ancestor),
                    usize::from(*parent)
                );
            }
        }
        for &parent in self.by_parent.keys() {
            debug_assert!(
                tree.ancestors(parent)
                    .all(|ancestor| !self.by_parent.contains_key(&ancestor)),
                "record {} is nested in the live tree",
                usize::from(parent)
            );
        }
    }

    fn verify<T: TrackedTree>(&self, tree: &T) {
        if self.config.check_invariants {
            self.check_invariants(tree);
        }
    }

    /// Walk up from `node` looking for the nearest recorded ancestor.
    fn locate<T: TrackedTree>(&self, tree: &T, node: NodeId) -> Location {
        let mut current = node;
        loop {
            match tree.parent(current) {
                Some(parent) if self.by_parent.contains_key(&parent) => {
                    return Location::Enclosed {
                        parent,
                        child: current,
                    };
                }
                Some(parent) => current = parent,
                None if current == self.root => return Location::Untracked,
                None => return Location::Detached,
            }
        }
    }

    fn mark_enclosed(&mut self, parent: NodeId, child: NodeId) {
        trace!(
            parent = usize::from(parent),
            child = usize::from(child),
            "subsumed into enclosing record"
        );
        if let Some(record) = self.by_parent.get_mut(&parent) {
            record.mark_child_changed(child, 0);
        }
    }

    /// Add `record`, absorbing every live record beneath its parent.
    fn merge_record<T: TrackedTree>(&mut self, tree: &T, mut record: ChangeRecord) {
        let parent = record.parent();
        let descendants = self
            .by_any_ancestor
            .get(&parent)
            .cloned()
            .unwrap_or_default();

        for descendant in descendants {
            let Some(mut absorbed) = self.remove_record(descendant) else {
                continue;
            };
            let Some(child) = absorbed.child_under(parent) else {
                continue;
            };
            let delta = absorbed.length_delta(tree);
            debug!(
                parent = usize::from(parent),
                absorbed = usize::from(descendant),
                delta,
                "absorb descendant record"
            );
            record.mark_child_changed(child, delta);
        }

        debug!(parent = usize::from(parent), "new change record");
        self.add_record(record);
    }

    fn add_record(&mut self, record: ChangeRecord) {
        let parent = record.parent();
        for &ancestor in record.ancestor_chain() {
            self.by_any_ancestor
                .entry(ancestor)
                .or_default()
                .push(parent);
        }
        self.by_parent.insert(parent, record);
    }

    fn remove_record(&mut self, parent: NodeId) -> Option<ChangeRecord> {
        let record = self.by_parent.shift_remove(&parent)?;
        for ancestor in record.ancestor_chain() {
            if let Some(parents) = self.by_any_ancestor.get_mut(ancestor) {
                parents.retain(|p| *p != parent);
                if parents.is_empty() {
                    self.by_any_ancestor.remove(ancestor);
                }
            }
        }
        Some(record)
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeSet(root {})", usize::from(self.root))?;
        for record in self.by_parent.values() {
            write!(f, "\n  {record}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSet")
            .field("root", &self.root)
            .field("records", &self.by_parent)
            .finish_non_exhaustive()
    }
}
