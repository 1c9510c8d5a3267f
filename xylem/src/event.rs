//! Notifications emitted when a change set fires.

use core::fmt;

/// One structural change notification.
///
/// Nodes are reported through their semantic counterparts, never as raw
/// tree handles. All offsets are absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeChangeEvent<S> {
    /// `child` was inserted under `parent`.
    ChildAdded {
        /// Counterpart of the changed parent
        parent: Option<S>,
        /// The inserted child
        child: S,
        /// Start of the inserted child
        offset: u32,
    },

    /// `child` was removed from `parent`.
    ChildRemoved {
        /// Counterpart of the changed parent
        parent: Option<S>,
        /// The removed child
        child: S,
        /// Where the child used to start
        offset: u32,
        /// Length the child spanned before removal
        old_length: u32,
    },

    /// `old_child` was replaced by `new_child`.
    ChildReplaced {
        /// Counterpart of the changed parent
        parent: Option<S>,
        /// The child that was replaced
        old_child: S,
        /// The child that took its place
        new_child: S,
        /// Start of the replaced range
        offset: u32,
        /// Length `old_child` spanned
        old_length: u32,
    },

    /// The contents of `parent` changed in a way not described granularly.
    ChildrenChanged {
        /// The element whose contents changed
        parent: Option<S>,
        /// Start of the element
        offset: u32,
        /// Length the element spanned before the change
        old_length: u32,
    },
}

impl<S> TreeChangeEvent<S> {
    /// Absolute offset the event refers to.
    pub fn offset(&self) -> u32 {
        match self {
            Self::ChildAdded { offset, .. }
            | Self::ChildRemoved { offset, .. }
            | Self::ChildReplaced { offset, .. }
            | Self::ChildrenChanged { offset, .. } => *offset,
        }
    }
}

impl<S: fmt::Debug> fmt::Display for TreeChangeEvent<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChildAdded {
                parent,
                child,
                offset,
            } => write!(f, "childAdded({child:?} under {parent:?} @{offset})"),
            Self::ChildRemoved {
                parent,
                child,
                offset,
                old_length,
            } => write!(
                f,
                "childRemoved({child:?} under {parent:?} @{offset} len={old_length})"
            ),
            Self::ChildReplaced {
                parent,
                old_child,
                new_child,
                offset,
                old_length,
            } => write!(
                f,
                "childReplaced({old_child:?} → {new_child:?} under {parent:?} @{offset} len={old_length})"
            ),
            Self::ChildrenChanged {
                parent,
                offset,
                old_length,
            } => write!(f, "childrenChanged({parent:?} @{offset} len={old_length})"),
        }
    }
}

/// Receiver of change notifications, called in emission order.
pub trait EventSink<S> {
    /// Handle one notification.
    fn event(&mut self, event: TreeChangeEvent<S>);
}

impl<S> EventSink<S> for Vec<TreeChangeEvent<S>> {
    fn event(&mut self, event: TreeChangeEvent<S>) {
        self.push(event);
    }
}

/// Adapter turning a closure into an [`EventSink`].
pub struct FnSink<F>(pub F);

impl<S, F: FnMut(TreeChangeEvent<S>)> EventSink<S> for FnSink<F> {
    fn event(&mut self, event: TreeChangeEvent<S>) {
        (self.0)(event);
    }
}

impl<F> fmt::Debug for FnSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnSink")
    }
}
