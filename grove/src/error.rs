use facet::Facet;

/// Errors returned by document edits.
///
/// Node handles are reported as their arena index.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
#[facet(derive(Error))]
#[repr(u8)]
pub enum TreeError {
    /// node {child} is not a child of node {parent}
    NotAChild { parent: usize, child: usize },

    /// child index {index} out of bounds for {len} children
    IndexOutOfBounds { index: usize, len: usize },

    /// node {node} is already attached to a parent
    AlreadyAttached { node: usize },

    /// node {node} is not a leaf
    NotALeaf { node: usize },

    /// node {node} has no parent
    NoParent { node: usize },

    /// node {node} cannot be inserted into its own subtree
    WouldCycle { node: usize },

    /// node {child} would be put back out of order among the tracked children of node {parent}
    WouldReorder { parent: usize, child: usize },
}
