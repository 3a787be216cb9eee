//! Handle types for graph entities.
//!
//! Nodes, values and blocks live in arenas owned by a [`Graph`](crate::ir::Graph). The
//! handles defined here are plain indices into those arenas. A handle stays valid until the
//! entity it names is destroyed; accessing a destroyed entity through a stale handle is an
//! invariant violation and panics.

use std::fmt;

/// A strongly-typed identifier for a node within a [`Graph`](crate::ir::Graph).
///
/// `NodeId` wraps a `usize` index, providing type safety to prevent accidental mixing of node
/// indices with value or block indices. Node IDs are assigned sequentially and never reused
/// within one graph, so a destroyed node's ID can never alias a newer node.
///
/// # Examples
///
/// ```rust
/// use catopt::ir::NodeId;
///
/// let node = NodeId::new(3);
/// assert_eq!(node.index(), 3);
/// assert_eq!(node.to_string(), "n3");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a new `NodeId` from a raw index value.
    ///
    /// Normal usage should obtain `NodeId` values from
    /// [`Graph::create_node`](crate::ir::Graph::create_node).
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw index value of this node identifier.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A strongly-typed identifier for a value within a [`Graph`](crate::ir::Graph).
///
/// Values are immutable identities: changing what a value means is done by rewiring its
/// uses to a different `ValueId`, never by editing the value in place.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueId(pub(crate) usize);

impl ValueId {
    /// Creates a new `ValueId` from a raw index value.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        ValueId(index)
    }

    /// Returns the raw index value of this value identifier.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueId({})", self.0)
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A strongly-typed identifier for a block within a [`Graph`](crate::ir::Graph).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    /// Creates a new `BlockId` from a raw index value.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        BlockId(index)
    }

    /// Returns the raw index value of this block identifier.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_display() {
        assert_eq!(NodeId::new(7).to_string(), "n7");
        assert_eq!(ValueId::new(2).to_string(), "%2");
        assert_eq!(BlockId::new(0).to_string(), "B0");
        assert_eq!(format!("{:?}", NodeId::new(1)), "NodeId(1)");
    }

    #[test]
    fn test_ids_hash_and_order() {
        let mut set = HashSet::new();
        set.insert(ValueId::new(1));
        set.insert(ValueId::new(1));
        set.insert(ValueId::new(2));
        assert_eq!(set.len(), 2);
        assert!(NodeId::new(1) < NodeId::new(2));
    }
}
