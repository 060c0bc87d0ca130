use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense identifier of a node: every cluster of `N` nodes uses exactly the ids `0..N`.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The node that coordinates barriers.
    pub const COORDINATOR: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// All ids of a cluster with `count` nodes, in order.
    pub fn all(count: usize) -> impl Iterator<Item = NodeId> {
        (0..count as u32).map(NodeId)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        NodeId(id)
    }
}
