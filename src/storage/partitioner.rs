use crate::cluster::types::NodeId;
use crate::error::{DhtError, Result};

/// Maps keys to their owning node.
///
/// Ownership is a pure function of the key and the node count, so every node computes the same
/// owner without coordination as long as all of them agree on `node_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    node_count: u32,
}

impl Partitioner {
    pub fn new(node_count: usize) -> Result<Self> {
        if node_count == 0 || node_count > u32::MAX as usize {
            return Err(DhtError::InvalidNodeCount(node_count));
        }

        Ok(Self {
            node_count: node_count as u32,
        })
    }

    pub fn node_count(&self) -> usize {
        self.node_count as usize
    }

    pub fn owner(&self, key: &str) -> NodeId {
        NodeId(djb2(key) % self.node_count)
    }
}

/// djb2 over the key bytes with wrapping 32-bit arithmetic.
pub fn djb2(key: &str) -> u32 {
    key.bytes()
        .fold(5381u32, |hash, byte| {
            hash.wrapping_mul(33).wrapping_add(byte as u32)
        })
}
