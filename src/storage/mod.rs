//! Storage Module
//!
//! Key placement and the per-node shard.
//!
//! ## Core Concepts
//! - **Partitioning**: `Partitioner` maps every key to exactly one owning node with a djb2 hash
//!   reduced modulo the node count. All nodes evaluate it identically, so ownership never races.
//! - **Local shard**: `LocalStore` is the pluggable per-node key/value map. `MemoryStore` is the
//!   in-memory implementation used by the binary and the tests.

pub mod local;
pub mod partitioner;

pub use local::{LocalStore, MemoryStore};
pub use partitioner::Partitioner;

#[cfg(test)]
mod tests;
