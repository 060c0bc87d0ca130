//! Distributed Hash Table Cluster Library
//!
//! This library crate defines the modules of a key/value table partitioned over a fixed set of
//! cooperating nodes. It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! - **`cluster`**: Static cluster description. Dense node ids and the validated node list
//!   loaded from a configuration file.
//! - **`dht`**: The coordination layer. Wire messages, the per-node request `Server`, and the
//!   `DhtNode` client API (`put`, `get`, `size`, `sync`, `destroy`).
//! - **`error`**: The shared `DhtError` type.
//! - **`storage`**: Key placement (`Partitioner`) and the per-node shard (`LocalStore`).
//! - **`transport`**: Point-to-point messaging and collectives between nodes, either
//!   in-process or over TCP.
//! - **`workload`**: Script parsing and execution used by the binary.

pub mod cluster;
pub mod dht;
pub mod error;
pub mod storage;
pub mod transport;
pub mod workload;
