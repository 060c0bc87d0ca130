//! Cluster Description
//!
//! Static membership of a DHT session: the dense node ids and, for TCP deployments,
//! where each node listens.
//!
//! - **`types`**: `NodeId`, the dense `0..N` node identifier.
//! - **`config`**: `ClusterConfig`, loaded from a file with environment overrides and validated
//!   before any node starts.

pub mod config;
pub mod types;
