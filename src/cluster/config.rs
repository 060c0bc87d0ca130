use crate::error::{DhtError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use super::types::NodeId;

/// Static description of the cluster. Every node must load the same node list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub nodes: Vec<PeerConfig>,
    #[serde(default)]
    pub transport: TransportSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerConfig {
    pub id: NodeId,
    pub addr: SocketAddr,
}

/// Connection behaviour of the TCP transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    /// How long to keep retrying outbound connections before giving up.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_retry_interval_ms() -> u64 {
    100
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

impl TransportSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl ClusterConfig {
    /// Loads the node list from a file (format picked by extension) with `DHT_`-prefixed
    /// environment overrides, then validates it.
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(::config::Environment::with_prefix("DHT").separator("__"))
            .build()
            .map_err(|e| DhtError::Config(e.to_string()))?;

        let config: ClusterConfig = settings
            .try_deserialize()
            .map_err(|e| DhtError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Builds a loopback configuration from already-known addresses, ids assigned in order.
    pub fn from_addrs(addrs: &[SocketAddr]) -> Self {
        Self {
            nodes: addrs
                .iter()
                .zip(NodeId::all(addrs.len()))
                .map(|(addr, id)| PeerConfig { id, addr: *addr })
                .collect(),
            transport: TransportSettings::default(),
        }
    }

    /// Checks that the ids are exactly `0..N` and that no address is shared.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(DhtError::InvalidNodeCount(0));
        }

        let mut seen_ids = HashSet::new();
        let mut seen_addrs = HashSet::new();
        for peer in &self.nodes {
            if !seen_ids.insert(peer.id) {
                return Err(DhtError::Config(format!("duplicate node id {}", peer.id)));
            }
            if !seen_addrs.insert(peer.addr) {
                return Err(DhtError::Config(format!(
                    "address {} is used by more than one node",
                    peer.addr
                )));
            }
        }

        if let Some(peer) = self.nodes.iter().find(|p| p.id.index() >= self.nodes.len()) {
            return Err(DhtError::Config(format!(
                "node id {} is out of range for a cluster of {} nodes",
                peer.id,
                self.nodes.len()
            )));
        }

        if self.transport.retry_interval_ms == 0 {
            return Err(DhtError::Config(
                "transport.retry_interval_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn addr_of(&self, id: NodeId) -> Result<SocketAddr> {
        self.nodes
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.addr)
            .ok_or(DhtError::UnknownNode(id))
    }
}
