//! Error types shared by every layer of the DHT.

use crate::cluster::types::NodeId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DhtError>;

#[derive(Debug, Error)]
pub enum DhtError {
    /// Invalid or unreadable cluster configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("node count must be at least 1, got {0}")]
    InvalidNodeCount(usize),

    /// Key does not fit in the fixed-size wire slot (one byte is kept for the terminator).
    #[error("key is {len} bytes, at most {max} bytes are allowed")]
    KeyTooLong { len: usize, max: usize },

    #[error("key contains a NUL byte")]
    KeyContainsNul,

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// The local endpoint has been shut down, or a peer link is gone.
    #[error("transport closed")]
    TransportClosed,

    /// A frame arrived that could not be decoded.
    #[error("malformed frame: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server task failed: {0}")]
    ServerTask(String),

    /// Workload script could not be parsed.
    #[error("script line {line}: {reason}")]
    Script { line: usize, reason: String },
}

impl From<tokio::task::JoinError> for DhtError {
    fn from(err: tokio::task::JoinError) -> Self {
        DhtError::ServerTask(err.to_string())
    }
}
