//! Transport Module
//!
//! Point-to-point messaging between the nodes of a fixed-size cluster.
//!
//! ## Core Concepts
//! - **Endpoints**: Every node owns one `Transport` endpoint. Its id and the cluster size are
//!   fixed at startup and every node agrees on both.
//! - **Mailboxes**: Incoming messages are split by kind. Requests and confirmations go to the
//!   `Server` mailbox, replies (`ReturnValue`, `SizeTotal`) to the `Client` mailbox, so a
//!   node's client and server never steal each other's traffic.
//! - **Ordering**: Messages from one sender to one receiver arrive in send order.
//! - **Collectives**: `barrier` blocks until every node has entered it; `reduce_sum` adds one
//!   value per node and hands the total to the root only.
//!
//! `MeshTransport` is the only implementation. It runs either fully in-process (one runtime,
//! channels only) or over TCP with one outbound stream per peer.

use async_trait::async_trait;

use crate::cluster::types::NodeId;
use crate::dht::protocol::{Message, MessageKind};
use crate::error::Result;

pub mod frame;
pub mod mesh;
mod tcp;

pub use mesh::MeshTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mailbox {
    Server,
    Client,
}

impl Mailbox {
    /// Mailbox a message of `kind` is delivered to.
    pub fn for_kind(kind: MessageKind) -> Self {
        if kind.is_reply() {
            Mailbox::Client
        } else {
            Mailbox::Server
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    pub from: NodeId,
    pub message: Message,
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn node_id(&self) -> NodeId;

    fn node_count(&self) -> usize;

    /// Queues `message` for `dest`. Never waits for the receiver; a send to self is allowed.
    fn send(&self, dest: NodeId, message: Message) -> Result<()>;

    /// Next message in `mailbox`, from any sender.
    async fn recv(&self, mailbox: Mailbox) -> Result<Incoming>;

    /// Next message in `mailbox` from `source` with the given kind. Anything else that arrives
    /// meanwhile is kept for later receives.
    async fn recv_matching(
        &self,
        mailbox: Mailbox,
        source: NodeId,
        kind: MessageKind,
    ) -> Result<Message>;

    /// Sums `local` over all nodes. The root gets `Some(total)` once every node contributed;
    /// every other node returns `None` as soon as its share is sent.
    async fn reduce_sum(&self, local: i64, root: NodeId) -> Result<Option<i64>>;

    /// Returns once every node of the cluster has called `barrier` the same number of times.
    async fn barrier(&self) -> Result<()>;

    /// Flushes queued outbound traffic and closes the links. No sends may follow.
    async fn shutdown(&self) -> Result<()>;
}

#[cfg(test)]
mod tests;
