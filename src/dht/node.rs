use std::io::Write;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::confirm::PendingConfirmation;
use super::protocol::{self, Message, MessageKind};
use super::server::Server;
use crate::cluster::types::NodeId;
use crate::error::Result;
use crate::storage::{LocalStore, MemoryStore, Partitioner};
use crate::transport::{Mailbox, Transport};

/// One node's handle on the table: the client API plus the server task running behind it.
pub struct DhtNode<S: LocalStore = MemoryStore> {
    transport: Arc<dyn Transport>,
    partitioner: Partitioner,
    confirmation: Arc<PendingConfirmation>,
    /// Serializes client calls so at most one reply is outstanding per node.
    call_guard: Mutex<()>,
    server: JoinHandle<Result<S>>,
}

impl<S: LocalStore> DhtNode<S> {
    /// Starts this node's server over `store`. Every node of the cluster must call `init`.
    pub fn init(transport: Arc<dyn Transport>, store: S) -> Result<Self> {
        let partitioner = Partitioner::new(transport.node_count())?;
        let confirmation = Arc::new(PendingConfirmation::new());

        let server = Server::new(transport.clone(), store, confirmation.clone());
        let server = tokio::spawn(server.run());

        tracing::info!(
            "Node {} of {} initialized",
            transport.node_id(),
            transport.node_count()
        );

        Ok(Self {
            transport,
            partitioner,
            confirmation,
            call_guard: Mutex::new(()),
            server,
        })
    }

    pub fn id(&self) -> NodeId {
        self.transport.node_id()
    }

    pub fn node_count(&self) -> usize {
        self.transport.node_count()
    }

    pub fn owner(&self, key: &str) -> NodeId {
        self.partitioner.owner(key)
    }

    /// Stores `value` under `key` on its owner. Once this returns, every node reads the value.
    pub async fn put(&self, key: &str, value: i64) -> Result<()> {
        protocol::validate_key(key)?;
        let _guard = self.call_guard.lock().await;

        let owner = self.owner(key);
        tracing::debug!("Node {} put '{}' = {} on node {}", self.id(), key, value, owner);

        self.transport.send(owner, Message::put(key, value))?;
        self.confirmation.wait().await;
        Ok(())
    }

    /// Reads `key` from its owner. A key that was never put reads as `NOT_FOUND` (0).
    pub async fn get(&self, key: &str) -> Result<i64> {
        protocol::validate_key(key)?;
        let _guard = self.call_guard.lock().await;

        let owner = self.owner(key);
        self.transport.send(owner, Message::get(key))?;
        let reply = self
            .transport
            .recv_matching(Mailbox::Client, owner, MessageKind::ReturnValue)
            .await?;

        tracing::debug!("Node {} get '{}' = {} from node {}", self.id(), key, reply.value, owner);
        Ok(reply.value)
    }

    /// Number of distinct keys across the whole cluster.
    ///
    /// Needs the server of every node to be running; blocks forever otherwise.
    pub async fn size(&self) -> Result<u64> {
        let _guard = self.call_guard.lock().await;

        for node in NodeId::all(self.node_count()) {
            self.transport.send(node, Message::size_request())?;
        }
        let total = self
            .transport
            .recv_matching(Mailbox::Client, self.id(), MessageKind::SizeTotal)
            .await?;

        tracing::debug!("Node {} size = {}", self.id(), total.value);
        Ok(total.value.max(0) as u64)
    }

    /// Blocks until every node has called `sync`.
    pub async fn sync(&self) -> Result<()> {
        self.transport.barrier().await
    }

    /// Collective teardown: waits for every node, stops the server, closes the shard into
    /// `sink` and releases the transport.
    pub async fn destroy(self, sink: &mut (dyn Write + Send)) -> Result<()> {
        self.sync().await?;

        let id = self.id();
        self.transport.send(id, Message::destroy())?;
        let mut store = self.server.await??;

        store.close(sink)?;
        self.transport.shutdown().await?;

        tracing::info!("Node {} destroyed", id);
        Ok(())
    }
}
