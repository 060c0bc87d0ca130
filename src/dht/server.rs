use std::sync::Arc;

use super::confirm::PendingConfirmation;
use super::protocol::{Message, MessageKind, NOT_FOUND};
use crate::cluster::types::NodeId;
use crate::error::Result;
use crate::storage::LocalStore;
use crate::transport::{Incoming, Mailbox, Transport};

/// Background request loop of one node. Owns the node's shard until it stops.
pub struct Server<S: LocalStore> {
    transport: Arc<dyn Transport>,
    store: S,
    confirmation: Arc<PendingConfirmation>,
}

impl<S: LocalStore> Server<S> {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: S,
        confirmation: Arc<PendingConfirmation>,
    ) -> Self {
        Self {
            transport,
            store,
            confirmation,
        }
    }

    fn id(&self) -> NodeId {
        self.transport.node_id()
    }

    /// Serves requests until this node sends itself a `Destroy`, then hands the store back.
    pub async fn run(mut self) -> Result<S> {
        tracing::info!("Server of node {} listening", self.id());

        loop {
            let Incoming { from, message } = self.transport.recv(Mailbox::Server).await?;

            match self.handle_message(from, message).await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        "Node {} failed to handle message from node {}: {}",
                        self.id(),
                        from,
                        e
                    );
                }
            }
        }

        tracing::info!(
            "Server of node {} stopped with {} local entries",
            self.id(),
            self.store.size()
        );
        Ok(self.store)
    }

    /// Returns `true` once the loop must stop.
    async fn handle_message(&mut self, from: NodeId, message: Message) -> Result<bool> {
        match message.kind {
            MessageKind::Put => {
                tracing::debug!(
                    "Node {} storing '{}' = {} for node {}",
                    self.id(),
                    message.key,
                    message.value,
                    from
                );
                self.store.put(&message.key, message.value);
                self.transport.send(from, Message::confirm())?;
            }

            MessageKind::Get => {
                let value = self.store.get(&message.key).unwrap_or(NOT_FOUND);
                tracing::debug!(
                    "Node {} answering get '{}' = {} for node {}",
                    self.id(),
                    message.key,
                    value,
                    from
                );
                self.transport.send(from, Message::return_value(value))?;
            }

            MessageKind::SizeRequest => self.contribute_size(from).await?,

            MessageKind::Confirm => {
                tracing::trace!("Node {} got confirmation from node {}", self.id(), from);
                self.confirmation.signal().await;
            }

            MessageKind::Destroy if from == self.id() => {
                tracing::debug!("Node {} received its own destroy", self.id());
                return Ok(true);
            }

            MessageKind::Destroy => {
                tracing::warn!(
                    "Node {} ignoring destroy sent by node {}",
                    self.id(),
                    from
                );
            }

            MessageKind::ReturnValue | MessageKind::SizeTotal => {
                tracing::warn!(
                    "Node {} server dropping stray {:?} from node {}",
                    self.id(),
                    message.kind,
                    from
                );
            }
        }

        Ok(false)
    }

    /// Adds this shard's size to the reduction rooted at `root`.
    ///
    /// A non-root contribution returns immediately. On the root, collecting the other partials
    /// runs in its own task so the loop keeps serving the requests those partials depend on.
    async fn contribute_size(&mut self, root: NodeId) -> Result<()> {
        let local = self.store.size() as i64;
        tracing::debug!(
            "Node {} contributing size {} to node {}",
            self.id(),
            local,
            root
        );

        if root != self.id() {
            self.transport.reduce_sum(local, root).await?;
            return Ok(());
        }

        let transport = self.transport.clone();
        tokio::spawn(async move {
            let id = transport.node_id();
            let outcome = match transport.reduce_sum(local, id).await {
                Ok(Some(total)) => transport.send(id, Message::size_total(total)),
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                tracing::error!("Node {} failed to complete size reduction: {}", id, e);
            }
        });
        Ok(())
    }
}
