use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

use super::frame::{Envelope, Payload, SignalKind};
use super::{Incoming, Mailbox, Transport};
use crate::cluster::types::NodeId;
use crate::dht::protocol::{self, Message, MessageKind};
use crate::error::{DhtError, Result};

/// Collective traffic as seen by the receiving node.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Signal {
    pub from: NodeId,
    pub kind: SignalKind,
    pub value: i64,
}

/// Delivery side of one node: sorts envelopes into that node's inboxes.
#[derive(Clone)]
pub(crate) struct Router {
    node: NodeId,
    server: mpsc::UnboundedSender<Incoming>,
    client: mpsc::UnboundedSender<Incoming>,
    barrier: mpsc::UnboundedSender<Signal>,
    reduce: mpsc::UnboundedSender<Signal>,
}

impl Router {
    pub(crate) fn deliver(&self, envelope: Envelope) -> Result<()> {
        let from = envelope.from;

        let delivered = match envelope.payload {
            Payload::Message(message) => {
                let inbox = match Mailbox::for_kind(message.kind) {
                    Mailbox::Server => &self.server,
                    Mailbox::Client => &self.client,
                };
                inbox.send(Incoming { from, message }).is_ok()
            }
            Payload::Signal(kind, value) => {
                let signal = Signal { from, kind, value };
                match kind {
                    SignalKind::BarrierArrive | SignalKind::BarrierRelease => {
                        self.barrier.send(signal).is_ok()
                    }
                    SignalKind::Partial => self.reduce.send(signal).is_ok(),
                }
            }
            Payload::Hello => {
                tracing::warn!(
                    "Node {} ignoring unexpected hello from node {}",
                    self.node,
                    from
                );
                true
            }
        };

        if delivered {
            Ok(())
        } else {
            Err(DhtError::TransportClosed)
        }
    }
}

struct Queue<T> {
    rx: mpsc::UnboundedReceiver<T>,
    stash: VecDeque<T>,
}

/// Receive side of one delivery channel, with a stash for out-of-order selective receives.
pub(crate) struct Inbox<T> {
    queue: Mutex<Queue<T>>,
}

impl<T> Inbox<T> {
    fn new(rx: mpsc::UnboundedReceiver<T>) -> Self {
        Self {
            queue: Mutex::new(Queue {
                rx,
                stash: VecDeque::new(),
            }),
        }
    }

    async fn next(&self) -> Result<T> {
        let mut queue = self.queue.lock().await;
        if let Some(item) = queue.stash.pop_front() {
            return Ok(item);
        }
        queue.rx.recv().await.ok_or(DhtError::TransportClosed)
    }

    async fn next_matching(&self, accept: impl Fn(&T) -> bool + Send) -> Result<T> {
        let mut queue = self.queue.lock().await;

        let stashed = queue.stash.iter().position(|item| accept(item));
        if let Some(item) = stashed.and_then(|pos| queue.stash.remove(pos)) {
            return Ok(item);
        }

        loop {
            let item = queue.rx.recv().await.ok_or(DhtError::TransportClosed)?;
            if accept(&item) {
                return Ok(item);
            }
            queue.stash.push_back(item);
        }
    }
}

/// Receive side of one node.
pub(crate) struct Inboxes {
    server: Inbox<Incoming>,
    client: Inbox<Incoming>,
    barrier: Inbox<Signal>,
    reduce: Inbox<Signal>,
}

/// Creates the delivery and receive halves of one node's endpoint.
pub(crate) fn endpoint(node: NodeId) -> (Router, Inboxes) {
    let (server_tx, server_rx) = mpsc::unbounded_channel();
    let (client_tx, client_rx) = mpsc::unbounded_channel();
    let (barrier_tx, barrier_rx) = mpsc::unbounded_channel();
    let (reduce_tx, reduce_rx) = mpsc::unbounded_channel();

    let router = Router {
        node,
        server: server_tx,
        client: client_tx,
        barrier: barrier_tx,
        reduce: reduce_tx,
    };
    let inboxes = Inboxes {
        server: Inbox::new(server_rx),
        client: Inbox::new(client_rx),
        barrier: Inbox::new(barrier_rx),
        reduce: Inbox::new(reduce_rx),
    };

    (router, inboxes)
}

/// Where envelopes for one destination go.
pub(crate) enum Link {
    /// Same process: straight into the destination's inboxes.
    Local(Router),
    /// Another process: queued for the writer task of the outbound stream.
    Remote(mpsc::UnboundedSender<Envelope>),
}

/// Tasks owned by a TCP endpoint.
#[derive(Default)]
pub(crate) struct Background {
    pub shutdown: Option<watch::Sender<bool>>,
    pub writers: Vec<(NodeId, JoinHandle<()>)>,
    pub acceptor: Option<JoinHandle<()>>,
}

/// Channel-based transport endpoint, wired either in-process or over TCP.
pub struct MeshTransport {
    id: NodeId,
    links: Vec<Link>,
    inboxes: Inboxes,
    barrier_epoch: AtomicU64,
    background: Mutex<Background>,
}

impl MeshTransport {
    pub(crate) fn assemble(
        id: NodeId,
        links: Vec<Link>,
        inboxes: Inboxes,
        background: Background,
    ) -> Self {
        Self {
            id,
            links,
            inboxes,
            barrier_epoch: AtomicU64::new(0),
            background: Mutex::new(background),
        }
    }

    /// Builds a complete cluster of `count` endpoints that talk through in-process channels.
    /// Endpoint `i` has id `i`.
    pub fn local_cluster(count: usize) -> Result<Vec<MeshTransport>> {
        if count == 0 {
            return Err(DhtError::InvalidNodeCount(0));
        }

        let (routers, inboxes): (Vec<Router>, Vec<Inboxes>) =
            NodeId::all(count).map(endpoint).unzip();

        let cluster = NodeId::all(count)
            .zip(inboxes)
            .map(|(id, inboxes)| {
                let links = routers.iter().cloned().map(Link::Local).collect();
                MeshTransport::assemble(id, links, inboxes, Background::default())
            })
            .collect();

        tracing::info!("Built in-process cluster of {} nodes", count);
        Ok(cluster)
    }

    fn deliver(&self, dest: NodeId, payload: Payload) -> Result<()> {
        let link = self
            .links
            .get(dest.index())
            .ok_or(DhtError::UnknownNode(dest))?;
        let envelope = Envelope::new(self.id, payload);

        match link {
            Link::Local(router) => router.deliver(envelope),
            Link::Remote(writer) => writer
                .send(envelope)
                .map_err(|_| DhtError::TransportClosed),
        }
    }

    fn signal(&self, dest: NodeId, kind: SignalKind, value: i64) -> Result<()> {
        self.deliver(dest, Payload::Signal(kind, value))
    }

    fn inbox(&self, mailbox: Mailbox) -> &Inbox<Incoming> {
        match mailbox {
            Mailbox::Server => &self.inboxes.server,
            Mailbox::Client => &self.inboxes.client,
        }
    }

    fn peers(&self) -> impl Iterator<Item = NodeId> + '_ {
        NodeId::all(self.links.len()).filter(move |peer| *peer != self.id)
    }
}

#[async_trait]
impl Transport for MeshTransport {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn node_count(&self) -> usize {
        self.links.len()
    }

    fn send(&self, dest: NodeId, message: Message) -> Result<()> {
        protocol::validate_key(&message.key)?;
        tracing::trace!(
            "Node {} -> node {}: {:?} '{}'",
            self.id,
            dest,
            message.kind,
            message.key
        );
        self.deliver(dest, Payload::Message(message))
    }

    async fn recv(&self, mailbox: Mailbox) -> Result<Incoming> {
        self.inbox(mailbox).next().await
    }

    async fn recv_matching(
        &self,
        mailbox: Mailbox,
        source: NodeId,
        kind: MessageKind,
    ) -> Result<Message> {
        let incoming = self
            .inbox(mailbox)
            .next_matching(|incoming| incoming.from == source && incoming.message.kind == kind)
            .await?;
        Ok(incoming.message)
    }

    async fn reduce_sum(&self, local: i64, root: NodeId) -> Result<Option<i64>> {
        if root.index() >= self.links.len() {
            return Err(DhtError::UnknownNode(root));
        }

        if root != self.id {
            self.signal(root, SignalKind::Partial, local)?;
            return Ok(None);
        }

        let mut total = local;
        for _ in self.peers() {
            let partial = self.inboxes.reduce.next().await?;
            tracing::trace!(
                "Node {} got partial {} from node {}",
                self.id,
                partial.value,
                partial.from
            );
            total += partial.value;
        }
        Ok(Some(total))
    }

    async fn barrier(&self) -> Result<()> {
        let epoch = self.barrier_epoch.fetch_add(1, Ordering::SeqCst) as i64;

        if self.id == NodeId::COORDINATOR {
            for _ in self.peers() {
                self.inboxes
                    .barrier
                    .next_matching(|s| s.kind == SignalKind::BarrierArrive && s.value == epoch)
                    .await?;
            }
            for peer in self.peers() {
                self.signal(peer, SignalKind::BarrierRelease, epoch)?;
            }
        } else {
            self.signal(NodeId::COORDINATOR, SignalKind::BarrierArrive, epoch)?;
            self.inboxes
                .barrier
                .next_matching(|s| s.kind == SignalKind::BarrierRelease && s.value == epoch)
                .await?;
        }

        tracing::debug!("Node {} passed barrier {}", self.id, epoch);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        let mut background = self.background.lock().await;

        if let Some(signal) = background.shutdown.take() {
            let _ = signal.send(true);
        }

        for (peer, writer) in background.writers.drain(..) {
            if let Err(e) = writer.await {
                tracing::warn!("Writer to node {} ended abnormally: {}", peer, e);
            }
        }

        if let Some(acceptor) = background.acceptor.take()
            && let Err(e) = acceptor.await
        {
            tracing::warn!("Acceptor of node {} ended abnormally: {}", self.id, e);
        }

        tracing::info!("Node {} transport shut down", self.id);
        Ok(())
    }
}
