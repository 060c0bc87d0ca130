use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::frame::{Envelope, FRAME_SIZE, Payload};
use super::mesh::{Background, Link, MeshTransport, Router, endpoint};
use crate::cluster::config::{ClusterConfig, TransportSettings};
use crate::cluster::types::NodeId;
use crate::error::{DhtError, Result};

const ACCEPT_BACKOFF: std::time::Duration = std::time::Duration::from_millis(100);

impl MeshTransport {
    /// Binds this node's configured address and connects to every peer.
    pub async fn connect(config: &ClusterConfig, id: NodeId) -> Result<Self> {
        let addr = config.addr_of(id)?;
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Node {} listening on {}", id, addr);

        Self::with_listener(config, id, listener).await
    }

    /// Like `connect`, but accepts peers on an already bound listener.
    ///
    /// Returns once an outbound stream to every peer is open. Peers that are not up yet are
    /// retried until `transport.connect_timeout_ms` runs out.
    pub async fn with_listener(
        config: &ClusterConfig,
        id: NodeId,
        listener: TcpListener,
    ) -> Result<Self> {
        config.validate()?;
        config.addr_of(id)?;
        let count = config.node_count();

        let (router, inboxes) = endpoint(id);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let acceptor = tokio::spawn(accept_loop(
            listener,
            router.clone(),
            count,
            shutdown_rx.clone(),
        ));

        let mut links = Vec::with_capacity(count);
        let mut writers = Vec::with_capacity(count.saturating_sub(1));
        for peer in NodeId::all(count) {
            if peer == id {
                links.push(Link::Local(router.clone()));
                continue;
            }

            let addr = config.addr_of(peer)?;
            let stream = match open_stream(peer, addr, &config.transport).await {
                Ok(stream) => stream,
                Err(e) => {
                    acceptor.abort();
                    return Err(e);
                }
            };
            tracing::info!("Node {} connected to node {} at {}", id, peer, addr);

            let (tx, rx) = mpsc::unbounded_channel();
            tx.send(Envelope::new(id, Payload::Hello))
                .map_err(|_| DhtError::TransportClosed)?;
            writers.push((
                peer,
                tokio::spawn(write_loop(stream, peer, rx, shutdown_rx.clone())),
            ));
            links.push(Link::Remote(tx));
        }

        let background = Background {
            shutdown: Some(shutdown_tx),
            writers,
            acceptor: Some(acceptor),
        };
        Ok(MeshTransport::assemble(id, links, inboxes, background))
    }
}

async fn open_stream(
    peer: NodeId,
    addr: SocketAddr,
    settings: &TransportSettings,
) -> Result<TcpStream> {
    let deadline = Instant::now() + settings.connect_timeout();

    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) if Instant::now() < deadline => {
                tracing::debug!("Node {} at {} not reachable yet: {}", peer, addr, e);
                tokio::time::sleep(settings.retry_interval()).await;
            }
            Err(e) => {
                return Err(DhtError::Config(format!(
                    "node {} at {} unreachable after {:?}: {}",
                    peer,
                    addr,
                    settings.connect_timeout(),
                    e
                )));
            }
        }
    }
}

async fn write_frame(stream: &mut TcpStream, envelope: &Envelope) -> Result<()> {
    let frame = envelope.encode()?;
    stream.write_all(&frame).await?;
    Ok(())
}

/// Drains the outbound queue of one peer into its stream. On shutdown, whatever is already
/// queued is still written before the stream is closed.
async fn write_loop(
    mut stream: TcpStream,
    peer: NodeId,
    mut outbound: mpsc::UnboundedReceiver<Envelope>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            next = outbound.recv() => match next {
                Some(envelope) => {
                    if let Err(e) = write_frame(&mut stream, &envelope).await {
                        tracing::error!("Link to node {} failed: {}", peer, e);
                        return;
                    }
                }
                None => break,
            },
            _ = shutdown.changed() => {
                while let Ok(envelope) = outbound.try_recv() {
                    if let Err(e) = write_frame(&mut stream, &envelope).await {
                        tracing::error!("Link to node {} failed while flushing: {}", peer, e);
                        return;
                    }
                }
                break;
            }
        }
    }

    if let Err(e) = stream.shutdown().await {
        tracing::debug!("Closing link to node {}: {}", peer, e);
    }
    tracing::debug!("Link to node {} closed", peer);
}

async fn accept_loop(
    listener: TcpListener,
    router: Router,
    count: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut readers = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    readers.spawn(read_loop(stream, remote, router.clone(), count));
                }
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }

    readers.shutdown().await;
}

async fn read_hello(stream: &mut TcpStream, count: usize) -> Result<NodeId> {
    let mut frame = [0u8; FRAME_SIZE];
    stream.read_exact(&mut frame).await?;

    let envelope = Envelope::decode(&frame)?;
    if envelope.payload != Payload::Hello {
        return Err(DhtError::Decode("stream did not start with hello".to_string()));
    }
    if envelope.from.index() >= count {
        return Err(DhtError::UnknownNode(envelope.from));
    }
    Ok(envelope.from)
}

/// Feeds frames from one inbound stream into the local inboxes. Frames that fail to decode
/// are dropped; the stream stays aligned because every frame has the same size.
async fn read_loop(mut stream: TcpStream, remote: SocketAddr, router: Router, count: usize) {
    let peer = match read_hello(&mut stream, count).await {
        Ok(peer) => peer,
        Err(e) => {
            tracing::warn!("Rejected connection from {}: {}", remote, e);
            return;
        }
    };
    tracing::debug!("Inbound link from node {} ({})", peer, remote);

    let mut frame = [0u8; FRAME_SIZE];
    loop {
        if let Err(e) = stream.read_exact(&mut frame).await {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                tracing::debug!("Node {} closed its link", peer);
            } else {
                tracing::warn!("Link from node {} failed: {}", peer, e);
            }
            return;
        }

        match Envelope::decode(&frame) {
            Ok(envelope) if envelope.from != peer => {
                tracing::warn!(
                    "Dropping frame claiming node {} on the link from node {}",
                    envelope.from,
                    peer
                );
            }
            Ok(envelope) => {
                if router.deliver(envelope).is_err() {
                    tracing::debug!("Local endpoint gone, dropping link from node {}", peer);
                    return;
                }
            }
            Err(e) => tracing::warn!("Dropping malformed frame from node {}: {}", peer, e),
        }
    }
}
