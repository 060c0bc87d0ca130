//! Transport Module Tests
//!
//! Exercises both wirings of `MeshTransport`.
//!
//! ## Test Scopes
//! - **Delivery**: FIFO order per sender, mailbox routing by kind, selective receive.
//! - **Collectives**: Barrier and sum reduction over every node.
//! - **TCP**: The same guarantees over loopback sockets.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    use crate::cluster::config::ClusterConfig;
    use crate::cluster::types::NodeId;
    use crate::dht::protocol::{Message, MessageKind};
    use crate::error::DhtError;
    use crate::transport::frame::{Envelope, FRAME_SIZE, Payload};
    use crate::transport::{Mailbox, MeshTransport, Transport};

    fn local_cluster(count: usize) -> Vec<Arc<MeshTransport>> {
        MeshTransport::local_cluster(count)
            .unwrap()
            .into_iter()
            .map(Arc::new)
            .collect()
    }

    async fn tcp_cluster(count: usize) -> Vec<Arc<MeshTransport>> {
        let mut listeners = Vec::new();
        for _ in 0..count {
            listeners.push(TcpListener::bind("127.0.0.1:0").await.unwrap());
        }
        let addrs: Vec<_> = listeners
            .iter()
            .map(|l| l.local_addr().unwrap())
            .collect();
        let config = ClusterConfig::from_addrs(&addrs);

        let handles: Vec<_> = listeners
            .into_iter()
            .zip(NodeId::all(count))
            .map(|(listener, id)| {
                let config = config.clone();
                tokio::spawn(async move {
                    MeshTransport::with_listener(&config, id, listener).await
                })
            })
            .collect();

        let mut cluster = Vec::new();
        for handle in handles {
            cluster.push(Arc::new(handle.await.unwrap().unwrap()));
        }
        cluster
    }

    // ============================================================
    // LOCAL DELIVERY TESTS
    // ============================================================

    #[test]
    fn test_empty_cluster_is_rejected() {
        assert!(matches!(
            MeshTransport::local_cluster(0),
            Err(DhtError::InvalidNodeCount(0))
        ));
    }

    #[tokio::test]
    async fn test_ids_and_count() {
        let cluster = local_cluster(3);

        for (i, node) in cluster.iter().enumerate() {
            assert_eq!(node.node_id(), NodeId(i as u32));
            assert_eq!(node.node_count(), 3);
        }
    }

    #[tokio::test]
    async fn test_messages_from_one_sender_keep_order() {
        let cluster = local_cluster(2);

        for i in 0..50 {
            cluster[0].send(NodeId(1), Message::put("k", i)).unwrap();
        }

        for i in 0..50 {
            let incoming = cluster[1].recv(Mailbox::Server).await.unwrap();
            assert_eq!(incoming.from, NodeId(0));
            assert_eq!(incoming.message.value, i);
        }
    }

    #[tokio::test]
    async fn test_send_to_self() {
        let cluster = local_cluster(2);

        cluster[1].send(NodeId(1), Message::destroy()).unwrap();

        let incoming = cluster[1].recv(Mailbox::Server).await.unwrap();
        assert_eq!(incoming.from, NodeId(1));
        assert_eq!(incoming.message.kind, MessageKind::Destroy);
    }

    #[tokio::test]
    async fn test_replies_go_to_the_client_mailbox() {
        let cluster = local_cluster(2);

        cluster[0].send(NodeId(1), Message::return_value(5)).unwrap();
        cluster[0].send(NodeId(1), Message::get("x")).unwrap();

        let request = cluster[1].recv(Mailbox::Server).await.unwrap();
        assert_eq!(request.message.kind, MessageKind::Get);

        let reply = cluster[1].recv(Mailbox::Client).await.unwrap();
        assert_eq!(reply.message, Message::return_value(5));
    }

    #[tokio::test]
    async fn test_recv_matching_keeps_other_messages() {
        let cluster = local_cluster(3);

        cluster[1].send(NodeId(0), Message::return_value(1)).unwrap();
        cluster[2].send(NodeId(0), Message::return_value(2)).unwrap();
        cluster[1].send(NodeId(0), Message::size_total(3)).unwrap();

        let from_two = cluster[0]
            .recv_matching(Mailbox::Client, NodeId(2), MessageKind::ReturnValue)
            .await
            .unwrap();
        assert_eq!(from_two.value, 2);

        let total = cluster[0]
            .recv_matching(Mailbox::Client, NodeId(1), MessageKind::SizeTotal)
            .await
            .unwrap();
        assert_eq!(total.value, 3);

        // The skipped message is still there.
        let rest = cluster[0].recv(Mailbox::Client).await.unwrap();
        assert_eq!(rest.from, NodeId(1));
        assert_eq!(rest.message, Message::return_value(1));
    }

    #[tokio::test]
    async fn test_unknown_destination_is_rejected() {
        let cluster = local_cluster(2);

        assert!(matches!(
            cluster[0].send(NodeId(2), Message::confirm()),
            Err(DhtError::UnknownNode(NodeId(2)))
        ));
    }

    #[tokio::test]
    async fn test_oversized_key_is_rejected_at_send() {
        let cluster = local_cluster(1);

        assert!(matches!(
            cluster[0].send(NodeId(0), Message::put(&"k".repeat(64), 1)),
            Err(DhtError::KeyTooLong { .. })
        ));
    }

    // ============================================================
    // COLLECTIVE TESTS
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reduce_sum_reaches_root_only() {
        let cluster = local_cluster(4);

        let handles: Vec<_> = cluster
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, node)| {
                tokio::spawn(async move { node.reduce_sum(i as i64 * 10, NodeId(2)).await })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(results, vec![None, None, Some(60), None]);
    }

    #[tokio::test]
    async fn test_reduce_on_single_node() {
        let cluster = local_cluster(1);
        assert_eq!(cluster[0].reduce_sum(7, NodeId(0)).await.unwrap(), Some(7));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_barrier_waits_for_everyone() {
        let cluster = local_cluster(3);

        // Node 2 enters late; nobody may leave before it arrives.
        let early: Vec<_> = cluster[..2]
            .iter()
            .cloned()
            .map(|node| tokio::spawn(async move { node.barrier().await }))
            .collect();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(early.iter().all(|h| !h.is_finished()));

        cluster[2].barrier().await.unwrap();
        for handle in early {
            handle.await.unwrap().unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_repeated_barriers() {
        let cluster = local_cluster(4);

        let handles: Vec<_> = cluster
            .iter()
            .cloned()
            .map(|node| {
                tokio::spawn(async move {
                    for _ in 0..10 {
                        node.barrier().await?;
                    }
                    Ok::<_, DhtError>(())
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }

    // ============================================================
    // TCP TESTS
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_tcp_delivery_and_order() {
        let cluster = tcp_cluster(3).await;

        for i in 0..20 {
            cluster[2].send(NodeId(0), Message::put("item_1", i)).unwrap();
        }
        cluster[1].send(NodeId(0), Message::return_value(99)).unwrap();

        for i in 0..20 {
            let incoming = cluster[0].recv(Mailbox::Server).await.unwrap();
            assert_eq!(incoming.from, NodeId(2));
            assert_eq!(incoming.message, Message::put("item_1", i));
        }

        let reply = cluster[0]
            .recv_matching(Mailbox::Client, NodeId(1), MessageKind::ReturnValue)
            .await
            .unwrap();
        assert_eq!(reply.value, 99);

        for node in &cluster {
            node.shutdown().await.unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_tcp_collectives() {
        let cluster = tcp_cluster(3).await;

        let handles: Vec<_> = cluster
            .iter()
            .cloned()
            .map(|node| {
                tokio::spawn(async move {
                    node.barrier().await?;
                    let total = node.reduce_sum(node.node_id().0 as i64 + 1, NodeId(0)).await?;
                    node.barrier().await?;
                    node.shutdown().await?;
                    Ok::<_, DhtError>(total)
                })
            })
            .collect();

        let mut totals = Vec::new();
        for handle in handles {
            totals.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(totals, vec![Some(6), None, None]);
    }

    #[tokio::test]
    async fn test_tcp_unreachable_peer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let own = listener.local_addr().unwrap();

        // Reserve a port, then free it so nothing is listening there.
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = dead.local_addr().unwrap();
        drop(dead);

        let mut config = ClusterConfig::from_addrs(&[own, dead_addr]);
        config.transport.connect_timeout_ms = 200;
        config.transport.retry_interval_ms = 20;

        let result = MeshTransport::with_listener(&config, NodeId(0), listener).await;
        assert!(matches!(result, Err(DhtError::Config(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tcp_malformed_frame_is_dropped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let own = listener.local_addr().unwrap();
        // Stands in for node 1; the outbound link only needs a socket that accepts.
        let peer = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ClusterConfig::from_addrs(&[own, peer.local_addr().unwrap()]);

        let node = MeshTransport::with_listener(&config, NodeId(0), listener)
            .await
            .unwrap();

        let hello = Envelope::new(NodeId(1), Payload::Hello).encode().unwrap();
        let mut garbage = Envelope::new(NodeId(1), Payload::Message(Message::confirm()))
            .encode()
            .unwrap();
        garbage[4] = 99;
        let put = Envelope::new(NodeId(1), Payload::Message(Message::put("k", 3)))
            .encode()
            .unwrap();
        assert_eq!(garbage.len(), FRAME_SIZE);

        let mut stream = TcpStream::connect(own).await.unwrap();
        for frame in [&hello, &garbage, &put] {
            stream.write_all(frame).await.unwrap();
        }

        let incoming = tokio::time::timeout(Duration::from_secs(5), node.recv(Mailbox::Server))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(incoming.from, NodeId(1));
        assert_eq!(incoming.message, Message::put("k", 3));

        drop(stream);
        node.shutdown().await.unwrap();
    }
}
