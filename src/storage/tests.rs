//! Storage Module Tests
//!
//! Validates key placement and the local shard mechanics.
//!
//! ## Test Scopes
//! - **Partitioner**: Ensures deterministic hashing and a fair spread of keys over nodes.
//! - **MemoryStore**: Verifies local Put/Get/Size and the dump written on close.
//!
//! *Note: Cross-node behaviour (routing, confirmation, size reduction) is tested in `dht`.*

#[cfg(test)]
mod tests {
    use crate::cluster::types::NodeId;
    use crate::error::DhtError;
    use crate::storage::local::{LocalStore, MemoryStore};
    use crate::storage::partitioner::Partitioner;

    // ============================================================
    // PARTITIONER TESTS
    // ============================================================

    #[test]
    fn test_zero_nodes_is_rejected() {
        assert!(matches!(
            Partitioner::new(0),
            Err(DhtError::InvalidNodeCount(0))
        ));
    }

    #[test]
    fn test_owner_is_within_range() {
        let partitioner = Partitioner::new(7).unwrap();

        for i in 0..1000 {
            let key = format!("test_key_{}", i);
            let owner = partitioner.owner(&key);
            assert!(
                owner.index() < 7,
                "Owner {} should be < {}",
                owner,
                partitioner.node_count()
            );
        }
    }

    #[test]
    fn test_owner_same_on_every_node() {
        // Each node builds its own partitioner; they must agree on every key.
        let views: Vec<Partitioner> = (0..4).map(|_| Partitioner::new(4).unwrap()).collect();

        for i in 0..500 {
            let key = format!("item_{}", i);
            let expected = views[0].owner(&key);
            for view in &views[1..] {
                assert_eq!(view.owner(&key), expected);
            }
        }
    }

    #[test]
    fn test_owner_distribution() {
        let partitioner = Partitioner::new(8).unwrap();
        let mut counts = std::collections::HashMap::new();

        for i in 0..10000 {
            let key = format!("item_{}", i);
            *counts.entry(partitioner.owner(&key)).or_insert(0) += 1;
        }

        // Every node should receive keys.
        assert_eq!(counts.len(), 8, "All 8 nodes should own some keys");
    }

    #[test]
    fn test_single_letter_keys_on_four_nodes() {
        let partitioner = Partitioner::new(4).unwrap();

        assert_eq!(partitioner.owner("a"), NodeId(2));
        assert_eq!(partitioner.owner("b"), NodeId(3));
        assert_eq!(partitioner.owner("c"), NodeId(0));
        assert_eq!(partitioner.owner("d"), NodeId(1));
    }

    #[test]
    fn test_empty_key_has_an_owner() {
        let partitioner = Partitioner::new(4).unwrap();
        assert_eq!(partitioner.owner(""), NodeId(5381 % 4));
    }

    #[test]
    fn test_single_node_owns_everything() {
        let partitioner = Partitioner::new(1).unwrap();
        for key in ["", "a", "zzz", "item_42"] {
            assert_eq!(partitioner.owner(key), NodeId(0));
        }
    }

    // ============================================================
    // MEMORY STORE TESTS
    // ============================================================

    #[test]
    fn test_memory_store_put_and_get() {
        let mut store = MemoryStore::init();

        store.put("item_1", 10);

        assert_eq!(store.get("item_1"), Some(10));
        assert_eq!(store.get("item_2"), None);
    }

    #[test]
    fn test_memory_store_overwrite_keeps_size() {
        let mut store = MemoryStore::init();

        store.put("k", 1);
        store.put("k", 2);

        assert_eq!(store.get("k"), Some(2));
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn test_memory_store_size_counts_distinct_keys() {
        let mut store = MemoryStore::init();
        for i in 0..25 {
            store.put(&format!("key_{}", i), i);
        }

        assert_eq!(store.size(), 25);
    }

    #[test]
    fn test_memory_store_close_dumps_sorted_and_clears() {
        let mut store = MemoryStore::init();
        store.put("b", 2);
        store.put("a", 1);
        store.put("", -5);

        let mut sink = Vec::new();
        store.close(&mut sink).unwrap();

        assert_eq!(String::from_utf8(sink).unwrap(), "\t-5\na\t1\nb\t2\n");
        assert_eq!(store.size(), 0);
    }
}
