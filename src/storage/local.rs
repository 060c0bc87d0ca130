use std::collections::BTreeMap;
use std::io::Write;

/// One node's shard of the table.
///
/// A store is owned by value by its node's server task and is never shared, so implementations
/// need no internal locking.
pub trait LocalStore: Send + 'static {
    fn put(&mut self, key: &str, value: i64);

    fn get(&self, key: &str) -> Option<i64>;

    /// Number of distinct keys held by this shard.
    fn size(&self) -> usize;

    /// Writes a final dump of the shard into `sink` and releases its contents.
    fn close(&mut self, sink: &mut dyn Write) -> std::io::Result<()>;
}

/// In-memory shard, dumped in key order on close.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, i64>,
}

impl MemoryStore {
    pub fn init() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn put(&mut self, key: &str, value: i64) {
        self.entries.insert(key.to_string(), value);
    }

    fn get(&self, key: &str) -> Option<i64> {
        self.entries.get(key).copied()
    }

    fn size(&self) -> usize {
        self.entries.len()
    }

    fn close(&mut self, sink: &mut dyn Write) -> std::io::Result<()> {
        for (key, value) in &self.entries {
            writeln!(sink, "{key}\t{value}")?;
        }
        sink.flush()?;

        tracing::debug!("Closed local store with {} entries", self.entries.len());
        self.entries.clear();
        Ok(())
    }
}
