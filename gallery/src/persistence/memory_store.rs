use crate::ports::SnapshotStorage;
use parking_lot::RwLock;
use shared::Result;
use std::collections::HashMap;

/// Process-local storage. Used when the durable store cannot be opened and
/// in tests.
#[derive(Default)]
pub struct MemoryStorage {
    records: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.records.read().get(key).cloned())
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.records.write().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.records.write().remove(key);
        Ok(())
    }
}
