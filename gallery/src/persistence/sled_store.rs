use crate::ports::SnapshotStorage;
use shared::{Error, Result};
use std::path::Path;

/// Sled-backed snapshot storage. One record per storage key.
pub struct SledStorage {
    db: sled::Db,
}

impl SledStorage {
    /// Open (or create) the database, creating its parent directory first.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create directory: {}", e)))?;
        }

        let db = sled::open(path)
            .map_err(|e| Error::Storage(format!("Failed to open Sled database: {}", e)))?;

        Ok(Self { db })
    }

    fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| Error::Storage(format!("Failed to flush database: {}", e)))?;
        Ok(())
    }
}

impl SnapshotStorage for SledStorage {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .db
            .get(key.as_bytes())
            .map_err(|e| Error::Storage(format!("Failed to read {}: {}", key, e)))?;
        Ok(value.map(|bytes| bytes.to_vec()))
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.db
            .insert(key.as_bytes(), bytes)
            .map_err(|e| Error::Storage(format!("Failed to write {}: {}", key, e)))?;
        self.flush()
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.db
            .remove(key.as_bytes())
            .map_err(|e| Error::Storage(format!("Failed to remove {}: {}", key, e)))?;
        self.flush()
    }
}
