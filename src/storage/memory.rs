//! In-memory storage backend, used by tests and short-lived processes.

use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use super::{StorageBackend, StorageError};

#[derive(Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<Uuid, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StorageError {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::Other,
            "memory backend lock poisoned",
        ))
    }
}

impl StorageBackend for MemoryBackend {
    fn store(&self, key: Uuid, data: &[u8]) -> Result<(), StorageError> {
        self.records
            .write()
            .map_err(|_| Self::poisoned())?
            .insert(key, data.to_vec());
        Ok(())
    }

    fn load(&self, key: Uuid) -> Result<Vec<u8>, StorageError> {
        self.records
            .read()
            .map_err(|_| Self::poisoned())?
            .get(&key)
            .cloned()
            .ok_or(StorageError::NotFound(key))
    }

    fn exists(&self, key: Uuid) -> bool {
        self.records
            .read()
            .map(|records| records.contains_key(&key))
            .unwrap_or(false)
    }

    fn delete(&self, key: Uuid) -> Result<(), StorageError> {
        self.records
            .write()
            .map_err(|_| Self::poisoned())?
            .remove(&key)
            .map(|_| ())
            .ok_or(StorageError::NotFound(key))
    }
}
