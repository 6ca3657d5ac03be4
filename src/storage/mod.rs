//! Storage mechanisms for persisted content records
//!
//! Records are opaque byte blobs keyed by the owning page's id. The stores above
//! this layer decide what goes into the blob.

pub mod local;
pub mod memory;

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

pub use local::LocalStorage;
pub use memory::MemoryBackend;

/// Error types for storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Record not found: {0}")]
    NotFound(Uuid),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Trait for storage backends that can persist records
pub trait StorageBackend: Send + Sync {
    /// Store data under a key, replacing what was there
    fn store(&self, key: Uuid, data: &[u8]) -> Result<(), StorageError>;

    /// Load data for a key
    fn load(&self, key: Uuid) -> Result<Vec<u8>, StorageError>;

    /// Check if data exists for a key
    fn exists(&self, key: Uuid) -> bool;

    /// Delete data for a key
    fn delete(&self, key: Uuid) -> Result<(), StorageError>;
}

/// Configuration for the file system backend
#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Base directory for storage
    pub base_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./changefeed_data"),
        }
    }
}
