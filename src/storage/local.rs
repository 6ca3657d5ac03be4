//! Local file system storage backend
//!
//! Each record lives in `<base>/<first two chars of key>/<key>.json`.

use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::{StorageBackend, StorageConfig, StorageError};

/// A storage backend that uses the local file system
pub struct LocalStorage {
    /// Base directory for storage
    base_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend, creating the base directory if needed
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        let base_dir = config.base_dir;

        if !base_dir.exists() {
            fs::create_dir_all(&base_dir)?;
        }

        Ok(Self { base_dir })
    }

    /// Get the path for a specific key
    fn get_path(&self, key: Uuid) -> PathBuf {
        let key_str = key.to_string();
        let prefix = &key_str[0..2];

        self.base_dir.join(prefix).join(format!("{}.json", key_str))
    }

    /// Ensure the directory for a path exists
    fn ensure_dir(&self, path: &Path) -> Result<(), StorageError> {
        let parent = path.parent().ok_or_else(|| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "Invalid path",
            ))
        })?;

        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }

        Ok(())
    }
}

impl StorageBackend for LocalStorage {
    fn store(&self, key: Uuid, data: &[u8]) -> Result<(), StorageError> {
        let path = self.get_path(key);
        self.ensure_dir(&path)?;

        // Write next to the target and rename so readers never see a torn record
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load(&self, key: Uuid) -> Result<Vec<u8>, StorageError> {
        let path = self.get_path(key);
        if !path.exists() {
            return Err(StorageError::NotFound(key));
        }
        Ok(fs::read(path)?)
    }

    fn exists(&self, key: Uuid) -> bool {
        self.get_path(key).exists()
    }

    fn delete(&self, key: Uuid) -> Result<(), StorageError> {
        let path = self.get_path(key);
        if !path.exists() {
            return Err(StorageError::NotFound(key));
        }
        fs::remove_file(path)?;
        Ok(())
    }
}
