//! Feed configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::storage::StorageError;

/// Settings shared by the aggregator, the address builder and the binary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Page size used when a query carries no limit
    pub default_limit: usize,

    /// Upper bound for requested page sizes
    pub max_limit: usize,

    /// Mount point prepended to every generated address
    pub address_prefix: String,

    /// Query sources on the blocking pool instead of one after another
    pub parallel_fanout: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 500,
            address_prefix: String::new(),
            parallel_fanout: false,
        }
    }
}

impl FeedConfig {
    /// Load a configuration from a JSON file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, StorageError> {
        let data = std::fs::read(path)?;
        serde_json::from_slice(&data).map_err(|e| StorageError::SerializationError(e.to_string()))
    }
}
