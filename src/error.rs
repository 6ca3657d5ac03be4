//! Error types shared by the feed, its adapters and the content stores.

use thiserror::Error;
use uuid::Uuid;

pub use crate::storage::StorageError;

use crate::history::SeqNum;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Cannot resolve a page lookup for source '{source_kind}'")]
    PageLinkResolution { source_kind: String },

    #[error("Revision {seq} of source '{source_kind}' does not resolve to a page")]
    OrphanedRevision { source_kind: String, seq: SeqNum },

    #[error("Stale write to map data of page {page}: expected version {expected}, stored version is {found}")]
    ConcurrentWrite { page: Uuid, expected: u64, found: u64 },

    #[error("Source '{0}' is already registered")]
    DuplicateSource(String),

    #[error("Source '{source_kind}' yielded revision {seq} out of order")]
    UnorderedSource { source_kind: String, seq: SeqNum },

    #[error("Invalid feed cursor: {0}")]
    InvalidCursor(String),

    #[error("Invalid feed limit: {0}")]
    InvalidLimit(usize),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Source task failed: {0}")]
    TaskFailed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl FeedError {
    /// Errors that exclude one source from a single feed call instead of
    /// failing the whole call.
    pub fn is_source_failure(&self) -> bool {
        matches!(
            self,
            FeedError::PageLinkResolution { .. }
                | FeedError::OrphanedRevision { .. }
                | FeedError::UnorderedSource { .. }
        )
    }
}
