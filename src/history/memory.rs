use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::{HistoryStore, Revision, RevisionKind, SeqNum};
use crate::pages::Page;
use crate::storage::StorageError;

/// Revision store kept in process memory.
pub struct InMemoryHistory {
    revisions: RwLock<Vec<Revision>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self {
            revisions: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.revisions.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> StorageError {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::Other,
            "history lock poisoned",
        ))
    }
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore for InMemoryHistory {
    fn record(
        &self,
        object_id: &str,
        kind: RevisionKind,
        page: Option<Page>,
        snapshot: serde_json::Value,
        date: DateTime<Utc>,
    ) -> Result<Revision, StorageError> {
        let mut revisions = self.revisions.write().map_err(|_| Self::poisoned())?;
        // Allocated under the write lock so seq order matches insertion order
        let seq: SeqNum = revisions.len() as SeqNum + 1;
        let revision = Revision {
            seq,
            version_date: date,
            kind,
            object_id: object_id.to_string(),
            page,
            snapshot,
        };
        revisions.push(revision.clone());
        Ok(revision)
    }

    fn revisions(&self, start_at: Option<DateTime<Utc>>) -> Result<Vec<Revision>, StorageError> {
        let revisions = self.revisions.read().map_err(|_| Self::poisoned())?;
        let mut selected: Vec<Revision> = revisions
            .iter()
            .filter(|rev| start_at.map_or(true, |bound| rev.version_date <= bound))
            .cloned()
            .collect();
        selected.sort_by(Revision::recency_cmp);
        Ok(selected)
    }
}
