//! Historical revisions of versioned content
//!
//! Every save or delete of a versioned record produces an immutable
//! `Revision`: a snapshot of the record plus the page it belonged to at the
//! time. Stores hand revisions out most-recent-first; ties on the version date
//! are broken by the store-assigned sequence number, later insertions first.

mod memory;

pub use memory::InMemoryHistory;

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pages::Page;
use crate::storage::StorageError;

/// Sequence number assigned by a history store, strictly increasing per store
pub type SeqNum = u64;

/// What kind of change produced a revision
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionKind {
    Added,
    Updated,
    Deleted,
}

/// An immutable snapshot of one content instance at one point in time
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    /// Store-assigned ordinal, stable across queries
    pub seq: SeqNum,

    /// When the change happened
    pub version_date: DateTime<Utc>,

    pub kind: RevisionKind,

    /// Identity of the content instance this revision snapshots
    pub object_id: String,

    /// The owning page as it was when the revision was taken
    pub page: Option<Page>,

    /// Serialized state of the instance
    pub snapshot: serde_json::Value,
}

impl Revision {
    /// Read a top-level attribute of the snapshot
    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.snapshot.get(name)
    }

    /// Evaluate a page-lookup path such as `slug` or `page__slug` against this
    /// revision. `page__` paths walk into the owning page; anything else reads
    /// a string attribute of the snapshot.
    pub fn lookup(&self, path: &str) -> Option<String> {
        match path.split_once("__") {
            Some(("page", rest)) => self.page.as_ref().and_then(|page| page.lookup(rest)),
            Some(_) => None,
            None => self
                .attribute(path)
                .and_then(|value| value.as_str())
                .map(str::to_string),
        }
    }

    /// Most-recent-first ordering used by every history store
    pub fn recency_cmp(&self, other: &Revision) -> Ordering {
        other
            .version_date
            .cmp(&self.version_date)
            .then(other.seq.cmp(&self.seq))
    }
}

/// Query contract of a revision store
pub trait HistoryStore: Send + Sync {
    /// Append a revision for `object_id`
    fn record(
        &self,
        object_id: &str,
        kind: RevisionKind,
        page: Option<Page>,
        snapshot: serde_json::Value,
        date: DateTime<Utc>,
    ) -> Result<Revision, StorageError>;

    /// All revisions most-recent-first, restricted to `version_date <= start_at`
    /// when a bound is given. Repeated calls with the same bound return the
    /// same sequence.
    fn revisions(&self, start_at: Option<DateTime<Utc>>) -> Result<Vec<Revision>, StorageError>;

    /// Revisions of a single instance, most-recent-first
    fn history_of(&self, object_id: &str) -> Result<Vec<Revision>, StorageError> {
        Ok(self
            .revisions(None)?
            .into_iter()
            .filter(|rev| rev.object_id == object_id)
            .collect())
    }

    /// The revision of `object_id` that was current at `date`
    fn as_of(&self, object_id: &str, date: DateTime<Utc>) -> Result<Option<Revision>, StorageError> {
        Ok(self
            .history_of(object_id)?
            .into_iter()
            .find(|rev| rev.version_date <= date))
    }
}
