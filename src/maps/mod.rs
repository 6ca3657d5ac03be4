//! Map data attached to pages
//!
//! A page owns at most one `GeometryRecord`. The record stores points, lines
//! and polygons; the combined geometry is derived on read and its length is
//! recomputed by `MapStore` on every save, never set by callers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FeedError;
use crate::feed::links::LinkBuilder;
use crate::geometry::{GeometryCollection, Length, MultiLineString, MultiPoint, MultiPolygon};
use crate::history::{HistoryStore, Revision, RevisionKind};
use crate::pages::{Page, PageOwned};
use crate::storage::{StorageBackend, StorageError};

/// Address namespace of map content
pub const MAP_NAMESPACE: &str = "map";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeometryRecord {
    pub page: Page,
    pub points: Option<MultiPoint>,
    pub lines: Option<MultiLineString>,
    pub polys: Option<MultiPolygon>,
    length: Option<f64>,
    version: u64,
}

impl GeometryRecord {
    /// An unsaved, empty record for `page`
    pub fn new(page: Page) -> Self {
        Self {
            page,
            points: None,
            lines: None,
            polys: None,
            length: None,
            version: 0,
        }
    }

    pub fn with_points(mut self, points: MultiPoint) -> Self {
        self.points = Some(points);
        self
    }

    pub fn with_lines(mut self, lines: MultiLineString) -> Self {
        self.lines = Some(lines);
        self
    }

    pub fn with_polys(mut self, polys: MultiPolygon) -> Self {
        self.polys = Some(polys);
        self
    }

    /// All members of points, lines and polys as one collection
    pub fn geom(&self) -> GeometryCollection {
        GeometryCollection::flatten(self.points.as_ref(), self.lines.as_ref(), self.polys.as_ref())
    }

    /// Length as of the last save; `None` for a record never saved
    pub fn length(&self) -> Option<f64> {
        self.length
    }

    /// Number of saves this record has seen
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether a record for this record's page is persisted in `store`
    pub fn exists(&self, store: &MapStore) -> bool {
        store.exists(&self.page)
    }

    /// Canonical display address of this record
    pub fn address(&self, links: &LinkBuilder) -> String {
        links.page_address(MAP_NAMESPACE, &self.page)
    }
}

/// Persistent store of geometry records, one per page.
///
/// Saves to the same page are serialized through a per-page lock, and a save
/// carrying a stale version is refused, so a stored length always belongs to
/// the stored geometry. With `owned_by`, a save for a page that no longer
/// exists is refused too.
pub struct MapStore {
    backend: Arc<dyn StorageBackend>,
    history: Arc<dyn HistoryStore>,
    pages: Option<Arc<dyn StorageBackend>>,
    page_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl MapStore {
    pub fn new(backend: Arc<dyn StorageBackend>, history: Arc<dyn HistoryStore>) -> Self {
        Self {
            backend,
            history,
            pages: None,
            page_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Only accept saves for pages persisted in `pages`
    pub fn owned_by(mut self, pages: Arc<dyn StorageBackend>) -> Self {
        self.pages = Some(pages);
        self
    }

    pub fn history(&self) -> Arc<dyn HistoryStore> {
        Arc::clone(&self.history)
    }

    /// True iff a record for `page` is persisted
    pub fn exists(&self, page: &Page) -> bool {
        self.backend.exists(page.id)
    }

    pub fn get(&self, page: &Page) -> Result<Option<GeometryRecord>, FeedError> {
        if !self.backend.exists(page.id) {
            return Ok(None);
        }
        self.load(page.id).map(Some)
    }

    pub fn save(&self, record: &mut GeometryRecord) -> Result<Revision, FeedError> {
        self.save_at(record, Utc::now())
    }

    /// Recompute the length, persist the record and record a revision dated
    /// `date`. On success `record` carries the new length and version; on
    /// failure it is left untouched.
    pub fn save_at(&self, record: &mut GeometryRecord, date: DateTime<Utc>) -> Result<Revision, FeedError> {
        let id = record.page.id;
        let lock = self.page_lock(id)?;
        let result = match lock.lock() {
            Ok(_guard) => self.save_locked(record, date),
            Err(_) => Err(poisoned("map page lock")),
        };
        self.release_lock(id, lock);
        result
    }

    fn save_locked(&self, record: &mut GeometryRecord, date: DateTime<Utc>) -> Result<Revision, FeedError> {
        if let Some(pages) = &self.pages {
            if !pages.exists(record.page.id) {
                log::warn!("Refusing map save for missing page '{}'", record.page.slug);
                return Err(FeedError::NotFound(format!("page {}", record.page.id)));
            }
        }

        let stored_version = if self.backend.exists(record.page.id) {
            self.load(record.page.id)?.version
        } else {
            0
        };
        if stored_version != record.version {
            log::warn!(
                "Refusing stale map save for page '{}': have version {}, stored {}",
                record.page.slug,
                record.version,
                stored_version
            );
            return Err(FeedError::ConcurrentWrite {
                page: record.page.id,
                expected: record.version,
                found: stored_version,
            });
        }

        let mut next = record.clone();
        next.length = Some(next.geom().length());
        next.version = stored_version + 1;

        let snapshot = serde_json::to_value(&next)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        let data = serde_json::to_vec(&snapshot)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        self.backend.store(next.page.id, &data)?;

        let kind = if stored_version == 0 {
            RevisionKind::Added
        } else {
            RevisionKind::Updated
        };
        let revision = self.history.record(
            &next.page.id.to_string(),
            kind,
            Some(next.page.clone()),
            snapshot,
            date,
        )?;

        *record = next;
        Ok(revision)
    }

    fn delete_locked(&self, page: &Page, date: DateTime<Utc>) -> Result<(), FeedError> {
        if !self.backend.exists(page.id) {
            return Ok(());
        }
        let record = self.load(page.id)?;
        self.backend.delete(page.id)?;

        let snapshot = serde_json::to_value(&record)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        self.history.record(
            &page.id.to_string(),
            RevisionKind::Deleted,
            Some(page.clone()),
            snapshot,
            date,
        )?;
        Ok(())
    }

    fn load(&self, id: Uuid) -> Result<GeometryRecord, FeedError> {
        let data = self.backend.load(id)?;
        serde_json::from_slice(&data)
            .map_err(|e| FeedError::Storage(StorageError::SerializationError(e.to_string())))
    }

    fn page_lock(&self, id: Uuid) -> Result<Arc<Mutex<()>>, FeedError> {
        let mut locks = self.page_locks.lock().map_err(|_| poisoned("map lock table"))?;
        Ok(Arc::clone(locks.entry(id).or_default()))
    }

    /// Hand back a page lock, dropping the table entry once nobody else holds it.
    /// Clones are only taken under the table lock, so a count of one is final.
    fn release_lock(&self, id: Uuid, lock: Arc<Mutex<()>>) {
        let Ok(mut locks) = self.page_locks.lock() else {
            return;
        };
        drop(lock);
        if locks.get(&id).map_or(false, |entry| Arc::strong_count(entry) == 1) {
            locks.remove(&id);
        }
    }
}

impl PageOwned for MapStore {
    fn delete_for_page(&self, page: &Page, date: DateTime<Utc>) -> Result<(), FeedError> {
        let lock = self.page_lock(page.id)?;
        let result = match lock.lock() {
            Ok(_guard) => self.delete_locked(page, date),
            Err(_) => Err(poisoned("map page lock")),
        };
        self.release_lock(page.id, lock);
        result
    }
}

fn poisoned(what: &str) -> FeedError {
    FeedError::Storage(StorageError::IoError(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("{} poisoned", what),
    )))
}
