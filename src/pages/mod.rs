//! Pages and regions
//!
//! A page is the addressable unit every feed entry resolves to. Pages live in
//! a region; their slug is derived from the display name. Content kinds that
//! belong to a page (map data, for instance) register as `PageOwned` with the
//! `PageStore` so they are removed along with their page.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FeedError;
use crate::history::{HistoryStore, Revision, RevisionKind};
use crate::storage::{StorageBackend, StorageError};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub slug: String,
    pub full_name: String,
}

impl Region {
    pub fn new(slug: impl Into<String>) -> Self {
        let slug = slug.into();
        Self {
            full_name: slug.clone(),
            slug,
        }
    }

    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = full_name.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub region: Region,
    #[serde(default)]
    pub content: String,
}

/// Canonical slug for a page name: lower-cased, underscores read as spaces,
/// runs of whitespace collapsed.
pub fn slugify(name: &str) -> String {
    name.replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl Page {
    pub fn new(name: impl Into<String>, region: Region) -> Self {
        let name = name.into();
        Self {
            id: Uuid::new_v4(),
            slug: slugify(&name),
            name,
            region,
            content: String::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Display form of the slug used in addresses: the name with spaces
    /// turned into underscores.
    pub fn pretty_slug(&self) -> String {
        self.name.split_whitespace().collect::<Vec<_>>().join("_")
    }

    /// Read a field by lookup path (`slug`, `name`, `pretty_slug`, `region__slug`)
    pub fn lookup(&self, path: &str) -> Option<String> {
        match path {
            "slug" => Some(self.slug.clone()),
            "name" => Some(self.name.clone()),
            "pretty_slug" => Some(self.pretty_slug()),
            "region__slug" => Some(self.region.slug.clone()),
            "region__full_name" => Some(self.region.full_name.clone()),
            _ => None,
        }
    }
}

/// Content that is owned by a page and must go when the page goes
pub trait PageOwned: Send + Sync {
    fn delete_for_page(&self, page: &Page, date: DateTime<Utc>) -> Result<(), FeedError>;
}

/// Persistent, versioned page store
pub struct PageStore {
    backend: Arc<dyn StorageBackend>,
    history: Arc<dyn HistoryStore>,
    dependents: Vec<Arc<dyn PageOwned>>,
    write_lock: Mutex<()>,
}

impl PageStore {
    pub fn new(backend: Arc<dyn StorageBackend>, history: Arc<dyn HistoryStore>) -> Self {
        Self {
            backend,
            history,
            dependents: Vec::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Cascade deletes of pages to `dependent`
    pub fn with_dependent(mut self, dependent: Arc<dyn PageOwned>) -> Self {
        self.dependents.push(dependent);
        self
    }

    pub fn history(&self) -> Arc<dyn HistoryStore> {
        Arc::clone(&self.history)
    }

    pub fn exists(&self, id: Uuid) -> bool {
        self.backend.exists(id)
    }

    pub fn get(&self, id: Uuid) -> Result<Page, FeedError> {
        let data = self.backend.load(id).map_err(|e| match e {
            StorageError::NotFound(_) => FeedError::NotFound(format!("page {}", id)),
            other => FeedError::Storage(other),
        })?;
        serde_json::from_slice(&data)
            .map_err(|e| FeedError::Storage(StorageError::SerializationError(e.to_string())))
    }

    pub fn save(&self, page: &Page) -> Result<Revision, FeedError> {
        self.save_at(page, Utc::now())
    }

    /// Persist `page` and record an `Added` or `Updated` revision dated `date`
    pub fn save_at(&self, page: &Page, date: DateTime<Utc>) -> Result<Revision, FeedError> {
        let _guard = self.lock()?;
        let kind = if self.backend.exists(page.id) {
            RevisionKind::Updated
        } else {
            RevisionKind::Added
        };

        let snapshot = snapshot_of(page)?;
        let data = serde_json::to_vec(&snapshot)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        self.backend.store(page.id, &data)?;

        Ok(self
            .history
            .record(&page.id.to_string(), kind, Some(page.clone()), snapshot, date)?)
    }

    pub fn delete(&self, page: &Page) -> Result<Revision, FeedError> {
        self.delete_at(page, Utc::now())
    }

    /// Delete `page` and everything it owns. The page record goes first, so
    /// owned content is only removed once the page is gone.
    pub fn delete_at(&self, page: &Page, date: DateTime<Utc>) -> Result<Revision, FeedError> {
        let _guard = self.lock()?;
        if !self.backend.exists(page.id) {
            return Err(FeedError::NotFound(format!("page {}", page.id)));
        }

        self.backend.delete(page.id)?;
        for dependent in &self.dependents {
            dependent.delete_for_page(page, date)?;
        }
        log::debug!("Deleted page '{}' in region '{}'", page.slug, page.region.slug);

        Ok(self.history.record(
            &page.id.to_string(),
            RevisionKind::Deleted,
            Some(page.clone()),
            snapshot_of(page)?,
            date,
        )?)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, FeedError> {
        self.write_lock.lock().map_err(|_| {
            FeedError::Storage(StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "page store lock poisoned",
            )))
        })
    }
}

fn snapshot_of(page: &Page) -> Result<serde_json::Value, FeedError> {
    serde_json::to_value(page)
        .map_err(|e| FeedError::Storage(StorageError::SerializationError(e.to_string())))
}
