//! Change sources for the built-in content kinds

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::lookup::{ModelShape, SourceDescriptor};
use super::source::{ChangeSource, RevisionStream};
use crate::error::FeedError;
use crate::history::{HistoryStore, Revision};
use crate::maps::MAP_NAMESPACE;

fn stream_history(
    history: &dyn HistoryStore,
    start_at: Option<DateTime<Utc>>,
) -> Result<RevisionStream<'static>, FeedError> {
    let revisions = history.revisions(start_at)?;
    Ok(Box::new(revisions.into_iter().map(Ok)))
}

/// Page edits
pub struct PageChanges {
    descriptor: SourceDescriptor,
    history: Arc<dyn HistoryStore>,
}

impl PageChanges {
    pub fn new(history: Arc<dyn HistoryStore>) -> Self {
        let model = ModelShape::new("Page").with_attributes(["id", "name", "slug", "region", "content"]);
        Self {
            descriptor: SourceDescriptor::new("page", "pages", model).representing_page(),
            history,
        }
    }
}

impl ChangeSource for PageChanges {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn queryset(&self, start_at: Option<DateTime<Utc>>) -> Result<RevisionStream<'_>, FeedError> {
        stream_history(self.history.as_ref(), start_at)
    }
}

/// Map data edits, titled after the page they belong to
pub struct MapChanges {
    descriptor: SourceDescriptor,
    history: Arc<dyn HistoryStore>,
}

impl MapChanges {
    pub fn new(history: Arc<dyn HistoryStore>) -> Self {
        let model = ModelShape::new("GeometryRecord")
            .with_page_reference()
            .with_attributes(["points", "lines", "polys", "length", "version"]);
        Self {
            descriptor: SourceDescriptor::new("map", MAP_NAMESPACE, model),
            history,
        }
    }
}

impl ChangeSource for MapChanges {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn queryset(&self, start_at: Option<DateTime<Utc>>) -> Result<RevisionStream<'_>, FeedError> {
        stream_history(self.history.as_ref(), start_at)
    }

    fn title(&self, revision: &Revision) -> String {
        match &revision.page {
            Some(page) => format!("Map for \"{}\"", page.name),
            None => format!("Map {}", revision.object_id),
        }
    }
}

/// A source described entirely by data, for content kinds without a
/// dedicated adapter.
pub struct HistorySource {
    descriptor: SourceDescriptor,
    history: Arc<dyn HistoryStore>,
}

impl HistorySource {
    pub fn new(descriptor: SourceDescriptor, history: Arc<dyn HistoryStore>) -> Self {
        Self { descriptor, history }
    }
}

impl ChangeSource for HistorySource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn queryset(&self, start_at: Option<DateTime<Utc>>) -> Result<RevisionStream<'_>, FeedError> {
        stream_history(self.history.as_ref(), start_at)
    }
}
