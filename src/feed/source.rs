use chrono::{DateTime, Utc};

use super::links::LinkBuilder;
use super::lookup::{PageLinkStrategy, SourceDescriptor};
use crate::error::FeedError;
use crate::history::Revision;
use crate::pages::Page;

/// Lazy, restartable sequence of revisions, most recent first
pub type RevisionStream<'a> = Box<dyn Iterator<Item = Result<Revision, FeedError>> + Send + 'a>;

/// A content kind that exposes its revision history to the feed.
///
/// Only `descriptor` and `queryset` are required. The defaults read the page
/// reference and `name` attribute off the revision and build addresses under
/// the descriptor's namespace.
pub trait ChangeSource: Send + Sync {
    fn descriptor(&self) -> &SourceDescriptor;

    /// Revisions most recent first. With `start_at`, only those dated at or
    /// before it. Calling again with the same bound yields the same sequence.
    fn queryset(&self, start_at: Option<DateTime<Utc>>) -> Result<RevisionStream<'_>, FeedError>;

    /// The page a revision belongs to
    fn page(&self, revision: &Revision) -> Result<Page, FeedError> {
        revision
            .page
            .clone()
            .ok_or_else(|| FeedError::OrphanedRevision {
                source_kind: self.descriptor().kind.clone(),
                seq: revision.seq,
            })
    }

    /// Human-readable label of a revision
    fn title(&self, revision: &Revision) -> String {
        revision
            .attribute("name")
            .and_then(|name| name.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| revision.object_id.clone())
    }

    /// Path joining this source's revisions to their page's slug
    fn get_page_lookup_info(&self) -> Result<String, FeedError> {
        PageLinkStrategy::resolve(self.descriptor())
            .lookup_path()
            .map(str::to_string)
            .ok_or_else(|| FeedError::PageLinkResolution {
                source_kind: self.descriptor().kind.clone(),
            })
    }

    fn diff_url(&self, revision: &Revision, links: &LinkBuilder) -> Result<String, FeedError> {
        let page = self.page(revision)?;
        Ok(links.diff_address(&self.descriptor().namespace, &page, revision.version_date, None))
    }

    fn as_of_url(&self, revision: &Revision, links: &LinkBuilder) -> Result<String, FeedError> {
        let page = self.page(revision)?;
        Ok(links.as_of_address(&self.descriptor().namespace, &page, revision.version_date))
    }
}
