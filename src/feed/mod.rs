//! The recent-changes feed
//!
//! # Concepts
//!
//! - **Change source**: one content kind's view of its revision history
//!   (`ChangeSource`). The feed never sees the kind's own types, only
//!   revisions, the page each belongs to and the addresses to show.
//!
//! - **Page link**: how a source's revisions join to a page slug, resolved
//!   once at registration from the source's static description.
//!
//! - **Registry**: the frozen, ordered set of sources built at startup.
//!
//! - **Feed**: a newest-first merge of all sources, served in pages with an
//!   exclusive resume cursor.
//!
//! # Serving a page
//!
//! ```text
//! FeedQuery (region, page slug, cursor, limit)
//!   ↓ every registered source: queryset(cursor date)
//! per-source candidates (filtered, resolved, at most limit + 1)
//!   ↓ heap merge on (date desc, registration order, seq desc)
//! FeedPage (entries, next cursor, per-source failures)
//! ```

pub mod aggregator;
pub mod links;
pub mod lookup;
pub mod registry;
pub mod source;
pub mod sources;

pub use aggregator::{ChangeFeed, FeedCursor, FeedEntry, FeedPage, FeedPosition, FeedQuery, SourceFailure};
pub use links::LinkBuilder;
pub use lookup::{ModelShape, PageLinkStrategy, SourceDescriptor};
pub use registry::{RegisteredSource, Registry, RegistryBuilder};
pub use source::{ChangeSource, RevisionStream};
pub use sources::{HistorySource, MapChanges, PageChanges};
