//! Registry of change sources
//!
//! Sources are registered once while the process starts up, through a
//! `RegistryBuilder`. `build` freezes the set into a `Registry`, which is
//! read-only from then on and can be shared across request handlers.
//! Registration order is the tie-break between sources in the feed.

use std::sync::Arc;

use super::lookup::PageLinkStrategy;
use super::source::ChangeSource;
use crate::error::FeedError;

/// A source together with its resolved page link
pub struct RegisteredSource {
    index: usize,
    source: Arc<dyn ChangeSource>,
    strategy: PageLinkStrategy,
    lookup_path: String,
}

impl RegisteredSource {
    /// Registration position, also the source's merge priority
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn source(&self) -> &Arc<dyn ChangeSource> {
        &self.source
    }

    pub fn kind(&self) -> &str {
        &self.source.descriptor().kind
    }

    pub fn strategy(&self) -> &PageLinkStrategy {
        &self.strategy
    }

    pub fn lookup_path(&self) -> &str {
        &self.lookup_path
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    sources: Vec<RegisteredSource>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source. Its page link is resolved here, so a source whose
    /// revisions cannot be tied to pages is rejected up front, as is a second
    /// source of an already registered kind.
    pub fn register(&mut self, source: Arc<dyn ChangeSource>) -> Result<usize, FeedError> {
        let kind = source.descriptor().kind.clone();
        if self.sources.iter().any(|s| s.kind() == kind) {
            log::warn!("Ignoring duplicate registration of source '{}'", kind);
            return Err(FeedError::DuplicateSource(kind));
        }

        let lookup_path = source.get_page_lookup_info()?;
        let strategy = strategy_for(source.as_ref(), &lookup_path);

        let index = self.sources.len();
        log::debug!(
            "Registered source '{}' at position {} (page lookup '{}')",
            kind,
            index,
            lookup_path
        );
        self.sources.push(RegisteredSource {
            index,
            source,
            strategy,
            lookup_path,
        });
        Ok(index)
    }

    /// Chaining form of `register`
    pub fn with_source(mut self, source: Arc<dyn ChangeSource>) -> Result<Self, FeedError> {
        self.register(source)?;
        Ok(self)
    }

    pub fn build(self) -> Registry {
        Registry {
            sources: self.sources,
        }
    }
}

/// The strategy behind `lookup_path`. A source that overrides its lookup
/// path away from the descriptor's resolution is taken to name an attribute.
fn strategy_for(source: &dyn ChangeSource, lookup_path: &str) -> PageLinkStrategy {
    let resolved = PageLinkStrategy::resolve(source.descriptor());
    if resolved.lookup_path() == Some(lookup_path) {
        resolved
    } else {
        PageLinkStrategy::ExplicitAttributeName(lookup_path.to_string())
    }
}

/// Frozen set of change sources
pub struct Registry {
    sources: Vec<RegisteredSource>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn sources(&self) -> &[RegisteredSource] {
        &self.sources
    }

    pub fn get(&self, index: usize) -> Option<&RegisteredSource> {
        self.sources.get(index)
    }

    pub fn find(&self, kind: &str) -> Option<&RegisteredSource> {
        self.sources.iter().find(|s| s.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
