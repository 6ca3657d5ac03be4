//! Merging every registered source into one feed
//!
//! Entries are ordered by revision date, newest first. Equal dates fall back
//! to registration order of the source, then to the source's own order
//! (higher sequence numbers first). Those three values form a `FeedPosition`,
//! which is unique per revision, so a page boundary can be expressed exactly
//! and the next page resumes right after it.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use super::links::LinkBuilder;
use super::registry::{RegisteredSource, Registry};
use super::source::ChangeSource;
use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::history::{Revision, RevisionKind, SeqNum};

/// Where a revision sits in the merged feed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeedPosition {
    pub date: DateTime<Utc>,
    pub source: usize,
    pub seq: SeqNum,
}

impl Ord for FeedPosition {
    /// `Less` means earlier in the feed
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .date
            .cmp(&self.date)
            .then(self.source.cmp(&other.source))
            .then(other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for FeedPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Resume point of a feed.
///
/// A bare timestamp admits everything dated at or before it. A cursor taken
/// from a feed page also remembers the last emitted position and admits only
/// what comes strictly after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeedCursor {
    pub start_at: DateTime<Utc>,
    pub after: Option<(usize, SeqNum)>,
}

impl FeedCursor {
    pub fn at(start_at: DateTime<Utc>) -> Self {
        Self {
            start_at,
            after: None,
        }
    }

    pub fn after(position: FeedPosition) -> Self {
        Self {
            start_at: position.date,
            after: Some((position.source, position.seq)),
        }
    }

    pub fn admits(&self, position: &FeedPosition) -> bool {
        match self.after {
            None => position.date <= self.start_at,
            Some((source, seq)) => {
                *position
                    > FeedPosition {
                        date: self.start_at,
                        source,
                        seq,
                    }
            }
        }
    }
}

impl fmt::Display for FeedCursor {
    /// Dates keep full nanosecond precision so a parsed cursor lands on the
    /// exact revision date it was taken from.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start_at = self.start_at.to_rfc3339_opts(SecondsFormat::Nanos, true);
        match self.after {
            None => write!(f, "{}", start_at),
            Some((source, seq)) => write!(f, "{}~{}~{}", start_at, source, seq),
        }
    }
}

impl FromStr for FeedCursor {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FeedError::InvalidCursor(s.to_string());
        let parts: Vec<&str> = s.split('~').collect();
        let start_at = DateTime::parse_from_rfc3339(parts[0])
            .map_err(|_| invalid())?
            .with_timezone(&Utc);

        match parts.as_slice() {
            [_] => Ok(Self::at(start_at)),
            [_, source, seq] => {
                let source = source.parse().map_err(|_| invalid())?;
                let seq = seq.parse().map_err(|_| invalid())?;
                Ok(Self {
                    start_at,
                    after: Some((source, seq)),
                })
            }
            _ => Err(invalid()),
        }
    }
}

impl From<FeedCursor> for String {
    fn from(cursor: FeedCursor) -> Self {
        cursor.to_string()
    }
}

impl TryFrom<String> for FeedCursor {
    type Error = FeedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedQuery {
    /// Only pages in this region
    pub region: Option<String>,

    /// Only revisions whose page lookup yields this slug
    pub page_slug: Option<String>,

    pub start_at: Option<FeedCursor>,

    pub limit: Option<usize>,
}

impl FeedQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn page_slug(mut self, slug: impl Into<String>) -> Self {
        self.page_slug = Some(slug.into());
        self
    }

    pub fn start_at(mut self, cursor: FeedCursor) -> Self {
        self.start_at = Some(cursor);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Requested page size, defaulted and clamped by `config`
    pub fn effective_limit(&self, config: &FeedConfig) -> Result<usize, FeedError> {
        match self.limit {
            Some(0) => Err(FeedError::InvalidLimit(0)),
            Some(limit) => Ok(limit.min(config.max_limit)),
            None => Ok(config.default_limit.min(config.max_limit).max(1)),
        }
    }
}

/// One line of the feed
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeedEntry {
    pub title: String,
    pub page_slug: String,
    pub region_slug: String,
    pub revision_date: DateTime<Utc>,
    pub diff_address: String,
    pub as_of_address: String,
    pub source_kind: String,
    pub source_index: usize,
    pub kind: RevisionKind,
    pub seq: SeqNum,
    #[serde(skip_serializing)]
    pub revision: Revision,
}

impl FeedEntry {
    pub fn position(&self) -> FeedPosition {
        FeedPosition {
            date: self.revision_date,
            source: self.source_index,
            seq: self.seq,
        }
    }
}

/// A source left out of one feed call
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source_kind: String,
    pub error: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct FeedPage {
    pub entries: Vec<FeedEntry>,
    pub next_start_at: Option<FeedCursor>,
    pub failures: Vec<SourceFailure>,
}

#[derive(Clone, Debug)]
struct FeedPlan {
    region: Option<String>,
    page_slug: Option<String>,
    cursor: Option<FeedCursor>,
    limit: usize,
}

struct Candidate {
    slot: usize,
    entry: FeedEntry,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.entry.position() == other.entry.position()
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.entry.position().cmp(&other.entry.position())
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The change feed over a registry of sources
pub struct ChangeFeed {
    registry: Arc<Registry>,
    config: FeedConfig,
    links: LinkBuilder,
}

impl ChangeFeed {
    pub fn new(registry: Arc<Registry>, config: FeedConfig) -> Self {
        let links = LinkBuilder::new(config.address_prefix.clone());
        Self {
            registry,
            config,
            links,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// The source an entry came from
    pub fn source_of(&self, entry: &FeedEntry) -> Option<&Arc<dyn ChangeSource>> {
        self.registry.get(entry.source_index).map(RegisteredSource::source)
    }

    /// One page of the feed, querying sources one after another
    pub fn feed(&self, query: &FeedQuery) -> Result<FeedPage, FeedError> {
        let plan = self.plan(query)?;
        let lanes = self
            .registry
            .sources()
            .iter()
            .map(|source| collect_source(source, &plan, &self.links))
            .collect();
        assemble(&self.registry, lanes, plan.limit)
    }

    /// Same result as `feed`, with every source queried on the blocking pool
    pub async fn feed_concurrent(&self, query: &FeedQuery) -> Result<FeedPage, FeedError> {
        let plan = self.plan(query)?;
        let mut tasks = JoinSet::new();
        for slot in 0..self.registry.len() {
            let registry = Arc::clone(&self.registry);
            let plan = plan.clone();
            let links = self.links.clone();
            tasks.spawn_blocking(move || {
                let result = match registry.get(slot) {
                    Some(source) => collect_source(source, &plan, &links),
                    None => Ok(Vec::new()),
                };
                (slot, result)
            });
        }

        let mut lanes: Vec<Option<Result<Vec<Candidate>, FeedError>>> =
            (0..self.registry.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (slot, result) = joined.map_err(|e| FeedError::TaskFailed(e.to_string()))?;
            lanes[slot] = Some(result);
        }
        let lanes = lanes
            .into_iter()
            .map(|lane| lane.unwrap_or_else(|| Ok(Vec::new())))
            .collect();
        assemble(&self.registry, lanes, plan.limit)
    }

    fn plan(&self, query: &FeedQuery) -> Result<FeedPlan, FeedError> {
        Ok(FeedPlan {
            region: query.region.clone(),
            page_slug: query.page_slug.clone(),
            cursor: query.start_at,
            limit: query.effective_limit(&self.config)?,
        })
    }
}

/// Up to `limit + 1` resolved entries of one source, in feed order
fn collect_source(
    registered: &RegisteredSource,
    plan: &FeedPlan,
    links: &LinkBuilder,
) -> Result<Vec<Candidate>, FeedError> {
    let source = registered.source();
    let kind = registered.kind();
    let window = plan.limit + 1;
    let mut candidates = Vec::new();
    let mut previous: Option<FeedPosition> = None;

    for item in source.queryset(plan.cursor.map(|c| c.start_at))? {
        let revision = item?;
        let position = FeedPosition {
            date: revision.version_date,
            source: registered.index(),
            seq: revision.seq,
        };
        if previous.map_or(false, |prev| position <= prev) {
            return Err(FeedError::UnorderedSource {
                source_kind: kind.to_string(),
                seq: revision.seq,
            });
        }
        previous = Some(position);

        if plan.cursor.map_or(false, |cursor| !cursor.admits(&position)) {
            continue;
        }
        if let Some(slug) = &plan.page_slug {
            if revision.lookup(registered.lookup_path()).as_deref() != Some(slug.as_str()) {
                continue;
            }
        }

        let page = source.page(&revision)?;
        if let Some(region) = &plan.region {
            if page.region.slug != *region {
                continue;
            }
        }

        let entry = FeedEntry {
            title: source.title(&revision),
            page_slug: page.slug.clone(),
            region_slug: page.region.slug.clone(),
            revision_date: revision.version_date,
            diff_address: source.diff_url(&revision, links)?,
            as_of_address: source.as_of_url(&revision, links)?,
            source_kind: kind.to_string(),
            source_index: registered.index(),
            kind: revision.kind,
            seq: revision.seq,
            revision,
        };
        candidates.push(Candidate {
            slot: registered.index(),
            entry,
        });
        if candidates.len() >= window {
            break;
        }
    }

    log::debug!("Source '{}' contributed {} candidates", kind, candidates.len());
    Ok(candidates)
}

/// Split failures from results, then k-way merge the surviving lanes.
/// `lanes` is indexed by registration position.
fn assemble(
    registry: &Registry,
    lanes: Vec<Result<Vec<Candidate>, FeedError>>,
    limit: usize,
) -> Result<FeedPage, FeedError> {
    let mut failures = Vec::new();
    let mut queues = Vec::with_capacity(lanes.len());

    for (slot, lane) in lanes.into_iter().enumerate() {
        match lane {
            Ok(candidates) => queues.push(candidates.into_iter()),
            Err(e) if e.is_source_failure() => {
                let source_kind = registry
                    .get(slot)
                    .map(|s| s.kind().to_string())
                    .unwrap_or_default();
                log::warn!("Leaving source '{}' out of the feed: {}", source_kind, e);
                failures.push(SourceFailure {
                    source_kind,
                    error: e.to_string(),
                });
                queues.push(Vec::new().into_iter());
            }
            Err(e) => return Err(e),
        }
    }

    let mut heap = BinaryHeap::new();
    for queue in queues.iter_mut() {
        if let Some(head) = queue.next() {
            heap.push(Reverse(head));
        }
    }

    let mut entries = Vec::with_capacity(limit);
    while entries.len() < limit {
        let Some(Reverse(candidate)) = heap.pop() else {
            break;
        };
        if let Some(next) = queues[candidate.slot].next() {
            heap.push(Reverse(next));
        }
        entries.push(candidate.entry);
    }

    let next_start_at = if heap.is_empty() {
        None
    } else {
        entries.last().map(|entry| FeedCursor::after(entry.position()))
    };

    Ok(FeedPage {
        entries,
        next_start_at,
        failures,
    })
}
