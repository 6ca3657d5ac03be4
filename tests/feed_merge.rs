//! Merge and pagination behavior of the change feed across several sources.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use changefeed::feed::{
    ChangeFeed, ChangeSource, FeedCursor, FeedEntry, FeedPage, FeedQuery, HistorySource, ModelShape, Registry,
    RevisionStream, SourceDescriptor,
};
use changefeed::history::{HistoryStore, InMemoryHistory, Revision, RevisionKind, SeqNum};
use changefeed::pages::{Page, Region};
use changefeed::storage::StorageError;
use changefeed::{FeedConfig, FeedError};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn descriptor(kind: &str) -> SourceDescriptor {
    SourceDescriptor::new(kind, kind, ModelShape::new(kind).with_page_reference())
}

/// A source whose revisions all belong to pages in `region`, one per date.
fn source_in(kind: &str, region: &str, dates: &[i64]) -> Arc<HistorySource> {
    let dates: Vec<DateTime<Utc>> = dates.iter().map(|secs| at(*secs)).collect();
    source_dated(kind, region, &dates)
}

fn source_dated(kind: &str, region: &str, dates: &[DateTime<Utc>]) -> Arc<HistorySource> {
    let history = Arc::new(InMemoryHistory::new());
    for (i, date) in dates.iter().enumerate() {
        let page = Page::new(format!("{} page {}", kind, i), Region::new(region));
        history
            .record(
                &format!("{}-{}", kind, i),
                RevisionKind::Updated,
                Some(page),
                json!({ "name": format!("{} #{}", kind, i) }),
                *date,
            )
            .unwrap();
    }
    Arc::new(HistorySource::new(descriptor(kind), history))
}

fn source(kind: &str, dates: &[i64]) -> Arc<HistorySource> {
    source_in(kind, "sf", dates)
}

fn feed_over(sources: Vec<Arc<dyn ChangeSource>>) -> ChangeFeed {
    let mut builder = Registry::builder();
    for source in sources {
        builder.register(source).unwrap();
    }
    ChangeFeed::new(Arc::new(builder.build()), FeedConfig::default())
}

fn keys(entries: &[FeedEntry]) -> Vec<(String, i64, SeqNum)> {
    entries
        .iter()
        .map(|e| (e.source_kind.clone(), e.revision_date.timestamp(), e.seq))
        .collect()
}

/// Walk the feed page by page until the cursor runs out
fn walk(feed: &ChangeFeed, base: FeedQuery, limit: usize) -> Vec<FeedEntry> {
    let mut all = Vec::new();
    let mut query = base.limit(limit);
    loop {
        let page: FeedPage = feed.feed(&query).unwrap();
        assert!(page.entries.len() <= limit);
        all.extend(page.entries);
        match page.next_start_at {
            Some(cursor) => query.start_at = Some(cursor),
            None => break,
        }
    }
    all
}

/// Same as `walk`, but every cursor travels through its text and JSON forms
/// the way a client hands it back.
fn walk_by_text(feed: &ChangeFeed, limit: usize) -> Vec<FeedEntry> {
    let mut all = Vec::new();
    let mut query = FeedQuery::new().limit(limit);
    loop {
        let page = feed.feed(&query).unwrap();
        all.extend(page.entries);
        let Some(cursor) = page.next_start_at else {
            break;
        };
        let text = cursor.to_string();
        let reparsed: FeedCursor = text.parse().unwrap();
        assert_eq!(reparsed, cursor, "cursor text {}", text);
        let wire = serde_json::to_string(&reparsed).unwrap();
        query.start_at = Some(serde_json::from_str(&wire).unwrap());
    }
    all
}

/// Source whose store is unreachable
struct BrokenStore(SourceDescriptor);

impl ChangeSource for BrokenStore {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.0
    }

    fn queryset(&self, _start_at: Option<DateTime<Utc>>) -> Result<RevisionStream<'_>, FeedError> {
        Err(FeedError::Storage(StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "revision store unreachable",
        ))))
    }
}

/// Source that hands out revisions in whatever order it was given
struct VerbatimSource {
    descriptor: SourceDescriptor,
    revisions: Vec<Revision>,
}

impl ChangeSource for VerbatimSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn queryset(&self, _start_at: Option<DateTime<Utc>>) -> Result<RevisionStream<'_>, FeedError> {
        Ok(Box::new(self.revisions.clone().into_iter().map(Ok)))
    }
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[test]
fn ties_resolve_by_registration_then_source_order() {
    let a = source("a", &[10, 10, 5]);
    let b = source("b", &[10]);
    let a_order: Vec<SeqNum> = a
        .queryset(None)
        .unwrap()
        .map(|r| r.unwrap().seq)
        .collect();
    let feed = feed_over(vec![a, b]);

    let first = feed.feed(&FeedQuery::new().limit(2)).unwrap();
    assert_eq!(
        keys(&first.entries),
        vec![
            ("a".to_string(), 10, a_order[0]),
            ("a".to_string(), 10, a_order[1]),
        ]
    );
    let cursor = first.next_start_at.expect("more entries remain");

    let second = feed.feed(&FeedQuery::new().limit(2).start_at(cursor)).unwrap();
    assert_eq!(
        keys(&second.entries),
        vec![("b".to_string(), 10, 1), ("a".to_string(), 5, 3)]
    );
    assert!(second.next_start_at.is_none());
}

#[test]
fn swapping_registration_order_swaps_ties_only() {
    let forward = feed_over(vec![source("a", &[10, 7]), source("b", &[10, 8])]);
    let reverse = feed_over(vec![source("b", &[10, 8]), source("a", &[10, 7])]);

    let f = keys(&forward.feed(&FeedQuery::new()).unwrap().entries);
    let r = keys(&reverse.feed(&FeedQuery::new()).unwrap().entries);

    assert_eq!(f[0].0, "a");
    assert_eq!(f[1].0, "b");
    assert_eq!(r[0].0, "b");
    assert_eq!(r[1].0, "a");
    assert_eq!(&f[2..], &r[2..]);
    assert_eq!(f[2], ("b".to_string(), 8, 2));
    assert_eq!(f[3], ("a".to_string(), 7, 2));
}

#[test]
fn feed_is_newest_first() {
    let feed = feed_over(vec![
        source("a", &[3, 9, 1, 14]),
        source("b", &[2, 9, 9, 20]),
        source("c", &[]),
    ]);
    let entries = feed.feed(&FeedQuery::new()).unwrap().entries;
    assert_eq!(entries.len(), 8);
    for pair in entries.windows(2) {
        assert!(pair[0].position() < pair[1].position());
        assert!(pair[0].revision_date >= pair[1].revision_date);
    }
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

#[test]
fn text_cursors_keep_sub_microsecond_ties() {
    let fine = |nanos: u32| Utc.timestamp_opt(1_700_000_000, nanos).unwrap();
    let tied = fine(123_456_789);
    let feed = feed_over(vec![
        source_dated("a", "sf", &[tied, tied, fine(123_456_001)]),
        source_dated("b", "sf", &[tied, fine(123_456_500)]),
        source_dated("c", "sf", &[fine(123_456_999), tied]),
    ]);

    let full: Vec<(String, DateTime<Utc>, SeqNum)> = feed
        .feed(&FeedQuery::new())
        .unwrap()
        .entries
        .iter()
        .map(|e| (e.source_kind.clone(), e.revision_date, e.seq))
        .collect();
    assert_eq!(full.len(), 7);

    for limit in [1, 2, 3, 6] {
        let paged: Vec<(String, DateTime<Utc>, SeqNum)> = walk_by_text(&feed, limit)
            .iter()
            .map(|e| (e.source_kind.clone(), e.revision_date, e.seq))
            .collect();
        assert_eq!(paged, full, "page size {}", limit);
    }
}

#[test]
fn pages_concatenate_to_the_full_feed() {
    let dates_a: Vec<i64> = (0..23).map(|i| (i % 5) * 10).collect();
    let dates_b: Vec<i64> = (0..17).map(|i| (i % 3) * 10).collect();
    let dates_c: Vec<i64> = vec![40, 40, 40, 40, 0];
    let feed = feed_over(vec![
        source("a", &dates_a),
        source("b", &dates_b),
        source("c", &dates_c),
    ]);

    let full = keys(&feed.feed(&FeedQuery::new().limit(500)).unwrap().entries);
    assert_eq!(full.len(), 45);

    for limit in [1, 2, 3, 4, 7, 10, 44, 45, 46] {
        let paged = keys(&walk(&feed, FeedQuery::new(), limit));
        assert_eq!(paged, full, "page size {}", limit);
    }
}

#[test]
fn bare_timestamp_cursor_is_inclusive() {
    let feed = feed_over(vec![source("a", &[30, 20, 10]), source("b", &[20])]);
    let query = FeedQuery::new().start_at("1970-01-01T00:00:20Z".parse().unwrap());
    let entries = feed.feed(&query).unwrap().entries;
    assert_eq!(
        keys(&entries),
        vec![
            ("a".to_string(), 20, 2),
            ("b".to_string(), 20, 1),
            ("a".to_string(), 10, 3),
        ]
    );
}

#[test]
fn invalid_limit_is_rejected() {
    let feed = feed_over(vec![source("a", &[1])]);
    assert!(matches!(
        feed.feed(&FeedQuery::new().limit(0)),
        Err(FeedError::InvalidLimit(0))
    ));
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

#[test]
fn region_filter_keeps_matching_pages() {
    let feed = feed_over(vec![
        source_in("a", "sf", &[5, 4]),
        source_in("b", "oakland", &[6]),
    ]);
    let entries = feed.feed(&FeedQuery::new().region("oakland")).unwrap().entries;
    assert_eq!(keys(&entries), vec![("b".to_string(), 6, 1)]);
    assert_eq!(entries[0].region_slug, "oakland");

    let all = walk(&feed, FeedQuery::new().region("sf"), 1);
    assert_eq!(all.len(), 2);
}

#[test]
fn page_filter_uses_each_sources_lookup() {
    let front = Page::new("Front Page", Region::new("sf"));

    // Page-like source: slug lives on the snapshot itself
    let pages = Arc::new(InMemoryHistory::new());
    pages
        .record("p1", RevisionKind::Added, Some(front.clone()), json!({ "slug": "front page" }), at(1))
        .unwrap();
    pages
        .record("p2", RevisionKind::Added, Some(front.clone()), json!({ "slug": "other" }), at(2))
        .unwrap();
    let page_source = HistorySource::new(
        SourceDescriptor::new("page", "pages", ModelShape::new("Page")).representing_page(),
        pages,
    );

    // Map-like source: slug reached through the page reference
    let maps = Arc::new(InMemoryHistory::new());
    maps.record("m1", RevisionKind::Added, Some(front.clone()), json!({}), at(3))
        .unwrap();
    maps.record(
        "m2",
        RevisionKind::Added,
        Some(Page::new("Elsewhere", Region::new("sf"))),
        json!({}),
        at(4),
    )
    .unwrap();
    let map_source = HistorySource::new(descriptor("map"), maps);

    let feed = feed_over(vec![Arc::new(page_source), Arc::new(map_source)]);
    let entries = feed.feed(&FeedQuery::new().page_slug("front page")).unwrap().entries;
    assert_eq!(
        keys(&entries),
        vec![("map".to_string(), 3, 1), ("page".to_string(), 1, 1)]
    );
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn orphaned_revision_excludes_only_its_source() {
    let orphans = Arc::new(InMemoryHistory::new());
    orphans
        .record("c-0", RevisionKind::Updated, None, json!({ "name": "lost" }), at(10))
        .unwrap();
    let c = Arc::new(HistorySource::new(descriptor("c"), orphans));

    let feed = feed_over(vec![source("a", &[10, 10, 5]), source("b", &[10]), c]);
    let page = feed.feed(&FeedQuery::new()).unwrap();

    assert_eq!(page.entries.len(), 4);
    assert!(page.entries.iter().all(|e| e.source_kind != "c"));
    assert_eq!(page.failures.len(), 1);
    assert_eq!(page.failures[0].source_kind, "c");
    assert!(page.failures[0].error.contains("does not resolve to a page"));
}

#[test]
fn out_of_order_source_is_reported() {
    let history = InMemoryHistory::new();
    let page = Page::new("Front Page", Region::new("sf"));
    let older = history
        .record("x", RevisionKind::Added, Some(page.clone()), json!({}), at(1))
        .unwrap();
    let newer = history
        .record("x", RevisionKind::Updated, Some(page), json!({}), at(2))
        .unwrap();
    let verbatim = VerbatimSource {
        descriptor: descriptor("verbatim"),
        revisions: vec![older, newer],
    };

    let feed = feed_over(vec![source("a", &[3]), Arc::new(verbatim)]);
    let page = feed.feed(&FeedQuery::new()).unwrap();
    assert_eq!(keys(&page.entries), vec![("a".to_string(), 3, 1)]);
    assert_eq!(page.failures[0].source_kind, "verbatim");
}

#[test]
fn storage_errors_fail_the_feed() {
    let feed = feed_over(vec![
        source("a", &[3]),
        Arc::new(BrokenStore(descriptor("broken"))),
    ]);
    let err = feed.feed(&FeedQuery::new()).unwrap_err();
    assert!(matches!(err, FeedError::Storage(StorageError::IoError(_))));
}

// ---------------------------------------------------------------------------
// Concurrent fan-out
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_fanout_matches_sequential_feed() {
    let orphans = Arc::new(InMemoryHistory::new());
    orphans
        .record("z", RevisionKind::Updated, None, json!({}), at(12))
        .unwrap();
    let feed = feed_over(vec![
        source("a", &[10, 10, 5, 1, 30]),
        source("b", &[10, 2, 2]),
        source("c", &[10, 9, 8, 7]),
        Arc::new(HistorySource::new(descriptor("orphans"), orphans)),
    ]);

    let mut query = FeedQuery::new().limit(3);
    loop {
        let sequential = feed.feed(&query).unwrap();
        let concurrent = feed.feed_concurrent(&query).await.unwrap();
        assert_eq!(sequential.entries, concurrent.entries);
        assert_eq!(sequential.next_start_at, concurrent.next_start_at);
        assert_eq!(sequential.failures, concurrent.failures);
        match sequential.next_start_at {
            Some(cursor) => query.start_at = Some(cursor),
            None => break,
        }
    }
}
