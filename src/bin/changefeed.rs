//! Print one page of the change feed for sources loaded from a fixture file
//!
//! Run with: cargo run --bin changefeed -- --fixture feed.json --limit 20

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Deserialize;

use changefeed::feed::{ChangeFeed, FeedCursor, FeedQuery, HistorySource, Registry, SourceDescriptor};
use changefeed::history::{HistoryStore, InMemoryHistory, RevisionKind};
use changefeed::pages::{Page, Region};
use changefeed::FeedConfig;

#[derive(Parser, Debug)]
#[command(name = "changefeed", about = "Query the recent changes feed")]
struct Cli {
    /// JSON file describing sources and their revisions
    #[arg(long)]
    fixture: PathBuf,

    /// JSON feed configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only changes to pages in this region
    #[arg(long)]
    region: Option<String>,

    /// Only changes to the page with this slug
    #[arg(long)]
    page: Option<String>,

    /// Resume cursor from a previous page, or a timestamp
    #[arg(long)]
    start_at: Option<FeedCursor>,

    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct Fixture {
    sources: Vec<FixtureSource>,
}

#[derive(Deserialize)]
struct FixtureSource {
    descriptor: SourceDescriptor,
    #[serde(default)]
    revisions: Vec<FixtureRevision>,
}

#[derive(Deserialize)]
struct FixtureRevision {
    date: DateTime<Utc>,
    object_id: String,
    #[serde(default = "default_kind")]
    kind: RevisionKind,
    page: Option<FixturePage>,
    #[serde(default)]
    snapshot: serde_json::Value,
}

#[derive(Deserialize)]
struct FixturePage {
    name: String,
    region: String,
}

fn default_kind() -> RevisionKind {
    RevisionKind::Updated
}

fn load_registry(fixture: Fixture) -> Result<Registry> {
    let mut builder = Registry::builder();
    for source in fixture.sources {
        let history = Arc::new(InMemoryHistory::new());
        for rev in source.revisions {
            let page = rev.page.map(|p| Page::new(p.name, Region::new(p.region)));
            history.record(&rev.object_id, rev.kind, page, rev.snapshot, rev.date)?;
        }
        let kind = source.descriptor.kind.clone();
        builder
            .register(Arc::new(HistorySource::new(source.descriptor, history)))
            .with_context(|| format!("registering source '{}'", kind))?;
    }
    Ok(builder.build())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => FeedConfig::from_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => FeedConfig::default(),
    };

    let data = std::fs::read(&cli.fixture)
        .with_context(|| format!("reading fixture {}", cli.fixture.display()))?;
    let fixture: Fixture = serde_json::from_slice(&data).context("parsing fixture")?;
    let registry = Arc::new(load_registry(fixture)?);

    let query = FeedQuery {
        region: cli.region,
        page_slug: cli.page,
        start_at: cli.start_at,
        limit: cli.limit,
    };

    let parallel = config.parallel_fanout;
    let feed = ChangeFeed::new(registry, config);
    let page = if parallel {
        tokio::runtime::Runtime::new()?.block_on(feed.feed_concurrent(&query))?
    } else {
        feed.feed(&query)?
    };

    for failure in &page.failures {
        log::warn!("source '{}' skipped: {}", failure.source_kind, failure.error);
    }
    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}
