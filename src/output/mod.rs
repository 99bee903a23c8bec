//! Output module for generating crawl summaries and reports
//!
//! Pulls a point-in-time snapshot from the state store (§6 admin surface)
//! and renders it as markdown. There is no push-based recording here: the
//! ingestion pipeline writes directly to `SqliteStorage`/the bus, so a
//! report is always assembled after the fact rather than accumulated
//! during the run.

mod markdown;
mod traits;

pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use traits::{IngestionSummary, OutputError, OutputResult};

use crate::admin;
use crate::frontier::Strategy;
use crate::storage::{IngestionStore, SqliteStorage, StorageError};

/// Assembles an `IngestionSummary` from the current state store contents.
pub fn generate_summary(
    storage: &SqliteStorage,
    strategy: Strategy,
) -> Result<IngestionSummary, StorageError> {
    let stats = admin::crawler_stats(storage, strategy)?;
    let top_pages = admin::pagerank_stats(storage, 20)?;

    Ok(IngestionSummary {
        strategy: Some(stats.strategy),
        counts_by_status: stats.counts_by_status,
        frontier_size: stats.frontier_size,
        dedup: None,
        top_pages,
    })
}
