//! Output types: the report assembled from the ingestion state store at
//! the end of a run (or on demand via `--stats`/`--export-summary`).

use crate::admin::DedupStats;
use crate::frontier::Strategy;
use crate::storage::PageNode;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type OutputResult<T> = Result<T, OutputError>;

/// A point-in-time snapshot of the Frontier/bus pipeline's progress,
/// pulled from the state store rather than accumulated during the run.
#[derive(Debug, Clone, Default)]
pub struct IngestionSummary {
    pub strategy: Option<Strategy>,
    pub counts_by_status: HashMap<String, u64>,
    pub frontier_size: u64,
    pub dedup: Option<DedupStats>,
    pub top_pages: Vec<PageNode>,
}

impl IngestionSummary {
    pub fn total_jobs(&self) -> u64 {
        self.counts_by_status.values().sum()
    }

    pub fn count(&self, status: &str) -> u64 {
        self.counts_by_status.get(status).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_jobs_sums_all_statuses() {
        let mut summary = IngestionSummary::default();
        summary.counts_by_status.insert("completed".to_string(), 10);
        summary.counts_by_status.insert("failed".to_string(), 2);
        assert_eq!(summary.total_jobs(), 12);
    }

    #[test]
    fn test_count_missing_status_is_zero() {
        let summary = IngestionSummary::default();
        assert_eq!(summary.count("blocked"), 0);
    }
}
