//! Link ingestor (§4.8): consumes LinkDiscoveryEvents, normalizes, dedups,
//! and inserts new CrawlJobs into the Frontier.

use crate::dedup::{sha256_hex, UrlDedupDecision, UrlDedupIndex};
use crate::frontier::{Frontier, PriorityInputs, Strategy};
use crate::kv::KvError;
use crate::storage::{SqliteStorage, StorageError};
use crate::url::{normalize_url, registrable_domain, tld_authority_uplift};
use crate::UrlError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkIngestError {
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] UrlError),

    #[error(transparent)]
    Kv(#[from] KvError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Default domain-authority score absent any curated uplift (§4.8).
const DEFAULT_DOMAIN_AUTHORITY: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Enqueued,
    DroppedTooDeep,
    DroppedDuplicate,
}

pub struct LinkIngestor<'a> {
    storage: &'a mut SqliteStorage,
    dedup: &'a UrlDedupIndex,
    strategy: Strategy,
    max_depth: u32,
    max_retries: u32,
    allowlisted_domains: &'a [String],
}

impl<'a> LinkIngestor<'a> {
    pub fn new(
        storage: &'a mut SqliteStorage,
        dedup: &'a UrlDedupIndex,
        strategy: Strategy,
        max_depth: u32,
        max_retries: u32,
        allowlisted_domains: &'a [String],
    ) -> Self {
        Self {
            storage,
            dedup,
            strategy,
            max_depth,
            max_retries,
            allowlisted_domains,
        }
    }

    /// Ingests one discovered link. `raw_url` is resolved+normalized here
    /// (the Fetcher already resolves relative hrefs to absolute, but
    /// re-normalizing at this boundary keeps the ingestor pure per §4.1).
    pub fn ingest(
        &mut self,
        raw_url: &str,
        depth: u32,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<IngestOutcome, LinkIngestError> {
        if depth > self.max_depth {
            return Ok(IngestOutcome::DroppedTooDeep);
        }

        let canonical = normalize_url(raw_url)?;
        let canonical_str = canonical.to_string();
        let domain = registrable_domain(&canonical).ok_or(UrlError::MissingDomain)?;

        if self.dedup.check(&canonical_str)? == UrlDedupDecision::Seen {
            return Ok(IngestOutcome::DroppedDuplicate);
        }

        let domain_authority = DEFAULT_DOMAIN_AUTHORITY + tld_authority_uplift(&domain);
        let inputs = PriorityInputs {
            depth,
            domain_authority: domain_authority.min(1.0),
            domain_is_allowlisted: self.allowlisted_domains.iter().any(|d| d == &domain),
            matches_valuable_pattern: crate::frontier::strategy::matches_valuable_pattern(
                canonical.path(),
            ),
            path_depth: canonical.path().matches('/').count() as u32,
            has_query: canonical.query().is_some(),
            ..Default::default()
        };

        let url_hash = sha256_hex(&canonical_str);
        let mut frontier = Frontier::new(self.storage, self.strategy);
        frontier.enqueue(
            &canonical_str,
            &url_hash,
            &canonical_str,
            &domain,
            depth,
            self.max_depth,
            self.max_retries,
            &inputs,
            now,
        )?;

        self.dedup.mark_seen(&canonical_str)?;
        Ok(IngestOutcome::Enqueued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::KvStore;
    use crate::storage::IngestionStore;
    use std::sync::Arc;

    fn storage_and_dedup() -> (SqliteStorage, UrlDedupIndex) {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let kv = Arc::new(KvStore::open_in_memory().unwrap());
        let dedup = UrlDedupIndex::new(kv, 1000, 0.01);
        (storage, dedup)
    }

    #[test]
    fn test_ingest_enqueues_new_url() {
        let (mut storage, dedup) = storage_and_dedup();
        let allowlist: Vec<String> = vec![];
        let mut ingestor =
            LinkIngestor::new(&mut storage, &dedup, Strategy::Bfs, 3, 3, &allowlist);
        let outcome = ingestor
            .ingest("https://example.com/a", 1, chrono::Utc::now())
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Enqueued);
    }

    #[test]
    fn test_ingest_drops_too_deep() {
        let (mut storage, dedup) = storage_and_dedup();
        let allowlist: Vec<String> = vec![];
        let mut ingestor =
            LinkIngestor::new(&mut storage, &dedup, Strategy::Bfs, 3, 3, &allowlist);
        let outcome = ingestor
            .ingest("https://example.com/a", 4, chrono::Utc::now())
            .unwrap();
        assert_eq!(outcome, IngestOutcome::DroppedTooDeep);
    }

    #[test]
    fn test_ingest_drops_duplicate_on_second_sighting() {
        let (mut storage, dedup) = storage_and_dedup();
        let allowlist: Vec<String> = vec![];
        let mut ingestor =
            LinkIngestor::new(&mut storage, &dedup, Strategy::Bfs, 3, 3, &allowlist);
        let now = chrono::Utc::now();
        ingestor.ingest("https://example.com/a", 1, now).unwrap();
        let second = ingestor.ingest("https://example.com/a", 1, now).unwrap();
        assert_eq!(second, IngestOutcome::DroppedDuplicate);
    }

    #[test]
    fn test_ingest_uplifts_edu_domain_authority() {
        let (mut storage, dedup) = storage_and_dedup();
        let allowlist: Vec<String> = vec![];
        let mut ingestor =
            LinkIngestor::new(&mut storage, &dedup, Strategy::BestFirst, 3, 3, &allowlist);
        ingestor
            .ingest("https://school.edu/page", 1, chrono::Utc::now())
            .unwrap();
        let job = storage
            .get_crawl_job_by_hash(&sha256_hex("https://school.edu/page"))
            .unwrap()
            .unwrap();
        // BestFirst priority scales with domain_authority; .edu gets +0.35
        // uplift over the 0.5 default, so priority should be positive.
        assert!(job.priority > 0.0);
    }
}
