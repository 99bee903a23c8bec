//! Admin surface (§6): a contract for the tier above this crate. HTTP is
//! one realization; this module exposes the operations as plain functions
//! so any transport can wrap them.

use crate::dedup::UrlDedupIndex;
use crate::frontier::{Frontier, PriorityInputs, Strategy};
use crate::rate::RateController;
use crate::ranker::{self, RankerConfig};
use crate::storage::{IngestionStore, PageNode, SqliteStorage, StorageError};
use chrono::Utc;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct SeedRequest {
    pub url: String,
    pub priority_hint: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct CrawlerStats {
    pub counts_by_status: HashMap<String, u64>,
    pub frontier_size: u64,
    pub strategy: Strategy,
}

#[derive(Debug, Clone)]
pub struct DedupStats {
    pub bloom_approximate_count: u64,
    pub bloom_expected_fpr: f64,
}

#[derive(Debug, Clone)]
pub struct RateLimitStatus {
    pub domain: String,
    pub tokens_remaining: Option<f64>,
    pub circuit_state: &'static str,
}

/// Adds seed URLs directly to the Frontier (§6). Returns the number of
/// CrawlJobs actually created (URLs already known are skipped).
pub fn add_seeds(
    storage: &mut SqliteStorage,
    strategy: Strategy,
    max_depth: u32,
    max_retries: u32,
    seeds: &[SeedRequest],
) -> Result<u32, StorageError> {
    let now = Utc::now();
    let mut created = 0;
    let mut frontier = Frontier::new(storage, strategy);
    for seed in seeds {
        let url_hash = crate::dedup::sha256_hex(&seed.url);
        let domain = crate::url::extract_domain(
            &::url::Url::parse(&seed.url).map_err(|e| StorageError::Serialization(e.to_string()))?,
        )
        .unwrap_or_default();
        let inserted = frontier.enqueue(
            &seed.url,
            &url_hash,
            &seed.url,
            &domain,
            0,
            max_depth,
            max_retries,
            &PriorityInputs::default(),
            now,
        )?;
        if inserted.is_some() {
            created += 1;
        }
    }
    Ok(created)
}

/// Parses a requested strategy name (§6 "change strategy"). This crate
/// realizes the crawl as a single process with one fixed `Coordinator`, so
/// applying the change means restarting with `ingestion.strategy` set to the
/// returned value in config — there is no live, shared "current strategy"
/// for a running process to mutate.
pub fn change_strategy(requested: &str) -> Result<Strategy, String> {
    Strategy::from_config_str(requested)
        .ok_or_else(|| format!("unknown strategy '{requested}'"))
}

pub fn crawler_stats(
    storage: &SqliteStorage,
    strategy: Strategy,
) -> Result<CrawlerStats, StorageError> {
    let counts = storage.count_jobs_by_status()?.into_iter().collect();
    let frontier_size = storage.frontier_size()?;
    Ok(CrawlerStats {
        counts_by_status: counts,
        frontier_size,
        strategy,
    })
}

pub fn pagerank_stats(storage: &SqliteStorage, top_n: usize) -> Result<Vec<PageNode>, StorageError> {
    ranker::top_n(storage, top_n)
}

/// Triggers a PageRank run. The specification treats this as the one
/// asynchronous admin operation ("returns immediately with a job id"); this
/// crate runs it synchronously and returns a report in place of a job id,
/// since no external job scheduler is in scope here.
pub fn trigger_pagerank(
    storage: &mut SqliteStorage,
    config: &RankerConfig,
) -> Result<ranker::RankerReport, StorageError> {
    ranker::run(storage, config)
}

pub fn dedup_stats(dedup: &UrlDedupIndex) -> DedupStats {
    let (count, fpr) = dedup.bloom_stats();
    DedupStats {
        bloom_approximate_count: count,
        bloom_expected_fpr: fpr,
    }
}

pub fn rate_limit_status(rate: &RateController, domain: &str) -> Result<RateLimitStatus, crate::rate::RateError> {
    let tokens_remaining = rate.token_bucket_state(domain)?.map(|s| s.tokens);
    Ok(RateLimitStatus {
        domain: domain.to_string(),
        tokens_remaining,
        circuit_state: rate.circuit_status(domain),
    })
}

pub fn reset_domain_rate_limit(rate: &RateController, domain: &str) -> Result<(), crate::rate::RateError> {
    rate.reset_domain(domain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::KvStore;
    use std::sync::Arc;

    #[test]
    fn test_add_seeds_creates_jobs() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let seeds = vec![SeedRequest {
            url: "https://example.com/".to_string(),
            priority_hint: None,
        }];
        let created = add_seeds(&mut storage, Strategy::Bfs, 3, 3, &seeds).unwrap();
        assert_eq!(created, 1);

        let stats = crawler_stats(&storage, Strategy::Bfs).unwrap();
        assert_eq!(stats.frontier_size, 1);
    }

    #[test]
    fn test_dedup_stats_reflects_marks() {
        let kv = Arc::new(KvStore::open_in_memory().unwrap());
        let dedup = UrlDedupIndex::new(kv, 1000, 0.01);
        dedup.mark_seen("https://a.com/").unwrap();
        let stats = dedup_stats(&dedup);
        assert_eq!(stats.bloom_approximate_count, 1);
        assert!((stats.bloom_expected_fpr - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_change_strategy_parses_known_names() {
        assert_eq!(change_strategy("opic").unwrap(), Strategy::Opic);
        assert!(change_strategy("round-robin").is_err());
    }

    #[test]
    fn test_rate_limit_status_reports_circuit_state() {
        let kv = Arc::new(KvStore::open_in_memory().unwrap());
        let rate = RateController::new(kv);
        let status = rate_limit_status(&rate, "a.com").unwrap();
        assert_eq!(status.circuit_state, "closed");
    }
}
