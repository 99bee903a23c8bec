//! The Frontier (§4.5): a persistent priority queue of PENDING CrawlJobs,
//! backed by the `crawl_urls` table. `Strategy` decides priority; the
//! Frontier itself only knows how to enqueue, poll, and requeue.

pub mod strategy;

pub use strategy::{PriorityInputs, Strategy};

use crate::storage::{CrawlJob, IngestionStore, NewCrawlJob, SqliteStorage, StorageError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;

/// Exponential backoff schedule for `requeueWithBackoff` (§4.6 scenario 4):
/// start 2s so that a capacity-1/refill-0.5 token bucket has refilled by
/// the retry, factor 2, jitter +-25%, cap 60s.
const BACKOFF_BASE_SECS: f64 = 2.0;
const BACKOFF_FACTOR: f64 = 2.0;
const BACKOFF_CAP_SECS: f64 = 60.0;

pub struct Frontier<'a> {
    storage: &'a mut SqliteStorage,
    strategy: Strategy,
}

impl<'a> Frontier<'a> {
    pub fn new(storage: &'a mut SqliteStorage, strategy: Strategy) -> Self {
        Self { storage, strategy }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Inserts a new PENDING job if its URL hash is not already present.
    /// Returns `None` when the job already exists (caller treats this as a
    /// dedup no-op, matching §4.8's "insert a CrawlJob ... atomically").
    pub fn enqueue(
        &mut self,
        url: &str,
        url_hash: &str,
        normalized_url: &str,
        domain: &str,
        depth: u32,
        max_depth: u32,
        max_retries: u32,
        inputs: &PriorityInputs,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>, StorageError> {
        if self.storage.get_crawl_job_by_hash(url_hash)?.is_some() {
            return Ok(None);
        }

        let priority = self.strategy.priority(inputs);
        let job = NewCrawlJob {
            url: url.to_string(),
            url_hash: url_hash.to_string(),
            normalized_url: normalized_url.to_string(),
            domain: domain.to_string(),
            priority,
            depth,
            max_depth,
            max_retries,
            scheduled_at: now,
            created_at: now,
        };
        Ok(Some(self.storage.insert_crawl_job(&job)?))
    }

    /// Returns up to `limit` PENDING jobs whose `scheduled_at <= now`,
    /// highest priority first (§4.5).
    pub fn poll_ready(&self, limit: u32, now: DateTime<Utc>) -> Result<Vec<CrawlJob>, StorageError> {
        self.storage.poll_ready_jobs(limit, now)
    }

    pub fn mark_in_progress(&mut self, job_id: i64) -> Result<(), StorageError> {
        self.storage.mark_in_progress(job_id)
    }

    /// Requeues a job with jittered exponential backoff (§4.3's backoff
    /// shape, reused here for scheduler-level retries per §4.6 step 3).
    pub fn requeue_with_backoff(
        &mut self,
        job: &CrawlJob,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let backoff = backoff_duration(job.retry_count);
        let scheduled_at = now + ChronoDuration::milliseconds(backoff.as_millis() as i64);
        self.storage.requeue_with_backoff(job.id, scheduled_at, error)
    }

    pub fn fail(&mut self, job_id: i64, error: &str) -> Result<(), StorageError> {
        self.storage.fail_job(job_id, error)
    }

    pub fn block(&mut self, job_id: i64, reason: &str) -> Result<(), StorageError> {
        self.storage.mark_blocked(job_id, reason)
    }

    pub fn complete(&mut self, job_id: i64, crawled_at: DateTime<Utc>) -> Result<(), StorageError> {
        self.storage.mark_completed(job_id, crawled_at)
    }
}

fn backoff_duration(retry_count: u32) -> std::time::Duration {
    let base = BACKOFF_BASE_SECS * BACKOFF_FACTOR.powi(retry_count as i32);
    let capped = base.min(BACKOFF_CAP_SECS);
    let jitter = rand::thread_rng().gen_range(-0.25..=0.25);
    let with_jitter = (capped * (1.0 + jitter)).max(0.0);
    std::time::Duration::from_secs_f64(with_jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    fn inputs() -> PriorityInputs {
        PriorityInputs::default()
    }

    #[test]
    fn test_enqueue_then_poll_ready() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let now = Utc::now();
        let mut frontier = Frontier::new(&mut storage, Strategy::Bfs);
        let id = frontier
            .enqueue(
                "https://a.com/",
                "hash-a",
                "https://a.com/",
                "a.com",
                0,
                3,
                3,
                &inputs(),
                now,
            )
            .unwrap();
        assert!(id.is_some());

        let ready = frontier.poll_ready(10, now).unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].url_hash, "hash-a");
    }

    #[test]
    fn test_enqueue_is_idempotent_by_hash() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let now = Utc::now();
        let mut frontier = Frontier::new(&mut storage, Strategy::Bfs);
        frontier
            .enqueue("https://a.com/", "hash-a", "https://a.com/", "a.com", 0, 3, 3, &inputs(), now)
            .unwrap();
        let second = frontier
            .enqueue("https://a.com/", "hash-a", "https://a.com/", "a.com", 0, 3, 3, &inputs(), now)
            .unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_requeue_with_backoff_delays_scheduling() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let now = Utc::now();
        let mut frontier = Frontier::new(&mut storage, Strategy::Bfs);
        frontier
            .enqueue("https://a.com/", "hash-a", "https://a.com/", "a.com", 0, 3, 3, &inputs(), now)
            .unwrap();
        let ready = frontier.poll_ready(10, now).unwrap();
        let job = &ready[0];

        frontier.requeue_with_backoff(job, "rate limited", now).unwrap();
        let immediate = frontier.poll_ready(10, now).unwrap();
        assert!(immediate.is_empty());

        let later = now + ChronoDuration::seconds(120);
        let ready_later = frontier.poll_ready(10, later).unwrap();
        assert_eq!(ready_later.len(), 1);
        assert_eq!(ready_later[0].retry_count, 1);
    }
}
