//! Scheduler (§4.6): periodic tick that pulls ready jobs from the Frontier,
//! enforces robots/rate-limit politeness, and emits FetchRequest messages to
//! the bus.

use crate::bus::{self, FetchRequest, Topic};
use crate::rate::RateController;
use crate::robots::{self, ParsedRobots};
use crate::storage::{IngestionStore, SqliteStorage, StorageError};
use chrono::{Duration as ChronoDuration, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Bus(#[from] bus::BusError),
    #[error(transparent)]
    Rate(#[from] crate::rate::RateError),
}

/// How long a fetched robots.txt is trusted before being refetched.
const ROBOTS_TTL: ChronoDuration = ChronoDuration::hours(24);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// `pollReady` batch size per tick (§4.6).
    pub batch_size: u32,
    /// Tick period; the scheduler itself doesn't sleep — the coordinator's
    /// loop does, passing this through so it can be read back for tuning.
    pub tick_interval: std::time::Duration,
    /// Sliding-window domain budget (§4.3) checked before emitting a fetch.
    pub window_seconds: i64,
    pub max_requests_per_window: u32,
    pub user_agent: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            tick_interval: std::time::Duration::from_secs(10),
            window_seconds: 60,
            max_requests_per_window: 60,
            user_agent: "SumiRipple/1.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub polled: usize,
    pub emitted: usize,
    pub blocked: usize,
    pub requeued: usize,
}

pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// One tick of the §4.6 loop. Robots.txt is fetched (and cached on the
    /// DomainProfile) lazily, on first sight of a domain or once the cache
    /// goes stale.
    pub async fn tick(
        &self,
        storage: &mut SqliteStorage,
        rate: &RateController,
    ) -> Result<TickReport, SchedulerError> {
        let now = Utc::now();
        let jobs = storage.poll_ready_jobs(self.config.batch_size, now)?;
        let mut report = TickReport {
            polled: jobs.len(),
            ..Default::default()
        };

        for job in jobs {
            let robots = self.robots_for_domain(storage, &job.domain).await?;

            if !robots.is_allowed(&job.normalized_url, &self.config.user_agent) {
                storage.mark_blocked(job.id, "disallowed by robots.txt")?;
                report.blocked += 1;
                continue;
            }

            if !rate.sliding_window_allow(
                &job.domain,
                self.config.window_seconds,
                self.config.max_requests_per_window,
            )? {
                let scheduled_at = now + ChronoDuration::seconds(self.config.window_seconds);
                storage.requeue_with_backoff(
                    job.id,
                    scheduled_at,
                    "rate limited: domain window exceeded",
                )?;
                report.requeued += 1;
                continue;
            }

            let request = FetchRequest {
                job_id: job.id,
                url: job.normalized_url.clone(),
                domain: job.domain.clone(),
                depth: job.depth,
                max_depth: job.max_depth,
                priority: job.priority,
                retry_count: job.retry_count,
                timestamp: now,
            };
            bus::publish(storage, Topic::CrawlRequests, &job.domain, &request)?;
            storage.mark_in_progress(job.id)?;
            report.emitted += 1;
        }

        Ok(report)
    }

    async fn robots_for_domain(
        &self,
        storage: &mut SqliteStorage,
        domain: &str,
    ) -> Result<ParsedRobots, SchedulerError> {
        let profile = storage.get_or_create_domain_profile(domain)?;
        let fresh = profile
            .robots_txt_expires_at
            .map(|expires_at| expires_at > Utc::now())
            .unwrap_or(false);

        if fresh {
            if let Some(content) = profile.robots_txt_content {
                return Ok(ParsedRobots::from_content(&content));
            }
        }

        let fetched = robots::fetch_robots(domain, &self.config.user_agent)
            .await
            .unwrap_or_else(|_| ParsedRobots::allow_all());
        let crawl_delay = fetched.crawl_delay(&self.config.user_agent);
        let now = Utc::now();
        storage.update_domain_robots(
            domain,
            fetched.raw_content(),
            now,
            now + ROBOTS_TTL,
            crawl_delay,
        )?;
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::KvStore;
    use crate::storage::NewCrawlJob;
    use std::sync::Arc;

    fn storage_with_job(domain: &str) -> SqliteStorage {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let now = Utc::now();
        storage
            .insert_crawl_job(&NewCrawlJob {
                url: format!("https://{domain}/"),
                url_hash: "hash1".to_string(),
                normalized_url: format!("https://{domain}/"),
                domain: domain.to_string(),
                priority: 1.0,
                depth: 0,
                max_depth: 3,
                max_retries: 3,
                scheduled_at: now,
                created_at: now,
            })
            .unwrap();
        storage
    }

    #[tokio::test]
    async fn test_tick_requeues_when_rate_limited() {
        let mut storage = storage_with_job("a.com");
        let kv = Arc::new(KvStore::open_in_memory().unwrap());
        let rate = RateController::new(kv);

        let scheduler = Scheduler::new(SchedulerConfig {
            max_requests_per_window: 0,
            ..SchedulerConfig::default()
        });

        let report = scheduler.tick(&mut storage, &rate).await.unwrap();
        assert_eq!(report.polled, 1);
        assert_eq!(report.requeued, 1);
        assert_eq!(report.emitted, 0);
    }
}
