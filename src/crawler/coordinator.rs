//! Crawler coordinator - main crawl orchestration logic
//!
//! Wires the ingestion core's stages together: Scheduler -> bus -> Fetcher
//! workers -> bus -> {Indexer, Link ingestor} -> periodic Ranker. Each stage
//! owns its own KV/state-store access per §5's concurrency model; this
//! module just drives them in sequence within a single process.

use crate::admin::{self, SeedRequest};
use crate::bus::{self, ContentEvent, FetchRequest, LinkDiscoveryEvent, Topic};
use crate::config::Config;
use crate::crawler::fetcher::{build_http_client, FetcherWorker};
use crate::crawler::scheduler::{Scheduler, SchedulerConfig};
use crate::dedup::{ContentDedupIndex, UrlDedupIndex};
use crate::frontier::Strategy;
use crate::indexer::{Indexer, InMemorySink};
use crate::kv::KvStore;
use crate::link_ingestor::LinkIngestor;
use crate::ranker::{self, RankerConfig};
use crate::rate::RateController;
use crate::storage::SqliteStorage;
use crate::SumiError;
use chrono::Utc;
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;

/// How many ticks with nothing polled and nothing in-flight before the
/// drain loop considers the crawl complete.
const IDLE_TICKS_BEFORE_STOP: u32 = 3;

/// Orchestrates one full crawl run over a process-local pipeline.
pub struct Coordinator {
    storage: SqliteStorage,
    rate: RateController,
    url_dedup: UrlDedupIndex,
    content_dedup: ContentDedupIndex,
    scheduler: Scheduler,
    http_client: Client,
    strategy: Strategy,
    max_depth: u32,
    max_retries: u32,
    fetch_concurrency: usize,
    allowlisted_domains: Vec<String>,
    /// Sink for the Indexer's WebDocuments. The real full-text store is an
    /// external collaborator out of this crate's scope (§1 Non-goals); this
    /// in-memory sink stands in for it.
    sink: InMemorySink,
}

impl Coordinator {
    pub fn new(config: &Config) -> Result<Self, SumiError> {
        let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;

        let kv_path = format!("{}.kv", config.output.database_path);
        let kv_conn = rusqlite::Connection::open(&kv_path)?;
        let kv = Arc::new(KvStore::new(kv_conn)?);

        let ingestion = &config.ingestion;
        let url_dedup = UrlDedupIndex::new(kv.clone(), ingestion.bloom_capacity, ingestion.bloom_fpr);
        let content_dedup = ContentDedupIndex::new(
            kv.clone(),
            ingestion.simhash_hamming_threshold,
            ingestion.lsh_bands,
            ingestion.lsh_band_bits,
        );
        let rate = RateController::new(kv);

        let strategy = Strategy::from_config_str(&ingestion.strategy).unwrap_or(Strategy::Bfs);
        let scheduler_config = SchedulerConfig {
            batch_size: ingestion.scheduler_batch,
            window_seconds: ingestion.window_seconds,
            max_requests_per_window: ingestion.max_requests_per_window,
            user_agent: user_agent_string(config),
            ..SchedulerConfig::default()
        };

        Ok(Self {
            storage,
            rate,
            url_dedup,
            content_dedup,
            scheduler: Scheduler::new(scheduler_config),
            http_client: build_http_client(&config.user_agent).map_err(SumiError::Reqwest)?,
            strategy,
            max_depth: config.crawler.max_depth,
            max_retries: ingestion.max_retries,
            fetch_concurrency: ingestion.fetch_concurrency as usize,
            allowlisted_domains: config.quality.iter().map(|q| q.domain.clone()).collect(),
            sink: InMemorySink::default(),
        })
    }

    /// Documents indexed so far. Exposed for callers that need to hand them
    /// off to a real full-text store after the run completes.
    pub fn indexed_documents(&self) -> &[crate::indexer::WebDocument] {
        &self.sink.documents
    }

    /// Enqueues every configured quality-domain seed into the Frontier.
    pub fn seed(&mut self, config: &Config) -> Result<u32, SumiError> {
        let seeds: Vec<SeedRequest> = config
            .quality
            .iter()
            .flat_map(|entry| {
                entry.seeds.iter().map(|s| SeedRequest {
                    url: s.clone(),
                    priority_hint: None,
                })
            })
            .collect();
        Ok(admin::add_seeds(
            &mut self.storage,
            self.strategy,
            self.max_depth,
            self.max_retries,
            &seeds,
        )?)
    }

    /// Drives the pipeline until the Frontier and bus both drain and stay
    /// empty for `IDLE_TICKS_BEFORE_STOP` consecutive ticks, then runs a
    /// final PageRank pass. Honors Ctrl-C as the shutdown signal (§4.6):
    /// in-flight bus writes for the current tick are allowed to finish
    /// before the loop exits.
    pub async fn run_until_drained(&mut self, ranker_config: &RankerConfig) -> Result<(), SumiError> {
        let shutdown = Arc::new(std::sync::atomic::AtomicBool::new(false));
        {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    shutdown.store(true, std::sync::atomic::Ordering::SeqCst);
                }
            });
        }

        let mut idle_ticks = 0;

        loop {
            if shutdown.load(std::sync::atomic::Ordering::SeqCst) {
                tracing::info!("shutdown signal received, draining in-flight work");
                break;
            }

            let tick = self.scheduler.tick(&mut self.storage, &self.rate).await?;
            let fetched = self.drain_fetch_requests().await?;
            let linked = self.drain_new_links()?;
            let indexed = self.drain_content()?;

            let idle = tick.polled == 0 && fetched == 0 && linked == 0 && indexed == 0;
            idle_ticks = if idle { idle_ticks + 1 } else { 0 };

            if idle_ticks >= IDLE_TICKS_BEFORE_STOP {
                break;
            }
        }

        ranker::run(&mut self.storage, ranker_config)?;
        Ok(())
    }

    async fn drain_fetch_requests(&mut self) -> Result<usize, SumiError> {
        let deliveries = bus::poll::<FetchRequest>(
            &self.storage,
            Topic::CrawlRequests,
            self.fetch_concurrency as u32,
        )?;
        let worker = FetcherWorker {
            client: &self.http_client,
            rate: &self.rate,
            user_agent: self.scheduler.config().user_agent.clone(),
            max_retries: self.max_retries,
        };

        let count = deliveries.len();
        for delivery in deliveries {
            worker
                .process(
                    &mut self.storage,
                    &self.content_dedup,
                    delivery.id,
                    &delivery.payload,
                )
                .await?;
        }
        Ok(count)
    }

    fn drain_new_links(&mut self) -> Result<usize, SumiError> {
        let deliveries =
            bus::poll::<LinkDiscoveryEvent>(&self.storage, Topic::NewLinks, 500)?;
        let count = deliveries.len();
        let now = Utc::now();

        for delivery in deliveries {
            let mut ingestor = LinkIngestor::new(
                &mut self.storage,
                &self.url_dedup,
                self.strategy,
                self.max_depth,
                self.max_retries,
                &self.allowlisted_domains,
            );
            ingestor.ingest(&delivery.payload.url, delivery.payload.depth, now)?;
            bus::ack(&mut self.storage, Topic::NewLinks, delivery.id)?;
        }
        Ok(count)
    }

    fn drain_content(&mut self) -> Result<usize, SumiError> {
        let deliveries = bus::poll::<ContentEvent>(&self.storage, Topic::Pages, 500)?;
        let count = deliveries.len();

        for delivery in deliveries {
            let mut indexer = Indexer::new(&mut self.storage, &mut self.sink);
            indexer
                .index(&delivery.payload)
                .map_err(|e| SumiError::Storage(e.to_string()))?;
            bus::ack(&mut self.storage, Topic::Pages, delivery.id)?;
        }
        Ok(count)
    }
}

fn user_agent_string(config: &Config) -> String {
    format!(
        "{}/{} (+{}; {})",
        config.user_agent.crawler_name,
        config.user_agent.crawler_version,
        config.user_agent.contact_url,
        config.user_agent.contact_email
    )
}

/// Runs a complete crawl operation: open storage, seed the Frontier from
/// configured quality domains, drive the pipeline to completion.
pub async fn run_crawl(config: Config) -> Result<(), SumiError> {
    let ranker_config = RankerConfig {
        damping: config.ingestion.damping,
        convergence_epsilon: config.ingestion.convergence_epsilon,
        max_iterations: config.ingestion.max_iterations,
    };
    let mut coordinator = Coordinator::new(&config)?;
    let created = coordinator.seed(&config)?;
    tracing::info!("seeded {} crawl jobs", created);
    coordinator.run_until_drained(&ranker_config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CrawlerConfig, OutputConfig, QualityEntry, UserAgentConfig};
    use tempfile::TempDir;

    fn create_test_config(dir: &TempDir) -> Config {
        Config {
            crawler: CrawlerConfig {
                max_depth: 2,
                max_concurrent_pages_open: 5,
                minimum_time_on_page: 1000,
                max_domain_requests: 100,
            },
            user_agent: UserAgentConfig {
                crawler_name: "TestCrawler".to_string(),
                crawler_version: "1.0".to_string(),
                contact_url: "https://example.com/about".to_string(),
                contact_email: "admin@example.com".to_string(),
            },
            output: OutputConfig {
                database_path: dir.path().join("test.db").to_string_lossy().to_string(),
                summary_path: dir.path().join("summary.md").to_string_lossy().to_string(),
            },
            quality: vec![QualityEntry {
                domain: "example.com".to_string(),
                seeds: vec!["https://example.com/".to_string()],
            }],
            blacklist: vec![],
            stub: vec![],
            ingestion: Default::default(),
        }
    }

    #[test]
    fn test_coordinator_seeds_frontier() {
        let dir = TempDir::new().unwrap();
        let config = create_test_config(&dir);
        let mut coordinator = Coordinator::new(&config).unwrap();
        let created = coordinator.seed(&config).unwrap();
        assert_eq!(created, 1);
    }
}
