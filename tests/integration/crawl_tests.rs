//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and drive the
//! Coordinator end to end over the durable bus/state-store pipeline.

use chrono::Utc;
use std::sync::Arc;
use sumi_ripple::config::{
    Config, CrawlerConfig, IngestionConfig, OutputConfig, QualityEntry, UserAgentConfig,
};
use sumi_ripple::crawler::{Coordinator, Scheduler, SchedulerConfig};
use sumi_ripple::kv::KvStore;
use sumi_ripple::rate::RateController;
use sumi_ripple::ranker::RankerConfig;
use sumi_ripple::storage::{IngestionStore, NewCrawlJob, SqliteStorage};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_test_config(quality_domain: &str, seeds: Vec<String>, db_path: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            max_depth: 2,
            max_concurrent_pages_open: 5,
            minimum_time_on_page: 10,
            max_domain_requests: 100,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            database_path: db_path.to_string(),
            summary_path: "./test_summary.md".to_string(),
        },
        quality: vec![QualityEntry {
            domain: quality_domain.to_string(),
            seeds,
        }],
        blacklist: vec![],
        stub: vec![],
        ingestion: IngestionConfig::default(),
    }
}

#[tokio::test]
async fn test_full_crawl_single_domain() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let domain = url::Url::parse(&base_url)
        .expect("Failed to parse base URL")
        .host_str()
        .expect("Failed to extract host")
        .to_string();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!(
                    r#"<html><head><title>Home</title></head><body>
                    <a href="{base_url}/page1">Page 1</a>
                    <a href="{base_url}/page2">Page 2</a>
                    </body></html>"#
                ))
                .insert_header("content-type", "text/html"),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(
                    r#"<html><head><title>Page 1</title></head><body>Content one</body></html>"#,
                )
                .insert_header("content-type", "text/html"),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(
                    r#"<html><head><title>Page 2</title></head><body>Content two</body></html>"#,
                )
                .insert_header("content-type", "text/html"),
        )
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("test.db").to_string_lossy().to_string();
    let config = create_test_config(&domain, vec![format!("{base_url}/")], &db_path);

    let mut coordinator = Coordinator::new(&config).expect("Failed to create coordinator");
    let seeded = coordinator.seed(&config).expect("Failed to seed frontier");
    assert_eq!(seeded, 1);

    coordinator
        .run_until_drained(&RankerConfig::default())
        .await
        .expect("Crawl failed");

    // The home page plus its two discovered links should all have been
    // fetched, parsed, and handed to the indexer's sink.
    assert!(
        coordinator.indexed_documents().len() >= 3,
        "expected at least 3 indexed documents, got {}",
        coordinator.indexed_documents().len()
    );

    let titles: Vec<&str> = coordinator
        .indexed_documents()
        .iter()
        .map(|doc| doc.title.as_str())
        .collect();
    assert!(titles.contains(&"Home"));
    assert!(titles.contains(&"Page 1"));
    assert!(titles.contains(&"Page 2"));
}

/// Exercises the Scheduler's robots-disallow path directly, with a
/// pre-cached robots.txt rather than a live fetch over the mock server
/// (robots fetches always go out over https, which a plain wiremock
/// server doesn't speak).
#[tokio::test]
async fn test_scheduler_blocks_disallowed_job() {
    let mut storage = SqliteStorage::new_in_memory().unwrap();
    let kv = Arc::new(KvStore::open_in_memory().unwrap());
    let rate = RateController::new(kv);

    let now = Utc::now();
    storage
        .update_domain_robots(
            "blocked.example",
            "User-agent: *\nDisallow: /admin",
            now,
            now + chrono::Duration::hours(24),
            None,
        )
        .unwrap();

    let job_id = storage
        .insert_crawl_job(&NewCrawlJob {
            url: "https://blocked.example/admin".to_string(),
            url_hash: "test-hash-admin".to_string(),
            normalized_url: "https://blocked.example/admin".to_string(),
            domain: "blocked.example".to_string(),
            priority: 0.0,
            depth: 0,
            max_depth: 2,
            max_retries: 3,
            scheduled_at: now,
            created_at: now,
        })
        .unwrap();

    let scheduler = Scheduler::new(SchedulerConfig::default());
    let report = scheduler.tick(&mut storage, &rate).await.unwrap();

    assert_eq!(report.blocked, 1);
    assert_eq!(report.emitted, 0);

    let job = storage
        .get_crawl_job_by_hash("test-hash-admin")
        .unwrap()
        .expect("job should still exist");
    assert_eq!(job.id, job_id);
    assert_eq!(job.status.as_db_str(), "BLOCKED");
}
