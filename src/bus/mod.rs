//! Durable message bus (§6): realized as SQLite outbox tables rather than
//! an external broker, per the architectural decision in the full
//! specification's bus-and-KV-realization section. Each topic is a table
//! of pending payloads; `publish` inserts, `poll` reads undelivered rows
//! oldest-first, `ack` marks delivered, `dead_letter` reroutes exhausted
//! messages. A `tokio::sync::Notify` wakes waiting consumers without
//! polling on an interval.

use crate::storage::SqliteStorage;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("payload serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type BusResult<T> = Result<T, BusError>;

/// FetchRequest message on the `crawl-requests` topic (§6), key = registrable
/// domain so the bus partitions fetches per domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub job_id: i64,
    pub url: String,
    pub domain: String,
    pub depth: u32,
    pub max_depth: u32,
    pub priority: f64,
    pub retry_count: u32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// ContentEvent on the `pages` topic, key = canonical URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentEvent {
    pub url: String,
    pub title: String,
    pub meta_description: Option<String>,
    pub text: String,
    pub html_len: usize,
    pub outbound_links: Vec<String>,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub language: String,
    pub crawled_at: chrono::DateTime<chrono::Utc>,
    pub content_hash: String,
}

/// LinkDiscoveryEvent on the `new-links` topic, key = target registrable domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkDiscoveryEvent {
    pub url: String,
    pub source_url: String,
    pub domain: String,
    pub anchor: Option<String>,
    pub depth: u32,
    pub is_main_content: bool,
    pub discovered_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    CrawlRequests,
    Pages,
    NewLinks,
}

impl Topic {
    fn table(&self) -> &'static str {
        match self {
            Self::CrawlRequests => "bus_crawl_requests",
            Self::Pages => "bus_pages",
            Self::NewLinks => "bus_new_links",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::CrawlRequests => "crawl-requests",
            Self::Pages => "pages",
            Self::NewLinks => "new-links",
        }
    }
}

/// A delivered-but-unacked message; the caller acks on terminal outcome
/// (manual commit semantics per §6).
pub struct Delivery<T> {
    pub id: i64,
    pub payload: T,
}

/// Process-local wake-up signal so consumers don't busy-poll the outbox.
#[derive(Default)]
pub struct BusSignal {
    notify: Notify,
}

impl BusSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { notify: Notify::new() })
    }

    pub fn wake(&self) {
        self.notify.notify_waiters();
    }

    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

pub fn publish(
    storage: &mut SqliteStorage,
    topic: Topic,
    partition_key: &str,
    payload: &impl Serialize,
) -> BusResult<i64> {
    let json = serde_json::to_string(payload)?;
    storage.conn_mut().execute(
        &format!(
            "INSERT INTO {} (partition_key, payload, delivered, created_at) VALUES (?1, ?2, 0, ?3)",
            topic.table()
        ),
        params![partition_key, json, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(storage.conn().last_insert_rowid())
}

/// Polls up to `limit` undelivered messages oldest-first. Does not mark
/// them delivered — that happens on `ack`, after the consumer's terminal
/// outcome (at-least-once; a crash between poll and ack redelivers).
pub fn poll<T: for<'de> Deserialize<'de>>(
    storage: &SqliteStorage,
    topic: Topic,
    limit: u32,
) -> BusResult<Vec<Delivery<T>>> {
    let mut stmt = storage.conn().prepare(&format!(
        "SELECT id, payload FROM {} WHERE delivered = 0 ORDER BY id ASC LIMIT ?1",
        topic.table()
    ))?;
    let rows = stmt.query_map(params![limit], |row| {
        let id: i64 = row.get(0)?;
        let payload: String = row.get(1)?;
        Ok((id, payload))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, payload) = row?;
        let parsed: T = serde_json::from_str(&payload)?;
        out.push(Delivery { id, payload: parsed });
    }
    Ok(out)
}

pub fn ack(storage: &mut SqliteStorage, topic: Topic, message_id: i64) -> BusResult<()> {
    storage.conn_mut().execute(
        &format!("UPDATE {} SET delivered = 1 WHERE id = ?1", topic.table()),
        params![message_id],
    )?;
    Ok(())
}

/// Routes a message that exhausted its retry budget to the dead-letter
/// sink (§7) and acks it off the original topic.
pub fn dead_letter(
    storage: &mut SqliteStorage,
    topic: Topic,
    message_id: i64,
    failure_count: u32,
    last_error: &str,
) -> BusResult<()> {
    let payload: Option<String> = storage
        .conn()
        .query_row(
            &format!("SELECT payload FROM {} WHERE id = ?1", topic.table()),
            params![message_id],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(payload) = payload {
        storage.conn_mut().execute(
            "INSERT INTO bus_dead_letter (original_topic, payload, failure_count, last_error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                topic.name(),
                payload,
                failure_count,
                last_error,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
    }
    ack(storage, topic, message_id)
}

pub fn dead_letter_count(storage: &SqliteStorage) -> BusResult<u64> {
    let count: i64 = storage
        .conn()
        .query_row("SELECT COUNT(*) FROM bus_dead_letter", [], |row| row.get(0))?;
    Ok(count as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    fn sample_request() -> FetchRequest {
        FetchRequest {
            job_id: 1,
            url: "https://a.com/".to_string(),
            domain: "a.com".to_string(),
            depth: 0,
            max_depth: 3,
            priority: 1.0,
            retry_count: 0,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_publish_then_poll() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        publish(&mut storage, Topic::CrawlRequests, "a.com", &sample_request()).unwrap();

        let delivered: Vec<Delivery<FetchRequest>> =
            poll(&storage, Topic::CrawlRequests, 10).unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].payload.domain, "a.com");
    }

    #[test]
    fn test_ack_removes_from_poll() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        publish(&mut storage, Topic::CrawlRequests, "a.com", &sample_request()).unwrap();
        let delivered: Vec<Delivery<FetchRequest>> =
            poll(&storage, Topic::CrawlRequests, 10).unwrap();
        ack(&mut storage, Topic::CrawlRequests, delivered[0].id).unwrap();

        let after: Vec<Delivery<FetchRequest>> = poll(&storage, Topic::CrawlRequests, 10).unwrap();
        assert!(after.is_empty());
    }

    #[test]
    fn test_dead_letter_routes_and_counts() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        publish(&mut storage, Topic::CrawlRequests, "a.com", &sample_request()).unwrap();
        let delivered: Vec<Delivery<FetchRequest>> =
            poll(&storage, Topic::CrawlRequests, 10).unwrap();

        dead_letter(&mut storage, Topic::CrawlRequests, delivered[0].id, 3, "timeout").unwrap();

        assert_eq!(dead_letter_count(&storage).unwrap(), 1);
        let after: Vec<Delivery<FetchRequest>> = poll(&storage, Topic::CrawlRequests, 10).unwrap();
        assert!(after.is_empty());
    }
}
