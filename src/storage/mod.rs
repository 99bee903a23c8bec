//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the ingestion pipeline:
//! - SQLite database initialization and schema management
//! - Crawl job / domain profile / page graph persistence (`IngestionStore`)
//! - Durable bus outbox tables

mod ingestion;
mod schema;
mod sqlite;
mod traits;

pub use ingestion::{
    CrawlHistoryRecord, CrawlJob, CrawlJobStatus, DomainProfile, IngestionStore, NewCrawlJob,
    PageNode,
};
pub use sqlite::{init_database, SqliteStorage};
pub use traits::{StorageError, StorageResult};

use crate::SumiError;

use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(SumiError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, SumiError> {
    SqliteStorage::new(path)
}
