//! Database schema definitions and migrations
//!
//! This module contains all SQL schema definitions for the Sumi-Ripple database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Ingestion-core state store (spec section 6)

CREATE TABLE IF NOT EXISTS crawl_urls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    url_hash TEXT NOT NULL UNIQUE,
    normalized_url TEXT NOT NULL,
    domain TEXT NOT NULL,
    status TEXT NOT NULL,
    priority REAL NOT NULL DEFAULT 0,
    depth INTEGER NOT NULL DEFAULT 0,
    max_depth INTEGER NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    max_retries INTEGER NOT NULL DEFAULT 3,
    scheduled_at TEXT NOT NULL,
    crawled_at TEXT,
    last_error TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_urls_poll
    ON crawl_urls(status, priority DESC, scheduled_at ASC);
CREATE INDEX IF NOT EXISTS idx_crawl_urls_domain ON crawl_urls(domain);

CREATE TABLE IF NOT EXISTS crawl_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    crawl_url_id INTEGER NOT NULL REFERENCES crawl_urls(id),
    url TEXT NOT NULL,
    status_code INTEGER,
    content_type TEXT,
    content_size_bytes INTEGER,
    content_hash TEXT,
    crawled_at TEXT NOT NULL,
    duration_ms INTEGER,
    outbound_links_count INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    error_type TEXT,
    duplicate_of TEXT
);

CREATE INDEX IF NOT EXISTS idx_crawl_history_url_id ON crawl_history(crawl_url_id);

CREATE TABLE IF NOT EXISTS domain_metadata (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL UNIQUE,
    robots_txt_content TEXT,
    robots_txt_fetched_at TEXT,
    robots_txt_expires_at TEXT,
    crawl_delay_seconds REAL,
    disallowed_paths TEXT,
    sitemap_urls TEXT,
    total_urls_discovered INTEGER NOT NULL DEFAULT 0,
    total_urls_crawled INTEGER NOT NULL DEFAULT 0,
    total_urls_failed INTEGER NOT NULL DEFAULT 0,
    last_crawl_at TEXT,
    requests_per_minute REAL NOT NULL DEFAULT 0,
    domain_authority_score REAL NOT NULL DEFAULT 0.5,
    avg_content_quality REAL NOT NULL DEFAULT 0.0
);

CREATE TABLE IF NOT EXISTS page_graph (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    url_hash TEXT NOT NULL UNIQUE,
    pagerank_score REAL NOT NULL DEFAULT 0,
    previous_score REAL NOT NULL DEFAULT 0,
    inbound_links_count INTEGER NOT NULL DEFAULT 0,
    outbound_links_count INTEGER NOT NULL DEFAULT 0,
    last_calculated_at TEXT
);

CREATE TABLE IF NOT EXISTS page_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_page_id INTEGER NOT NULL REFERENCES page_graph(id),
    target_page_id INTEGER NOT NULL REFERENCES page_graph(id),
    anchor_text TEXT,
    UNIQUE(source_page_id, target_page_id)
);

CREATE INDEX IF NOT EXISTS idx_page_links_source ON page_links(source_page_id);
CREATE INDEX IF NOT EXISTS idx_page_links_target ON page_links(target_page_id);

-- Durable bus outbox tables (section 2 of the full specification)

CREATE TABLE IF NOT EXISTS bus_crawl_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    partition_key TEXT NOT NULL,
    payload TEXT NOT NULL,
    delivered INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bus_pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    partition_key TEXT NOT NULL,
    payload TEXT NOT NULL,
    delivered INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bus_new_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    partition_key TEXT NOT NULL,
    payload TEXT NOT NULL,
    delivered INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bus_dead_letter (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    original_topic TEXT NOT NULL,
    payload TEXT NOT NULL,
    failure_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    created_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Gets the current schema version
///
/// This can be used for future migrations if the schema changes.
pub fn get_schema_version() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_initializes() {
        let conn = Connection::open_in_memory().unwrap();
        let result = initialize_schema(&conn);
        assert!(result.is_ok());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // Initialize twice
        initialize_schema(&conn).unwrap();
        let result = initialize_schema(&conn);

        // Should succeed the second time too
        assert!(result.is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let tables = vec![
            "crawl_urls",
            "crawl_history",
            "domain_metadata",
            "page_graph",
            "page_links",
            "bus_crawl_requests",
            "bus_pages",
            "bus_new_links",
            "bus_dead_letter",
        ];

        for table in tables {
            let count: Result<i64, _> = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='{}'",
                    table
                ),
                [],
                |row| row.get(0),
            );
            assert!(count.is_ok());
            assert_eq!(count.unwrap(), 1, "Table {} should exist", table);
        }
    }
}
