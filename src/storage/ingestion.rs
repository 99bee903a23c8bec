//! State-store entities for the ingestion core (§3, §6): CrawlJob,
//! DomainProfile, PageNode, LinkEdge, CrawlHistoryRecord.

use crate::storage::{SqliteStorage, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlJobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Blocked,
}

impl CrawlJobStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Blocked => "BLOCKED",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "BLOCKED" => Some(Self::Blocked),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Blocked)
    }
}

#[derive(Debug, Clone)]
pub struct CrawlJob {
    pub id: i64,
    pub url: String,
    pub url_hash: String,
    pub normalized_url: String,
    pub domain: String,
    pub status: CrawlJobStatus,
    pub priority: f64,
    pub depth: u32,
    pub max_depth: u32,
    pub retry_count: u32,
    pub max_retries: u32,
    pub scheduled_at: DateTime<Utc>,
    pub crawled_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct DomainProfile {
    pub domain: String,
    pub robots_txt_content: Option<String>,
    pub robots_txt_fetched_at: Option<DateTime<Utc>>,
    pub robots_txt_expires_at: Option<DateTime<Utc>>,
    pub crawl_delay_seconds: Option<f64>,
    pub disallowed_paths: Vec<String>,
    pub sitemap_urls: Vec<String>,
    pub total_urls_discovered: u64,
    pub total_urls_crawled: u64,
    pub total_urls_failed: u64,
    pub last_crawl_at: Option<DateTime<Utc>>,
    pub requests_per_minute: f64,
    pub domain_authority_score: f64,
    pub avg_content_quality: f64,
}

#[derive(Debug, Clone)]
pub struct PageNode {
    pub id: i64,
    pub url: String,
    pub url_hash: String,
    pub pagerank_score: f64,
    pub previous_score: f64,
    pub inbound_links_count: u64,
    pub outbound_links_count: u64,
    pub last_calculated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CrawlHistoryRecord {
    pub crawl_url_id: i64,
    pub url: String,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub content_size_bytes: Option<u64>,
    pub content_hash: Option<String>,
    pub crawled_at: DateTime<Utc>,
    pub duration_ms: Option<u64>,
    pub outbound_links_count: u32,
    pub error_message: Option<String>,
    pub error_type: Option<String>,
    pub duplicate_of: Option<String>,
}

/// State-store operations for CrawlJob/DomainProfile/PageNode/LinkEdge,
/// layered onto `SqliteStorage` alongside the legacy `Storage` trait.
pub trait IngestionStore {
    fn insert_crawl_job(&mut self, job: &NewCrawlJob) -> StorageResult<i64>;
    fn get_crawl_job_by_hash(&self, url_hash: &str) -> StorageResult<Option<CrawlJob>>;
    fn poll_ready_jobs(&self, limit: u32, now: DateTime<Utc>) -> StorageResult<Vec<CrawlJob>>;
    fn mark_in_progress(&mut self, job_id: i64) -> StorageResult<()>;
    fn mark_completed(&mut self, job_id: i64, crawled_at: DateTime<Utc>) -> StorageResult<()>;
    fn mark_blocked(&mut self, job_id: i64, reason: &str) -> StorageResult<()>;
    fn requeue_with_backoff(
        &mut self,
        job_id: i64,
        scheduled_at: DateTime<Utc>,
        error: &str,
    ) -> StorageResult<()>;
    fn fail_job(&mut self, job_id: i64, error: &str) -> StorageResult<()>;

    fn get_or_create_domain_profile(&mut self, domain: &str) -> StorageResult<DomainProfile>;
    fn update_domain_robots(
        &mut self,
        domain: &str,
        content: &str,
        fetched_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        crawl_delay: Option<f64>,
    ) -> StorageResult<()>;
    fn increment_domain_counters(
        &mut self,
        domain: &str,
        discovered: u64,
        crawled: u64,
        failed: u64,
    ) -> StorageResult<()>;

    fn insert_or_get_page_node(&mut self, url: &str, url_hash: &str) -> StorageResult<i64>;
    fn insert_link_edge(
        &mut self,
        source_page_id: i64,
        target_page_id: i64,
        anchor_text: Option<&str>,
    ) -> StorageResult<()>;
    fn all_page_nodes(&self) -> StorageResult<Vec<PageNode>>;
    fn all_link_edges(&self) -> StorageResult<Vec<(i64, i64)>>;
    fn update_pagerank(&mut self, page_id: i64, score: f64, previous: f64) -> StorageResult<()>;

    fn insert_crawl_history(&mut self, record: &CrawlHistoryRecord) -> StorageResult<()>;

    fn count_jobs_by_status(&self) -> StorageResult<Vec<(String, u64)>>;
    fn frontier_size(&self) -> StorageResult<u64>;
}

#[derive(Debug, Clone)]
pub struct NewCrawlJob {
    pub url: String,
    pub url_hash: String,
    pub normalized_url: String,
    pub domain: String,
    pub priority: f64,
    pub depth: u32,
    pub max_depth: u32,
    pub max_retries: u32,
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

fn row_to_crawl_job(row: &rusqlite::Row) -> rusqlite::Result<CrawlJob> {
    let status_str: String = row.get("status")?;
    let scheduled_at: String = row.get("scheduled_at")?;
    let crawled_at: Option<String> = row.get("crawled_at")?;
    let created_at: String = row.get("created_at")?;

    Ok(CrawlJob {
        id: row.get("id")?,
        url: row.get("url")?,
        url_hash: row.get("url_hash")?,
        normalized_url: row.get("normalized_url")?,
        domain: row.get("domain")?,
        status: CrawlJobStatus::from_db_str(&status_str).unwrap_or(CrawlJobStatus::Pending),
        priority: row.get("priority")?,
        depth: row.get::<_, i64>("depth")? as u32,
        max_depth: row.get::<_, i64>("max_depth")? as u32,
        retry_count: row.get::<_, i64>("retry_count")? as u32,
        max_retries: row.get::<_, i64>("max_retries")? as u32,
        scheduled_at: DateTime::parse_from_rfc3339(&scheduled_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        crawled_at: crawled_at.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|d| d.with_timezone(&Utc))
        }),
        last_error: row.get("last_error")?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

impl IngestionStore for SqliteStorage {
    fn insert_crawl_job(&mut self, job: &NewCrawlJob) -> StorageResult<i64> {
        self.conn_mut().execute(
            "INSERT INTO crawl_urls
                (url, url_hash, normalized_url, domain, status, priority, depth, max_depth,
                 retry_count, max_retries, scheduled_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10, ?11)",
            params![
                job.url,
                job.url_hash,
                job.normalized_url,
                job.domain,
                CrawlJobStatus::Pending.as_db_str(),
                job.priority,
                job.depth,
                job.max_depth,
                job.max_retries,
                job.scheduled_at.to_rfc3339(),
                job.created_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    fn get_crawl_job_by_hash(&self, url_hash: &str) -> StorageResult<Option<CrawlJob>> {
        self.conn()
            .query_row(
                "SELECT * FROM crawl_urls WHERE url_hash = ?1",
                params![url_hash],
                row_to_crawl_job,
            )
            .optional()
            .map_err(StorageError::from)
    }

    fn poll_ready_jobs(&self, limit: u32, now: DateTime<Utc>) -> StorageResult<Vec<CrawlJob>> {
        let mut stmt = self.conn().prepare(
            "SELECT * FROM crawl_urls
             WHERE status = ?1 AND scheduled_at <= ?2
             ORDER BY priority DESC, scheduled_at ASC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            params![CrawlJobStatus::Pending.as_db_str(), now.to_rfc3339(), limit],
            row_to_crawl_job,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn mark_in_progress(&mut self, job_id: i64) -> StorageResult<()> {
        self.conn_mut().execute(
            "UPDATE crawl_urls SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![
                CrawlJobStatus::InProgress.as_db_str(),
                job_id,
                CrawlJobStatus::Pending.as_db_str()
            ],
        )?;
        Ok(())
    }

    fn mark_completed(&mut self, job_id: i64, crawled_at: DateTime<Utc>) -> StorageResult<()> {
        self.conn_mut().execute(
            "UPDATE crawl_urls SET status = ?1, crawled_at = ?2 WHERE id = ?3",
            params![
                CrawlJobStatus::Completed.as_db_str(),
                crawled_at.to_rfc3339(),
                job_id
            ],
        )?;
        Ok(())
    }

    fn mark_blocked(&mut self, job_id: i64, reason: &str) -> StorageResult<()> {
        self.conn_mut().execute(
            "UPDATE crawl_urls SET status = ?1, last_error = ?2 WHERE id = ?3",
            params![CrawlJobStatus::Blocked.as_db_str(), reason, job_id],
        )?;
        Ok(())
    }

    fn requeue_with_backoff(
        &mut self,
        job_id: i64,
        scheduled_at: DateTime<Utc>,
        error: &str,
    ) -> StorageResult<()> {
        self.conn_mut().execute(
            "UPDATE crawl_urls
             SET status = ?1, scheduled_at = ?2, retry_count = retry_count + 1, last_error = ?3
             WHERE id = ?4",
            params![
                CrawlJobStatus::Pending.as_db_str(),
                scheduled_at.to_rfc3339(),
                error,
                job_id
            ],
        )?;
        Ok(())
    }

    fn fail_job(&mut self, job_id: i64, error: &str) -> StorageResult<()> {
        self.conn_mut().execute(
            "UPDATE crawl_urls SET status = ?1, last_error = ?2 WHERE id = ?3",
            params![CrawlJobStatus::Failed.as_db_str(), error, job_id],
        )?;
        Ok(())
    }

    fn get_or_create_domain_profile(&mut self, domain: &str) -> StorageResult<DomainProfile> {
        let existing: Option<DomainProfile> = self
            .conn()
            .query_row(
                "SELECT domain, robots_txt_content, robots_txt_fetched_at, robots_txt_expires_at,
                        crawl_delay_seconds, disallowed_paths, sitemap_urls,
                        total_urls_discovered, total_urls_crawled, total_urls_failed,
                        last_crawl_at, requests_per_minute, domain_authority_score, avg_content_quality
                 FROM domain_metadata WHERE domain = ?1",
                params![domain],
                row_to_domain_profile,
            )
            .optional()?;

        if let Some(profile) = existing {
            return Ok(profile);
        }

        self.conn_mut().execute(
            "INSERT INTO domain_metadata (domain) VALUES (?1)",
            params![domain],
        )?;
        Ok(DomainProfile {
            domain: domain.to_string(),
            domain_authority_score: 0.5,
            ..Default::default()
        })
    }

    fn update_domain_robots(
        &mut self,
        domain: &str,
        content: &str,
        fetched_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        crawl_delay: Option<f64>,
    ) -> StorageResult<()> {
        self.conn_mut().execute(
            "UPDATE domain_metadata
             SET robots_txt_content = ?1, robots_txt_fetched_at = ?2, robots_txt_expires_at = ?3,
                 crawl_delay_seconds = ?4
             WHERE domain = ?5",
            params![
                content,
                fetched_at.to_rfc3339(),
                expires_at.to_rfc3339(),
                crawl_delay,
                domain
            ],
        )?;
        Ok(())
    }

    fn increment_domain_counters(
        &mut self,
        domain: &str,
        discovered: u64,
        crawled: u64,
        failed: u64,
    ) -> StorageResult<()> {
        self.conn_mut().execute(
            "UPDATE domain_metadata
             SET total_urls_discovered = total_urls_discovered + ?1,
                 total_urls_crawled = total_urls_crawled + ?2,
                 total_urls_failed = total_urls_failed + ?3,
                 last_crawl_at = ?4
             WHERE domain = ?5",
            params![
                discovered as i64,
                crawled as i64,
                failed as i64,
                Utc::now().to_rfc3339(),
                domain
            ],
        )?;
        Ok(())
    }

    fn insert_or_get_page_node(&mut self, url: &str, url_hash: &str) -> StorageResult<i64> {
        if let Some(id) = self
            .conn()
            .query_row(
                "SELECT id FROM page_graph WHERE url_hash = ?1",
                params![url_hash],
                |row| row.get(0),
            )
            .optional()?
        {
            return Ok(id);
        }

        self.conn_mut().execute(
            "INSERT INTO page_graph (url, url_hash) VALUES (?1, ?2)",
            params![url, url_hash],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    fn insert_link_edge(
        &mut self,
        source_page_id: i64,
        target_page_id: i64,
        anchor_text: Option<&str>,
    ) -> StorageResult<()> {
        let inserted = self.conn_mut().execute(
            "INSERT OR IGNORE INTO page_links (source_page_id, target_page_id, anchor_text)
             VALUES (?1, ?2, ?3)",
            params![source_page_id, target_page_id, anchor_text],
        )?;
        if inserted > 0 {
            self.conn_mut().execute(
                "UPDATE page_graph SET outbound_links_count = outbound_links_count + 1 WHERE id = ?1",
                params![source_page_id],
            )?;
            self.conn_mut().execute(
                "UPDATE page_graph SET inbound_links_count = inbound_links_count + 1 WHERE id = ?1",
                params![target_page_id],
            )?;
        }
        Ok(())
    }

    fn all_page_nodes(&self) -> StorageResult<Vec<PageNode>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, url, url_hash, pagerank_score, previous_score,
                    inbound_links_count, outbound_links_count, last_calculated_at
             FROM page_graph",
        )?;
        let rows = stmt.query_map([], |row| {
            let last_calculated_at: Option<String> = row.get(7)?;
            Ok(PageNode {
                id: row.get(0)?,
                url: row.get(1)?,
                url_hash: row.get(2)?,
                pagerank_score: row.get(3)?,
                previous_score: row.get(4)?,
                inbound_links_count: row.get::<_, i64>(5)? as u64,
                outbound_links_count: row.get::<_, i64>(6)? as u64,
                last_calculated_at: last_calculated_at.and_then(|s| {
                    DateTime::parse_from_rfc3339(&s)
                        .ok()
                        .map(|d| d.with_timezone(&Utc))
                }),
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn all_link_edges(&self) -> StorageResult<Vec<(i64, i64)>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT source_page_id, target_page_id FROM page_links")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn update_pagerank(&mut self, page_id: i64, score: f64, previous: f64) -> StorageResult<()> {
        self.conn_mut().execute(
            "UPDATE page_graph
             SET pagerank_score = ?1, previous_score = ?2, last_calculated_at = ?3
             WHERE id = ?4",
            params![score, previous, Utc::now().to_rfc3339(), page_id],
        )?;
        Ok(())
    }

    fn insert_crawl_history(&mut self, record: &CrawlHistoryRecord) -> StorageResult<()> {
        self.conn_mut().execute(
            "INSERT INTO crawl_history
                (crawl_url_id, url, status_code, content_type, content_size_bytes, content_hash,
                 crawled_at, duration_ms, outbound_links_count, error_message, error_type, duplicate_of)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.crawl_url_id,
                record.url,
                record.status_code.map(|c| c as i64),
                record.content_type,
                record.content_size_bytes.map(|c| c as i64),
                record.content_hash,
                record.crawled_at.to_rfc3339(),
                record.duration_ms.map(|d| d as i64),
                record.outbound_links_count,
                record.error_message,
                record.error_type,
                record.duplicate_of,
            ],
        )?;
        Ok(())
    }

    fn count_jobs_by_status(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT status, COUNT(*) FROM crawl_urls GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            let count: i64 = row.get(1)?;
            Ok((row.get::<_, String>(0)?, count as u64))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn frontier_size(&self) -> StorageResult<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM crawl_urls WHERE status = ?1",
            params![CrawlJobStatus::Pending.as_db_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn row_to_domain_profile(row: &rusqlite::Row) -> rusqlite::Result<DomainProfile> {
    let disallowed_paths: Option<String> = row.get(5)?;
    let sitemap_urls: Option<String> = row.get(6)?;
    let robots_fetched_at: Option<String> = row.get(2)?;
    let robots_expires_at: Option<String> = row.get(3)?;
    let last_crawl_at: Option<String> = row.get(10)?;

    Ok(DomainProfile {
        domain: row.get(0)?,
        robots_txt_content: row.get(1)?,
        robots_txt_fetched_at: robots_fetched_at.and_then(|s| {
            DateTime::parse_from_rfc3339(&s).ok().map(|d| d.with_timezone(&Utc))
        }),
        robots_txt_expires_at: robots_expires_at.and_then(|s| {
            DateTime::parse_from_rfc3339(&s).ok().map(|d| d.with_timezone(&Utc))
        }),
        crawl_delay_seconds: row.get(4)?,
        disallowed_paths: disallowed_paths
            .map(|s| s.split('\n').filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default(),
        sitemap_urls: sitemap_urls
            .map(|s| s.split('\n').filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default(),
        total_urls_discovered: row.get::<_, i64>(7)? as u64,
        total_urls_crawled: row.get::<_, i64>(8)? as u64,
        total_urls_failed: row.get::<_, i64>(9)? as u64,
        last_crawl_at: last_crawl_at.and_then(|s| {
            DateTime::parse_from_rfc3339(&s).ok().map(|d| d.with_timezone(&Utc))
        }),
        requests_per_minute: row.get(11)?,
        domain_authority_score: row.get(12)?,
        avg_content_quality: row.get(13)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(url_hash: &str, priority: f64) -> NewCrawlJob {
        let now = Utc::now();
        NewCrawlJob {
            url: format!("https://example.com/{}", url_hash),
            url_hash: url_hash.to_string(),
            normalized_url: format!("https://example.com/{}", url_hash),
            domain: "example.com".to_string(),
            priority,
            depth: 0,
            max_depth: 3,
            max_retries: 3,
            scheduled_at: now,
            created_at: now,
        }
    }

    #[test]
    fn test_insert_and_poll_ready_orders_by_priority() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.insert_crawl_job(&job("a", 1.0)).unwrap();
        storage.insert_crawl_job(&job("b", 5.0)).unwrap();

        let ready = storage.poll_ready_jobs(10, Utc::now()).unwrap();
        assert_eq!(ready.len(), 2);
        assert_eq!(ready[0].url_hash, "b");
        assert_eq!(ready[1].url_hash, "a");
    }

    #[test]
    fn test_mark_in_progress_then_completed() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let id = storage.insert_crawl_job(&job("a", 1.0)).unwrap();
        storage.mark_in_progress(id).unwrap();
        storage.mark_completed(id, Utc::now()).unwrap();

        let job_row = storage.get_crawl_job_by_hash("a").unwrap().unwrap();
        assert_eq!(job_row.status, CrawlJobStatus::Completed);
    }

    #[test]
    fn test_domain_profile_created_lazily() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let profile = storage.get_or_create_domain_profile("example.com").unwrap();
        assert_eq!(profile.domain_authority_score, 0.5);
    }

    #[test]
    fn test_link_edge_updates_counts() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let a = storage.insert_or_get_page_node("https://a.com/", "hash-a").unwrap();
        let b = storage.insert_or_get_page_node("https://b.com/", "hash-b").unwrap();
        storage.insert_link_edge(a, b, Some("click here")).unwrap();

        let nodes = storage.all_page_nodes().unwrap();
        let a_node = nodes.iter().find(|n| n.id == a).unwrap();
        let b_node = nodes.iter().find(|n| n.id == b).unwrap();
        assert_eq!(a_node.outbound_links_count, 1);
        assert_eq!(b_node.inbound_links_count, 1);
    }
}
