//! Fetcher workers (§4.7): consume FetchRequest messages, perform the HTTP
//! GET, parse HTML, run content dedup, and emit ContentEvent /
//! LinkDiscoveryEvent messages plus a CrawlHistoryRecord.

use crate::bus::{self, ContentEvent, FetchRequest, LinkDiscoveryEvent, Topic};
use crate::config::UserAgentConfig;
use crate::crawler::parser::parse_html;
use crate::dedup::{sha256_hex, ContentDedupIndex};
use crate::rate::RateController;
use crate::storage::{CrawlHistoryRecord, IngestionStore, SqliteStorage};
use chrono::Utc;
use reqwest::{redirect::Policy, Client};
use std::time::{Duration, Instant};
use thiserror::Error;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_REDIRECTS: usize = 5;
pub const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Partial-failure matrix (§4.7): network/5xx retryable, 4xx/parse/body-cap not.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("response body exceeded {0} bytes")]
    BodyTooLarge(usize),
    #[error("non-retryable HTTP status {0}")]
    HttpClientError(u16),
    #[error("retryable HTTP status {0}")]
    HttpServerError(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("html parse error: {0}")]
    Parse(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Network(_) | FetchError::HttpServerError(_))
    }
}

pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    let user_agent = format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(READ_TIMEOUT)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .build()
}

pub struct FetchedPage {
    pub final_url: String,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// A single GET with body-size enforcement (§4.7 step 3).
pub async fn fetch_once(client: &Client, url: &str) -> Result<FetchedPage, FetchError> {
    let response = client
        .get(url)
        .header("Accept", "text/html,application/xhtml+xml;q=0.9,*/*;q=0.1")
        .send()
        .await
        .map_err(|e| FetchError::Network(e.to_string()))?;

    let status = response.status();
    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    if status.is_server_error() {
        return Err(FetchError::HttpServerError(status.as_u16()));
    }
    if !status.is_success() {
        return Err(FetchError::HttpClientError(status.as_u16()));
    }

    if let Some(len) = response.content_length() {
        if len as usize > MAX_BODY_BYTES {
            return Err(FetchError::BodyTooLarge(MAX_BODY_BYTES));
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| FetchError::Network(e.to_string()))?;
    if bytes.len() > MAX_BODY_BYTES {
        return Err(FetchError::BodyTooLarge(MAX_BODY_BYTES));
    }

    Ok(FetchedPage {
        final_url,
        status_code: status.as_u16(),
        content_type,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    })
}

/// Retries retryable outcomes up to `max_retries` with exponential backoff.
pub async fn fetch_with_retry(
    client: &Client,
    url: &str,
    max_retries: u32,
) -> Result<FetchedPage, FetchError> {
    let mut attempt = 0;
    loop {
        match fetch_once(client, url).await {
            Ok(page) => return Ok(page),
            Err(err) if err.is_retryable() && attempt < max_retries => {
                let delay = Duration::from_secs(2u64.saturating_pow(attempt + 1));
                tracing::debug!(
                    "retrying {} (attempt {}/{}), waiting {:?}: {}",
                    url,
                    attempt + 1,
                    max_retries,
                    delay,
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Outcome of processing one FetchRequest, for the coordinator's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Completed,
    CompletedDuplicate,
    Failed,
    Requeued,
}

pub struct FetcherWorker<'a> {
    pub client: &'a Client,
    pub rate: &'a RateController,
    pub user_agent: String,
    pub max_retries: u32,
}

impl<'a> FetcherWorker<'a> {
    /// Processes one delivered FetchRequest end to end (§4.7 steps 1-8).
    pub async fn process(
        &self,
        storage: &mut SqliteStorage,
        dedup: &ContentDedupIndex,
        delivery_id: i64,
        request: &FetchRequest,
    ) -> Result<FetchOutcome, crate::SumiError> {
        let owner = format!("fetcher:{delivery_id}");
        if self
            .rate
            .acquire_domain_mutex(&request.domain, &owner)
            .is_err()
        {
            let backoff = crate::frontier::backoff_duration(request.retry_count);
            storage.requeue_with_backoff(
                request.job_id,
                Utc::now() + chrono::Duration::from_std(backoff).unwrap_or_default(),
                "domain mutex unavailable",
            )?;
            bus::ack(storage, Topic::CrawlRequests, delivery_id)?;
            return Ok(FetchOutcome::Requeued);
        }

        let started = Instant::now();
        let outcome = self.fetch_and_emit(storage, dedup, request, started).await;

        self.rate.release_domain_mutex(&request.domain, &owner)?;
        bus::ack(storage, Topic::CrawlRequests, delivery_id)?;

        let outcome = outcome?;
        match outcome {
            FetchOutcome::Completed | FetchOutcome::CompletedDuplicate => {
                self.rate.record_fetch_success(&request.domain);
            }
            FetchOutcome::Failed => self.rate.record_fetch_failure(&request.domain),
            FetchOutcome::Requeued => {}
        }
        Ok(outcome)
    }

    async fn fetch_and_emit(
        &self,
        storage: &mut SqliteStorage,
        dedup: &ContentDedupIndex,
        request: &FetchRequest,
        started: Instant,
    ) -> Result<FetchOutcome, crate::SumiError> {
        match fetch_with_retry(self.client, &request.url, self.max_retries).await {
            Ok(page) => self.handle_success(storage, dedup, request, page, started),
            Err(err) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                storage.fail_job(request.job_id, &err.to_string())?;
                storage.insert_crawl_history(&CrawlHistoryRecord {
                    crawl_url_id: request.job_id,
                    url: request.url.clone(),
                    status_code: None,
                    content_type: None,
                    content_size_bytes: None,
                    content_hash: None,
                    crawled_at: Utc::now(),
                    duration_ms: Some(duration_ms),
                    outbound_links_count: 0,
                    error_message: Some(err.to_string()),
                    error_type: Some(match &err {
                        FetchError::BodyTooLarge(_) => "body_too_large",
                        FetchError::HttpClientError(_) => "http_client_error",
                        FetchError::HttpServerError(_) => "http_server_error",
                        FetchError::Network(_) => "network_error",
                        FetchError::Parse(_) => "parse_error",
                    }
                    .to_string()),
                    duplicate_of: None,
                })?;
                Ok(FetchOutcome::Failed)
            }
        }
    }

    fn handle_success(
        &self,
        storage: &mut SqliteStorage,
        dedup: &ContentDedupIndex,
        request: &FetchRequest,
        page: FetchedPage,
        started: Instant,
    ) -> Result<FetchOutcome, crate::SumiError> {
        let base_url = ::url::Url::parse(&page.final_url)?;
        let parsed =
            parse_html(&page.body, &base_url).map_err(|message| crate::SumiError::HtmlParse {
                url: page.final_url.clone(),
                message,
            })?;

        let content_hash = sha256_hex(&parsed.text);
        let now = Utc::now();
        let duration_ms = started.elapsed().as_millis() as u64;
        let duplicate_of = dedup.check_and_insert(&content_hash, &page.final_url, &parsed.text)?;
        let is_duplicate = duplicate_of.is_some();

        if !is_duplicate {
            let title = parsed.title.clone().unwrap_or_else(|| "Untitled".to_string());

            bus::publish(
                storage,
                Topic::Pages,
                &page.final_url,
                &ContentEvent {
                    url: page.final_url.clone(),
                    title,
                    meta_description: parsed.meta_description.clone(),
                    text: parsed.text.clone(),
                    html_len: page.body.len(),
                    outbound_links: parsed.links.clone(),
                    status_code: page.status_code,
                    content_type: page.content_type.clone(),
                    language: parsed.language.clone(),
                    crawled_at: now,
                    content_hash: content_hash.clone(),
                },
            )?;
        }

        for link in &parsed.link_details {
            let link_url = ::url::Url::parse(&link.url).map_err(|_| {
                crate::SumiError::UrlError(crate::UrlError::Parse(link.url.clone()))
            })?;
            let domain = crate::url::registrable_domain(&link_url).unwrap_or_default();
            bus::publish(
                storage,
                Topic::NewLinks,
                &domain,
                &LinkDiscoveryEvent {
                    url: link.url.clone(),
                    source_url: page.final_url.clone(),
                    domain,
                    anchor: link.anchor.clone(),
                    depth: request.depth + 1,
                    is_main_content: link.is_main_content,
                    discovered_at: now,
                },
            )?;
        }

        storage.increment_domain_counters(&request.domain, 0, 1, 0)?;
        storage.mark_completed(request.job_id, now)?;
        storage.insert_crawl_history(&CrawlHistoryRecord {
            crawl_url_id: request.job_id,
            url: page.final_url.clone(),
            status_code: Some(page.status_code),
            content_type: page.content_type.clone(),
            content_size_bytes: Some(page.body.len() as u64),
            content_hash: Some(content_hash),
            crawled_at: now,
            duration_ms: Some(duration_ms),
            outbound_links_count: parsed.link_details.len() as u32,
            error_message: None,
            error_type: None,
            duplicate_of: duplicate_of.clone(),
        })?;

        Ok(if is_duplicate {
            FetchOutcome::CompletedDuplicate
        } else {
            FetchOutcome::Completed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&test_config());
        assert!(client.is_ok());
    }

    #[test]
    fn test_fetch_error_retryability() {
        assert!(FetchError::Network("x".to_string()).is_retryable());
        assert!(FetchError::HttpServerError(503).is_retryable());
        assert!(!FetchError::HttpClientError(404).is_retryable());
        assert!(!FetchError::BodyTooLarge(1024).is_retryable());
        assert!(!FetchError::Parse("bad".to_string()).is_retryable());
    }
}
