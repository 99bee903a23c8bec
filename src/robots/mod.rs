//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching robots.txt files.
//! It respects robots.txt directives when crawling websites.

mod cache;
mod parser;

pub use cache::CachedRobots;
pub use parser::ParsedRobots;

use crate::SumiError;
use std::time::Duration;

/// Bytes fetched capped at 500 KiB; excess truncated (§4.2).
const MAX_ROBOTS_BYTES: usize = 500 * 1024;
const ROBOTS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches robots.txt for a domain
///
/// Unparseable or 4xx/5xx robots default-allow (§4.2): any non-2xx
/// response or transport error returns `ParsedRobots::allow_all()` rather
/// than propagating an error, matching the spec's politeness-over-strictness
/// stance on robots availability.
///
/// # Arguments
///
/// * `domain` - The domain to fetch robots.txt from
/// * `user_agent` - The user agent string to use
pub async fn fetch_robots(domain: &str, user_agent: &str) -> Result<ParsedRobots, SumiError> {
    let url = format!("https://{domain}/robots.txt");
    let client = reqwest::Client::builder()
        .timeout(ROBOTS_FETCH_TIMEOUT)
        .user_agent(user_agent.to_string())
        .build()
        .map_err(SumiError::Reqwest)?;

    let response = match client.get(&url).send().await {
        Ok(resp) => resp,
        Err(_) => return Ok(ParsedRobots::allow_all()),
    };

    if !response.status().is_success() {
        return Ok(ParsedRobots::allow_all());
    }

    let bytes = match response.bytes().await {
        Ok(b) => b,
        Err(_) => return Ok(ParsedRobots::allow_all()),
    };
    let truncated = &bytes[..bytes.len().min(MAX_ROBOTS_BYTES)];
    let content = String::from_utf8_lossy(truncated);

    Ok(ParsedRobots::from_content(&content))
}

/// Checks if a URL is allowed by robots.txt
///
/// # Arguments
///
/// * `robots` - The parsed robots.txt data
/// * `url` - The URL to check
/// * `user_agent` - The user agent string
///
/// # Returns
///
/// * `true` - If the URL is allowed
/// * `false` - If the URL is disallowed
pub fn is_allowed(robots: &ParsedRobots, url: &str, user_agent: &str) -> bool {
    robots.is_allowed(url, user_agent)
}
