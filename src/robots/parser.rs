//! Robots.txt parser implementation
//!
//! This module provides functionality for parsing robots.txt content using the robotstxt crate.

use robotstxt::DefaultMatcher;

/// Parsed robots.txt data
///
/// This is a wrapper around the robotstxt crate's types, providing a simplified
/// interface for checking if URLs are allowed.
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content (empty string means allow all)
    content: String,
    /// Whether to allow all (true = allow all, false = parse content)
    allow_all: bool,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    ///
    /// # Arguments
    ///
    /// * `content` - The raw robots.txt file content
    ///
    /// # Returns
    ///
    /// A ParsedRobots instance that can be used to check URL permissions
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    ///
    /// This is used as the default when robots.txt cannot be fetched or parsed.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - The URL path to check (e.g., "/page.html")
    /// * `user_agent` - The user agent string
    ///
    /// # Returns
    ///
    /// * `true` - If the URL is allowed
    /// * `false` - If the URL is disallowed
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.allow_all || self.content.is_empty() {
            // Empty content or explicit allow-all means allow all
            return true;
        }

        // Parse and check on-demand
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Gets the crawl delay for a specific user agent
    ///
    /// # Arguments
    ///
    /// * `user_agent` - The user agent string
    ///
    /// # Returns
    ///
    /// * `Some(f64)` - The crawl delay in seconds
    /// * `None` - If no crawl delay is specified
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        if self.allow_all {
            return None;
        }
        extract_crawl_delay(&self.content, user_agent)
    }

    /// Raw robots.txt text, for persisting to the DomainProfile cache.
    pub fn raw_content(&self) -> &str {
        &self.content
    }

    /// `Sitemap:` lines are global, not grouped by user-agent (§4.2).
    pub fn sitemaps(&self) -> Vec<String> {
        if self.allow_all {
            return Vec::new();
        }
        self.content
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                let (directive, value) = line.split_once(':')?;
                if directive.trim().eq_ignore_ascii_case("sitemap") {
                    Some(value.trim().to_string())
                } else {
                    None
                }
            })
            .collect()
    }
}

/// The `robotstxt` crate matches Allow/Disallow per RFC 9309 but does not
/// expose `Crawl-delay`, so it's extracted here with a line-oriented scan
/// grouped the same way: consecutive `User-agent:` lines precede the rules
/// they apply to, `*` is the fallback group.
fn extract_crawl_delay(content: &str, user_agent: &str) -> Option<f64> {
    let user_agent_lower = user_agent.to_lowercase();
    let mut pending_agents: Vec<String> = Vec::new();
    let mut group_open = true;
    let mut specific_delay: Option<f64> = None;
    let mut wildcard_delay: Option<f64> = None;

    for raw_line in content.lines() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((directive, value)) = line.split_once(':') else {
            continue;
        };
        let directive = directive.trim().to_lowercase();
        let value = value.trim();

        match directive.as_str() {
            "user-agent" => {
                if !group_open {
                    pending_agents.clear();
                    group_open = true;
                }
                pending_agents.push(value.to_lowercase());
            }
            "crawl-delay" => {
                group_open = false;
                let Ok(seconds) = value.parse::<f64>() else {
                    continue;
                };
                if pending_agents.iter().any(|a| user_agent_lower.contains(a.as_str())) {
                    specific_delay = Some(seconds);
                } else if pending_agents.iter().any(|a| a == "*") {
                    wildcard_delay = Some(seconds);
                }
            }
            "allow" | "disallow" => {
                group_open = false;
            }
            _ => {}
        }
    }

    specific_delay.or(wildcard_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        let robots = ParsedRobots::allow_all();
        assert!(robots.is_allowed("/any/path", "TestBot"));
        assert!(robots.is_allowed("/admin", "TestBot"));
    }

    #[test]
    fn test_parse_disallow_all() {
        let content = "User-agent: *\nDisallow: /";
        let robots = ParsedRobots::from_content(content);
        assert!(!robots.is_allowed("/", "TestBot"));
        assert!(!robots.is_allowed("/page", "TestBot"));
    }

    #[test]
    fn test_parse_disallow_specific() {
        let content = "User-agent: *\nDisallow: /admin";
        let robots = ParsedRobots::from_content(content);
        assert!(robots.is_allowed("/", "TestBot"));
        assert!(robots.is_allowed("/page", "TestBot"));
        assert!(!robots.is_allowed("/admin", "TestBot"));
        assert!(!robots.is_allowed("/admin/users", "TestBot"));
    }

    #[test]
    fn test_parse_allow_and_disallow() {
        let content = "User-agent: *\nDisallow: /private\nAllow: /private/public";
        let robots = ParsedRobots::from_content(content);
        assert!(robots.is_allowed("/", "TestBot"));
        assert!(!robots.is_allowed("/private", "TestBot"));
        assert!(robots.is_allowed("/private/public", "TestBot"));
    }

    #[test]
    fn test_parse_specific_user_agent() {
        let content = "User-agent: BadBot\nDisallow: /\n\nUser-agent: *\nAllow: /";
        let robots = ParsedRobots::from_content(content);
        assert!(robots.is_allowed("/page", "GoodBot"));
        assert!(!robots.is_allowed("/page", "BadBot"));
    }

    #[test]
    fn test_invalid_robots_txt() {
        let content = "This is not valid robots.txt {{{";
        let robots = ParsedRobots::from_content(content);
        // Should fall back to allow_all behavior
        assert!(robots.is_allowed("/any/path", "TestBot"));
    }

    #[test]
    fn test_empty_robots_txt() {
        let content = "";
        let robots = ParsedRobots::from_content(content);
        assert!(robots.is_allowed("/any/path", "TestBot"));
    }

    #[test]
    fn test_crawl_delay_wildcard() {
        let content = "User-agent: *\nDisallow:\nCrawl-delay: 5";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay("TestBot"), Some(5.0));
    }

    #[test]
    fn test_crawl_delay_specific_agent_wins_over_wildcard() {
        let content =
            "User-agent: *\nCrawl-delay: 5\n\nUser-agent: TestBot\nCrawl-delay: 2";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay("TestBot"), Some(2.0));
    }

    #[test]
    fn test_crawl_delay_absent_returns_none() {
        let content = "User-agent: *\nDisallow:";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay("TestBot"), None);
    }

    #[test]
    fn test_sitemaps_are_global() {
        let content =
            "User-agent: *\nDisallow: /admin\nSitemap: https://a.com/sitemap.xml";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.sitemaps(), vec!["https://a.com/sitemap.xml".to_string()]);
    }
}
