//! URL handling module for Sumi-Ripple
//!
//! This module provides URL normalization, domain extraction, wildcard matching,
//! and domain classification functionality.

mod domain;
mod matcher;
mod normalize;

use crate::config::Config;

// Re-export main functions
pub use domain::{extract_domain, registrable_domain};
pub use matcher::matches_wildcard;
pub use normalize::{normalize_url, resolve};

/// Domain-authority uplift for curated top-level domains (§4.8), applied on
/// top of the default authority score before any configured curated uplift.
pub fn tld_authority_uplift(domain: &str) -> f64 {
    if domain.ends_with(".edu") {
        0.35
    } else if domain.ends_with(".gov") {
        0.30
    } else {
        0.0
    }
}

/// Domain classification types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainClassification {
    /// Quality domain - should be fully crawled
    Quality,
    /// Blacklisted domain - record but skip
    Blacklisted,
    /// Stubbed domain - note but never visit
    Stubbed,
    /// Discovered domain - found during crawl
    Discovered,
}

impl DomainClassification {
    /// Returns true if the domain should be crawled
    pub fn should_crawl(&self) -> bool {
        matches!(self, Self::Quality | Self::Discovered)
    }

    /// Returns true if the domain is terminal (should not be visited)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Blacklisted | Self::Stubbed)
    }
}

/// Classifies a domain according to the configuration
///
/// This function checks the domain against the configuration's domain lists
/// in the following priority order:
/// 1. Blacklist (highest priority)
/// 2. Stub list
/// 3. Quality list
/// 4. Discovered (default)
///
/// # Arguments
///
/// * `domain` - The domain string to classify (should be lowercase)
/// * `config` - The crawler configuration
///
/// # Returns
///
/// The classification of the domain
///
/// # Examples
///
/// ```no_run
/// use sumi_ripple::config::Config;
/// use sumi_ripple::url::{classify_domain, DomainClassification};
///
/// # fn example(config: &Config) {
/// let classification = classify_domain("example.com", config);
/// match classification {
///     DomainClassification::Quality => println!("Will crawl fully"),
///     DomainClassification::Blacklisted => println!("Will skip"),
///     DomainClassification::Stubbed => println!("Will note but not visit"),
///     DomainClassification::Discovered => println!("New domain found"),
/// }
/// # }
/// ```
pub fn classify_domain(domain: &str, config: &Config) -> DomainClassification {
    // Priority 1: Check blacklist
    for entry in &config.blacklist {
        if matches_wildcard(&entry.domain, domain) {
            return DomainClassification::Blacklisted;
        }
    }

    // Priority 2: Check stub list
    for entry in &config.stub {
        if matches_wildcard(&entry.domain, domain) {
            return DomainClassification::Stubbed;
        }
    }

    // Priority 3: Check quality list
    for entry in &config.quality {
        if matches_wildcard(&entry.domain, domain) {
            return DomainClassification::Quality;
        }
    }

    // Default: Discovered
    DomainClassification::Discovered
}
