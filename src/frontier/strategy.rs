//! Pluggable prioritization strategies (§4.5). A closed set of variants,
//! not open-ended dynamic dispatch: configuration picks one at startup.

use serde::{Deserialize, Serialize};

/// Inputs a strategy needs to score a candidate CrawlJob. Not every
/// strategy uses every field.
#[derive(Debug, Clone, Copy)]
pub struct PriorityInputs {
    pub depth: u32,
    pub pagerank: f64,
    pub domain_authority: f64,
    pub change_freq: f64,
    pub opic_cash: f64,
    pub path_depth: u32,
    pub has_query: bool,
    pub matches_valuable_pattern: bool,
    pub domain_is_allowlisted: bool,
}

impl Default for PriorityInputs {
    fn default() -> Self {
        Self {
            depth: 0,
            pagerank: 0.0,
            domain_authority: 0.5,
            change_freq: 0.0,
            opic_cash: 1.0,
            path_depth: 0,
            has_query: false,
            matches_valuable_pattern: false,
            domain_is_allowlisted: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    Bfs,
    BestFirst,
    Opic,
    Focused,
}

impl Strategy {
    pub fn from_config_str(s: &str) -> Option<Self> {
        match s {
            "bfs" => Some(Self::Bfs),
            "best-first" => Some(Self::BestFirst),
            "opic" => Some(Self::Opic),
            "focused" => Some(Self::Focused),
            _ => None,
        }
    }

    /// Higher is sooner. Ties are broken by the caller: (lower depth,
    /// earlier creation).
    pub fn priority(&self, inputs: &PriorityInputs) -> f64 {
        match self {
            Self::Bfs => -(inputs.depth as f64),
            Self::BestFirst => {
                (0.7 * inputs.pagerank + 0.3 * inputs.domain_authority) * 1000.0
                    / (inputs.depth as f64 + 1.0)
            }
            Self::Opic => {
                inputs.opic_cash * inputs.domain_authority * (1.0 + inputs.change_freq / 10.0)
                    / ((inputs.depth as f64 + 2.0).ln())
            }
            Self::Focused => {
                let domain_boost = if inputs.domain_is_allowlisted { 2.0 } else { 1.0 };
                let mut pattern_score = 1.0_f64;
                if inputs.matches_valuable_pattern {
                    pattern_score += 0.5;
                }
                if inputs.path_depth > 6 {
                    pattern_score *= 0.8;
                }
                if inputs.has_query {
                    pattern_score *= 0.9;
                }
                let base_quality = 1.0;
                base_quality * domain_boost * freshness_boost(inputs.change_freq) * pattern_score
                    / (inputs.depth as f64 + 1.0).sqrt()
            }
        }
    }
}

fn freshness_boost(change_freq: f64) -> f64 {
    1.0 + (change_freq / 10.0).min(1.0)
}

/// URL substrings that raise a Focused-strategy pattern score (§4.5).
pub fn matches_valuable_pattern(path: &str) -> bool {
    ["/article/", "/post/", "/tutorial/", "/doc/"]
        .iter()
        .any(|needle| path.contains(needle))
}
