use serde::Deserialize;

/// Main configuration structure for Sumi-Ripple
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub quality: Vec<QualityEntry>,
    #[serde(default)]
    pub blacklist: Vec<DomainEntry>,
    #[serde(default)]
    pub stub: Vec<DomainEntry>,
    #[serde(default)]
    pub ingestion: IngestionConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum depth to crawl from seed URLs
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Maximum number of concurrent page fetches
    #[serde(rename = "max-concurrent-pages-open")]
    pub max_concurrent_pages_open: u32,

    /// Minimum time between requests to the same domain (milliseconds)
    #[serde(rename = "minimum-time-on-page")]
    pub minimum_time_on_page: u64,

    /// Maximum number of requests per domain
    #[serde(rename = "max-domain-requests")]
    pub max_domain_requests: u32,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the markdown summary file
    #[serde(rename = "summary-path")]
    pub summary_path: String,
}

/// Ingestion pipeline tuning (§6 configuration table): prioritization
/// strategy, dedup sizing, ranker convergence, scheduler/fetch sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    /// Frontier prioritization strategy: "bfs", "best-first", "opic", or "focused".
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Process-wide URL dedup Bloom filter capacity.
    #[serde(rename = "bloom-capacity", default = "default_bloom_capacity")]
    pub bloom_capacity: usize,

    /// Process-wide URL dedup Bloom filter target false-positive rate.
    #[serde(rename = "bloom-fpr", default = "default_bloom_fpr")]
    pub bloom_fpr: f64,

    /// SimHash Hamming-distance threshold below which two pages are
    /// considered near-duplicates.
    #[serde(
        rename = "simhash-hamming-threshold",
        default = "default_hamming_threshold"
    )]
    pub simhash_hamming_threshold: u32,

    /// Number of LSH bands over the SimHash fingerprint.
    #[serde(rename = "lsh-bands", default = "default_lsh_bands")]
    pub lsh_bands: u32,

    /// Bits per LSH band.
    #[serde(rename = "lsh-band-bits", default = "default_lsh_band_bits")]
    pub lsh_band_bits: u32,

    /// PageRank damping factor.
    #[serde(default = "default_damping")]
    pub damping: f64,

    /// PageRank L1-norm convergence epsilon.
    #[serde(rename = "convergence-epsilon", default = "default_convergence_epsilon")]
    pub convergence_epsilon: f64,

    /// PageRank maximum power-iteration count.
    #[serde(rename = "max-iterations", default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Number of Frontier jobs the Scheduler polls per tick.
    #[serde(rename = "scheduler-batch", default = "default_scheduler_batch")]
    pub scheduler_batch: u32,

    /// Sliding rate-limit window, in seconds.
    #[serde(rename = "window-seconds", default = "default_window_seconds")]
    pub window_seconds: i64,

    /// Max requests per domain allowed within `window-seconds`.
    #[serde(
        rename = "max-requests-per-window",
        default = "default_max_requests_per_window"
    )]
    pub max_requests_per_window: u32,

    /// Number of Fetcher deliveries drained from the bus per tick.
    #[serde(rename = "fetch-concurrency", default = "default_fetch_concurrency")]
    pub fetch_concurrency: u32,

    /// Max retry attempts for a retryable fetch failure.
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_strategy() -> String {
    "bfs".to_string()
}
fn default_bloom_capacity() -> usize {
    10_000_000
}
fn default_bloom_fpr() -> f64 {
    0.01
}
fn default_hamming_threshold() -> u32 {
    3
}
fn default_lsh_bands() -> u32 {
    4
}
fn default_lsh_band_bits() -> u32 {
    16
}
fn default_damping() -> f64 {
    0.85
}
fn default_convergence_epsilon() -> f64 {
    1e-4
}
fn default_max_iterations() -> u32 {
    100
}
fn default_scheduler_batch() -> u32 {
    100
}
fn default_window_seconds() -> i64 {
    60
}
fn default_max_requests_per_window() -> u32 {
    60
}
fn default_fetch_concurrency() -> u32 {
    10
}
fn default_max_retries() -> u32 {
    3
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            bloom_capacity: default_bloom_capacity(),
            bloom_fpr: default_bloom_fpr(),
            simhash_hamming_threshold: default_hamming_threshold(),
            lsh_bands: default_lsh_bands(),
            lsh_band_bits: default_lsh_band_bits(),
            damping: default_damping(),
            convergence_epsilon: default_convergence_epsilon(),
            max_iterations: default_max_iterations(),
            scheduler_batch: default_scheduler_batch(),
            window_seconds: default_window_seconds(),
            max_requests_per_window: default_max_requests_per_window(),
            fetch_concurrency: default_fetch_concurrency(),
            max_retries: default_max_retries(),
        }
    }
}

/// Quality domain entry with seed URLs
#[derive(Debug, Clone, Deserialize)]
pub struct QualityEntry {
    /// Domain pattern (e.g., "example.com" or "*.example.com")
    pub domain: String,

    /// List of seed URLs to start crawling from
    pub seeds: Vec<String>,
}

/// Simple domain entry for blacklist and stub lists
#[derive(Debug, Clone, Deserialize)]
pub struct DomainEntry {
    /// Domain pattern (e.g., "example.com" or "*.example.com")
    pub domain: String,
}
