//! Sumi-Ripple main entry point
//!
//! This is the command-line interface for the Sumi-Ripple web terrain mapper.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use sumi_ripple::config::load_config_with_hash;
use sumi_ripple::crawler::crawl;
use tracing_subscriber::EnvFilter;

/// Sumi-Ripple: A polite web terrain mapper
///
/// Sumi-Ripple crawls websites while respecting robots.txt, rate limits,
/// and domain classifications. It maps link relationships between sites
/// and generates comprehensive summaries.
#[derive(Parser, Debug)]
#[command(name = "sumi-ripple")]
#[command(version = "1.0.0")]
#[command(about = "A polite web terrain mapper", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume an interrupted crawl (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, ignoring previous state
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "export_summary"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_summary"])]
    stats: bool,

    /// Generate markdown summary from existing data and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export_summary: bool,

    /// Admin surface operations against an existing database, in place of a crawl
    #[command(subcommand)]
    admin: Option<AdminCommand>,
}

/// The admin surface (§6): operations a caller can run against an existing
/// database without starting a full crawl.
#[derive(Subcommand, Debug)]
enum AdminCommand {
    /// Add seed URLs to the frontier
    Seed {
        /// URLs to enqueue
        urls: Vec<String>,
    },
    /// Report the current token-bucket and circuit-breaker state for a domain
    RateLimitStatus {
        domain: String,
    },
    /// Reset the rate limiter state for a domain
    ResetRateLimit {
        domain: String,
    },
    /// Run PageRank to convergence over the current page graph
    TriggerPagerank,
    /// Validate a requested scheduling strategy name
    ChangeStrategy {
        strategy: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, _config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle different modes
    if let Some(admin_cmd) = cli.admin {
        handle_admin(&config, admin_cmd)?;
    } else if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export_summary {
        handle_export_summary(&config)?;
    } else {
        handle_crawl(config, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_ripple=info,warn"),
            1 => EnvFilter::new("sumi_ripple=debug,info"),
            2 => EnvFilter::new("sumi_ripple=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &sumi_ripple::config::Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Sumi-Ripple Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max depth: {}", config.crawler.max_depth);
    println!(
        "  Max concurrent pages: {}",
        config.crawler.max_concurrent_pages_open
    );
    println!(
        "  Minimum time on page: {}ms",
        config.crawler.minimum_time_on_page
    );
    println!(
        "  Max domain requests: {}",
        config.crawler.max_domain_requests
    );

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Summary: {}", config.output.summary_path);

    println!("\nQuality Domains ({}):", config.quality.len());
    for entry in &config.quality {
        println!("  - {} ({} seeds)", entry.domain, entry.seeds.len());
        for seed in &entry.seeds {
            println!("    * {}", seed);
        }
    }

    println!("\nBlacklisted Domains ({}):", config.blacklist.len());
    for entry in &config.blacklist {
        println!("  - {}", entry.domain);
    }

    println!("\nStubbed Domains ({}):", config.stub.len());
    for entry in &config.stub {
        println!("  - {}", entry.domain);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start crawling with {} seed URLs",
        config.quality.iter().map(|q| q.seeds.len()).sum::<usize>()
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &sumi_ripple::config::Config) -> Result<(), Box<dyn std::error::Error>> {
    use std::path::Path;
    use sumi_ripple::frontier::Strategy;
    use sumi_ripple::output::generate_summary;
    use sumi_ripple::storage::SqliteStorage;

    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let summary = generate_summary(&storage, Strategy::Bfs)?;

    println!("Frontier size: {}", summary.frontier_size);
    println!("Status breakdown:");
    let mut statuses: Vec<_> = summary.counts_by_status.iter().collect();
    statuses.sort_by_key(|(status, _)| status.to_string());
    for (status, count) in statuses {
        println!("  {status}: {count}");
    }

    Ok(())
}

/// Handles the --export-summary mode: generates markdown summary
fn handle_export_summary(
    config: &sumi_ripple::config::Config,
) -> Result<(), Box<dyn std::error::Error>> {
    use std::path::Path;
    use sumi_ripple::frontier::Strategy;
    use sumi_ripple::output::{generate_markdown_summary, generate_summary};
    use sumi_ripple::storage::SqliteStorage;

    println!("=== Exporting Crawl Summary ===\n");
    println!("Database: {}", config.output.database_path);
    println!("Output: {}", config.output.summary_path);
    println!();

    // Open the database
    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;

    // Generate summary from storage
    tracing::info!("Loading crawl data from database...");
    let summary = generate_summary(&storage, Strategy::Bfs)?;

    // Write markdown summary to file
    tracing::info!("Generating markdown summary...");
    generate_markdown_summary(&summary, Path::new(&config.output.summary_path))?;

    println!("✓ Summary exported to: {}", config.output.summary_path);

    Ok(())
}

/// Dispatches an admin-surface subcommand (§6) against the configured
/// database, without starting a crawl.
fn handle_admin(
    config: &sumi_ripple::config::Config,
    command: AdminCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    use std::path::Path;
    use std::sync::Arc;
    use sumi_ripple::admin::{self, SeedRequest};
    use sumi_ripple::frontier::Strategy;
    use sumi_ripple::kv::KvStore;
    use sumi_ripple::rate::RateController;
    use sumi_ripple::ranker::RankerConfig;
    use sumi_ripple::storage::SqliteStorage;

    let kv_path = format!("{}.kv", config.output.database_path);
    let open_kv = || -> Result<Arc<KvStore>, Box<dyn std::error::Error>> {
        let conn = rusqlite::Connection::open(&kv_path)?;
        Ok(Arc::new(KvStore::new(conn)?))
    };

    match command {
        AdminCommand::Seed { urls } => {
            let mut storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
            let strategy = Strategy::from_config_str(&config.ingestion.strategy).unwrap_or(Strategy::Bfs);
            let seeds: Vec<SeedRequest> = urls
                .into_iter()
                .map(|url| SeedRequest { url, priority_hint: None })
                .collect();
            let created = admin::add_seeds(
                &mut storage,
                strategy,
                config.crawler.max_depth,
                config.ingestion.max_retries,
                &seeds,
            )?;
            println!("Enqueued {created} new crawl job(s)");
        }
        AdminCommand::RateLimitStatus { domain } => {
            let rate = RateController::new(open_kv()?);
            let status = admin::rate_limit_status(&rate, &domain)?;
            println!("Domain: {}", status.domain);
            println!(
                "Tokens remaining: {}",
                status
                    .tokens_remaining
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "n/a".to_string())
            );
            println!("Circuit breaker: {}", status.circuit_state);
        }
        AdminCommand::ResetRateLimit { domain } => {
            let rate = RateController::new(open_kv()?);
            admin::reset_domain_rate_limit(&rate, &domain)?;
            println!("Rate limiter reset for {domain}");
        }
        AdminCommand::TriggerPagerank => {
            let mut storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
            let ranker_config = RankerConfig {
                damping: config.ingestion.damping,
                convergence_epsilon: config.ingestion.convergence_epsilon,
                max_iterations: config.ingestion.max_iterations,
            };
            let report = admin::trigger_pagerank(&mut storage, &ranker_config)?;
            println!(
                "PageRank ran {} iteration(s) over {} node(s), converged: {}",
                report.iterations_run, report.node_count, report.converged
            );
        }
        AdminCommand::ChangeStrategy { strategy } => match admin::change_strategy(&strategy) {
            Ok(parsed) => println!(
                "'{strategy}' is a valid strategy ({parsed:?}); set ingestion.strategy in config \
                 and restart to apply it"
            ),
            Err(e) => {
                eprintln!("{e}");
                return Err(e.into());
            }
        },
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: sumi_ripple::config::Config,
    fresh: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if fresh {
        tracing::info!("Starting fresh crawl (ignoring previous state)");
    } else {
        tracing::info!("Starting crawl (will resume if interrupted run exists)");
    }

    tracing::info!(
        "Quality domains: {}, Blacklist: {}, Stub: {}",
        config.quality.len(),
        config.blacklist.len(),
        config.stub.len()
    );

    // Count total seed URLs
    let seed_count: usize = config.quality.iter().map(|q| q.seeds.len()).sum();
    tracing::info!("Total seed URLs: {}", seed_count);

    // Run the crawler
    match crawl(config).await {
        Ok(()) => {
            tracing::info!("Crawl completed successfully");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
