//! Tidemark main entry point
//!
//! This is the command-line interface for the tidemark crawler.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tidemark::config::{load_config_with_hash, Config};
use tidemark::crawler::{
    load_statistics, print_statistics, CrawlSession, CrawlerBuilder, CrawlerContext,
    LocalTaskExecutor, SessionOutcome,
};
use tidemark::state::CrawlStage;
use tidemark::storage::open_storage;
use tracing_subscriber::EnvFilter;

/// Tidemark: a resumable document crawler
///
/// Tidemark crawls references, detects what changed since the previous
/// session and sends new, modified and deleted documents to a committer.
/// An interrupted crawl resumes where it stopped.
#[derive(Parser, Debug)]
#[command(name = "tidemark")]
#[command(version = "1.0.0")]
#[command(about = "A resumable document crawler", long_about = None)]
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

    /// Start a fresh session, dropping references left by an interrupted one
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "clean"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "clean"])]
    stats: bool,

    /// Delete the crawl database content and the committed output, then exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    clean: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    let crawler = build_crawler(config)?;
    if cli.stats {
        handle_stats(&crawler)?;
    } else if cli.clean {
        CrawlSession::clean(&crawler).await?;
        println!("✓ Crawler \"{}\" cleaned", crawler.id());
    } else {
        handle_crawl(crawler, cli.fresh).await?;
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
            0 => EnvFilter::new("tidemark=info,warn"),
            1 => EnvFilter::new("tidemark=debug,info"),
            2 => EnvFilter::new("tidemark=trace,debug"),
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

/// Builds the crawler on the configured SQLite database
fn build_crawler(config: Config) -> anyhow::Result<Arc<CrawlerContext>> {
    let database = Path::new(&config.storage.database_path);
    let storage = open_storage(database)
        .with_context(|| format!("Failed to open database {}", database.display()))?;
    Ok(CrawlerBuilder::new(config).storage(storage).build()?)
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) {
    let crawler = &config.crawler;
    println!("=== Tidemark Dry Run ===\n");

    println!("Crawler \"{}\":", crawler.id);
    println!("  Threads: {}", crawler.num_threads);
    println!("  Max depth: {}", crawler.max_depth);
    println!("  Max documents: {}", crawler.max_documents);
    println!("  Orphans strategy: {:?}", crawler.orphans_strategy);
    println!("  Metadata fetch: {}", crawler.metadata_fetch_support);
    println!("  Document fetch: {}", crawler.document_fetch_support);
    println!(
        "  Start references queued {}",
        if crawler.start_references_async {
            "in the background"
        } else {
            "before crawling"
        }
    );

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);

    println!("\nCommitter:");
    println!("  Output: {}", config.committer.output_path);
    println!("  Batch size: {}", config.committer.batch_size);

    println!(
        "\nFilters: {} reference, {} metadata, {} document",
        config.reference_filters.len(),
        config.metadata_filters.len(),
        config.document_filters.len()
    );

    println!("\nStart References ({}):", crawler.start_references.len());
    for reference in &crawler.start_references {
        println!("  - {}", reference);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(crawler: &CrawlerContext) -> anyhow::Result<()> {
    println!("Database: {}\n", crawler.config.storage.database_path);
    let stats = load_statistics(crawler)?;
    print_statistics(&stats);
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(crawler: Arc<CrawlerContext>, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh session (dropping previous unfinished session)");
        crawler.ledger.set_crawl_stage(CrawlStage::Ended)?;
        crawler.ledger.discard_pending()?;
    } else {
        tracing::info!("Starting crawl (will resume if an interrupted session exists)");
    }

    let stopper = crawler.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing current documents...");
            stopper.stop();
        }
    });

    let mut session = CrawlSession::new(crawler, Arc::new(LocalTaskExecutor::new()));
    match session.run().await {
        Ok(SessionOutcome::Completed) => {
            tracing::info!("Crawl completed successfully");
            Ok(())
        }
        Ok(SessionOutcome::Stopped) => {
            tracing::info!("Crawl stopped; run again to resume");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
