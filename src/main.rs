//! Sumi-Gather main entry point
//!
//! This is the command-line interface for the Sumi-Gather artifact harvester.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use sumi_gather::config::{load_config_with_hash, validate, Config};
use sumi_gather::crawler::Coordinator;
use sumi_gather::output::{load_statistics, print_statistics};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Sumi-Gather: A polite artifact harvester
///
/// Sumi-Gather walks the pages below a seed URL to a bounded depth and
/// downloads every linked document, spreadsheet and archive into folders
/// named after the section of the site they were found in.
#[derive(Parser, Debug)]
#[command(name = "sumi-gather")]
#[command(version)]
#[command(about = "A polite artifact harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Override the seed URL
    #[arg(long, value_name = "URL")]
    seed: Option<String>,

    /// Override the maximum traversal depth
    #[arg(long, value_name = "N")]
    max_depth: Option<u32>,

    /// Override the number of concurrent workers
    #[arg(long, value_name = "N")]
    workers: Option<u32>,

    /// Override the download root directory
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Never escalate to the headless browser
    #[arg(long)]
    no_render: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the manifest of an earlier run and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(seed) = &self.seed {
            config.crawler.seed_url = seed.clone();
        }
        if let Some(max_depth) = self.max_depth {
            config.crawler.max_depth = max_depth;
        }
        if let Some(workers) = self.workers {
            config.crawler.max_workers = workers;
        }
        if let Some(root) = &self.root {
            config.download.root = root.clone();
        }
        if self.no_render {
            config.fetch.render = false;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load configuration, then apply overrides and validate the result
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    cli.apply_overrides(&mut config);
    validate(&config).context("Invalid configuration")?;

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, config_hash).await?;
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
            0 => EnvFilter::new("sumi_gather=info,warn"),
            1 => EnvFilter::new("sumi_gather=debug,info"),
            2 => EnvFilter::new("sumi_gather=trace,debug"),
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

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Sumi-Gather Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Seed: {}", config.crawler.seed_url);
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Workers: {}", config.crawler.max_workers);
    println!("  Politeness delay: {}ms", config.crawler.politeness_delay);
    println!("  Seed category: {}", config.crawler.seed_category);

    println!("\nFetching:");
    println!("  User agent: {}", config.fetch.user_agent);
    println!("  Static timeout: {}s", config.fetch.static_timeout);
    if config.fetch.render {
        println!(
            "  Rendering: enabled (timeout {}s, settle {}ms)",
            config.fetch.render_timeout, config.fetch.settle_interval
        );
        if let Some(chrome) = &config.fetch.chrome_path {
            println!("  Chrome: {}", chrome.display());
        }
    } else {
        println!("  Rendering: disabled");
    }

    println!("\nDownloads:");
    println!("  Root: {}", config.download.root.display());
    println!("  Minimum size: {} bytes", config.download.min_artifact_bytes);
    println!(
        "  Retries: {} (backoff {}ms)",
        config.download.max_retries, config.download.retry_backoff
    );
    println!("  Timeout: {}s", config.download.timeout);

    let mut extensions = config.artifacts.extensions.clone();
    extensions.sort();
    println!("\nArtifact Extensions ({}):", extensions.len());
    println!("  {}", extensions.join(", "));

    println!("\nOutput:");
    println!("  Manifest: {}", config.manifest_path().display());
    if let Some(summary) = &config.output.summary_path {
        println!("  Summary: {}", summary.display());
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from an existing manifest
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let manifest_path = config.manifest_path();
    println!("Manifest: {}\n", manifest_path.display());

    let stats = load_statistics(&manifest_path)
        .with_context(|| format!("Failed to read {}", manifest_path.display()))?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String) -> anyhow::Result<()> {
    let coordinator = Coordinator::from_config(config)?.with_config_hash(config_hash);

    // Ctrl-C stops dispatching; requests already started finish and the
    // manifest still gets written
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing up");
            interrupt.cancel();
        }
    });

    match coordinator.run(cancel).await {
        Ok(manifest) => {
            println!(
                "{} pages visited, {} of {} artifacts stored ({} invalid, {} failed){}",
                manifest.pages_visited,
                manifest.artifacts_succeeded,
                manifest.artifacts_attempted,
                manifest.artifacts_invalid,
                manifest.artifacts_failed,
                if manifest.cancelled { ", cancelled" } else { "" }
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
