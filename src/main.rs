//! nomad-harvest main entry point
//!
//! This is the command-line interface for the nomad-harvest job crawler.

use anyhow::Context;
use clap::Parser;
use nomad_harvest::config::{load_config_with_hash, Config};
use nomad_harvest::spider::Termination;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// nomad-harvest: incremental remote-job crawler
///
/// Crawls a job board page by page, skips postings already saved, and
/// writes the rest to CSV, JSON, Markdown, SQLite and xlsx outputs.
#[derive(Parser, Debug)]
#[command(name = "nomad-harvest")]
#[command(version)]
#[command(about = "Incremental remote-job crawler", long_about = None)]
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

    /// Override the configured page cap
    #[arg(long, value_name = "N")]
    max_pages: Option<usize>,

    /// Validate config and show the resolved outputs without crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    let max_pages = cli.max_pages.or(config.spider.max_pages);

    if cli.dry_run {
        handle_dry_run(&config, max_pages)?;
    } else {
        handle_harvest(&config, max_pages).await?;
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
            0 => EnvFilter::new("nomad_harvest=info,warn"),
            1 => EnvFilter::new("nomad_harvest=debug,info"),
            2 => EnvFilter::new("nomad_harvest=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows the resolved outputs
fn handle_dry_run(config: &Config, max_pages: Option<usize>) -> anyhow::Result<()> {
    let options = config.output.save_options()?;
    let targets = options
        .recorder_config()
        .targets()
        .context("Failed to resolve output targets")?;

    println!("=== nomad-harvest Dry Run ===\n");

    println!("Spider:");
    println!("  Name: {}", config.spider.name);
    if let Some(url) = &config.spider.start_url {
        println!("  Start URL: {}", url);
    }
    match max_pages {
        Some(cap) => println!("  Max pages: {}", cap),
        None => println!("  Max pages: no cap"),
    }
    println!("  Delay: {}ms", config.spider.delay_ms);
    println!("  Timeout: {}s", config.spider.timeout_secs);
    println!("  Extra headers: {}", config.spider.headers.len());
    println!("  Cookies: {}", config.spider.cookies.len());

    println!("\nOutput:");
    println!("  Incremental: {}", options.incremental);
    println!(
        "  Primary key: {}",
        options.primary_key.as_deref().unwrap_or("(none)")
    );
    println!("  Table: {}", options.db_table);
    if !options.remove_columns.is_empty() {
        println!("  Removed columns: {}", options.remove_columns.join(", "));
    }

    println!("\nTargets ({}):", targets.len());
    for (format, path) in &targets {
        println!("  - {} -> {}", format, path.display());
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the main crawl-and-save run
async fn handle_harvest(config: &Config, max_pages: Option<usize>) -> anyhow::Result<()> {
    tracing::info!(
        "Starting {} harvest ({}, {}ms delay)",
        config.spider.name,
        max_pages.map_or_else(|| "no page cap".to_string(), |cap| format!("max {} pages", cap)),
        config.spider.delay_ms
    );

    let outcome = nomad_harvest::harvest(config, max_pages)
        .await
        .context("Harvest failed")?;

    let report = &outcome.report;
    match &report.termination {
        Termination::Exhausted => tracing::info!("Listing exhausted after {} pages", report.pages),
        Termination::PageCap => tracing::info!("Stopped at page cap ({} pages)", report.pages),
        Termination::PageFailure(failure) => {
            tracing::warn!("Stopped early at {}", failure)
        }
    }

    for failure in &report.record_failures {
        tracing::warn!("Skipped {}", failure);
    }

    tracing::info!(
        "Collected {} jobs: {} new, {} already saved, {} written",
        report.entities.len(),
        outcome.saved.added,
        outcome.saved.skipped,
        outcome.saved.written
    );

    Ok(())
}
