//! get-papers-list - PubMed pharma/biotech author finder
//!
//! ## Usage
//!
//! ```bash
//! get-papers-list "cancer immunotherapy" --max-results 50 --file results.csv
//! get-papers-list "CRISPR" --format table --debug
//! ```
//!
//! CSV goes to stdout unless `--file` is given; logs always go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use get_papers_list::{
    config::Settings,
    filter::AffiliationFilter,
    output::{self, Destination, OutputFormat},
    pipeline,
    pubmed::PubmedClient,
};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Fetch PubMed papers with pharmaceutical/biotech-affiliated authors
#[derive(Parser)]
#[command(name = "get-papers-list")]
#[command(version, about, long_about = None)]
struct Cli {
    /// PubMed query (full PubMed syntax supported)
    #[arg(required_unless_present = "print_config")]
    query: Option<String>,

    /// Maximum number of PubMed ids to fetch (1-10000)
    #[arg(short = 'n', long)]
    max_results: Option<usize>,

    /// Save results to this file instead of printing them
    #[arg(short, long, visible_alias = "output")]
    file: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(short, long, visible_alias = "verbose")]
    debug: bool,

    /// Config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// NCBI API key
    #[arg(long, env = "NCBI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Contact email sent to NCBI
    #[arg(long, env = "NCBI_EMAIL")]
    email: Option<String>,

    /// Ids per efetch request
    #[arg(long)]
    batch_size: Option<usize>,

    /// Concurrent efetch requests
    #[arg(long)]
    concurrency: Option<usize>,

    /// Print the effective settings as JSON and exit
    #[arg(long)]
    print_config: bool,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so CSV on stdout stays clean
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();

    let settings = resolve_settings(&cli)?;

    if cli.print_config {
        println!("{}", settings.to_json_pretty()?);
        return Ok(());
    }

    let query = cli.query.unwrap_or_default();
    run(&settings, &query, cli.file, cli.format).await
}

/// Defaults < config file < env/CLI flags
fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load config")?;

    if let Some(n) = cli.max_results {
        settings.search.max_results = n;
    }
    if let Some(n) = cli.batch_size {
        settings.search.batch_size = n;
    }
    if let Some(n) = cli.concurrency {
        settings.search.concurrency = n;
    }
    if let Some(key) = &cli.api_key {
        settings.http.api_key = Some(key.clone());
    }
    if let Some(email) = &cli.email {
        settings.http.email = Some(email.clone());
    }

    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

// ============================================================================
// Pipeline
// ============================================================================

async fn run(
    settings: &Settings,
    query: &str,
    file: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    info!(query = query, "Starting paper retrieval");

    let client = PubmedClient::from_settings(settings)?;
    let filter = AffiliationFilter::new(&settings.filter)?;

    let report = pipeline::run(&client, &filter, query, settings.search.max_results)
        .await
        .with_context(|| format!("Paper retrieval failed for query '{}'", query))?;

    if report.is_partial() {
        warn!(
            skipped = report.skipped.len(),
            total = report.total_ids,
            "Some papers could not be fetched and were skipped"
        );
    }

    if report.results.is_empty() {
        warn!(parsed = report.parsed, "No papers with non-academic authors found");
        eprintln!(
            "Found {} paper(s), but none matched the non-academic author criteria.",
            report.parsed
        );
        return Ok(());
    }

    let destination = file.map(Destination::File).unwrap_or(Destination::Stdout);
    output::write(&report.results, &destination, format).context("Failed to write results")?;

    if let Destination::File(path) = &destination {
        eprintln!(
            "Saved {} paper(s) to {}",
            report.results.len(),
            path.display()
        );
    }

    Ok(())
}
