// src/main.rs
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod dedup;
mod discovery;
mod error;
mod extractors;
mod fetcher;
mod models;
mod parsers;
mod pipeline;
mod storage;

use config::{load_config, Config};
use discovery::build_registry;
use error::Result;
use fetcher::PageFetcher;
use pipeline::{CancelToken, ContactPipeline};

#[derive(Parser, Debug)]
#[command(name = "hirecrawl", about = "Find companies hiring for a role and collect their contact emails")]
struct Cli {
    /// Locations to search, e.g. "Berlin" or "San Francisco, CA"
    #[arg(short, long, required = true, num_args = 1..)]
    locations: Vec<String>,

    /// Roles to search for; defaults to the configured target roles
    #[arg(short, long, num_args = 1..)]
    roles: Vec<String>,

    /// Stop after this many distinct companies
    #[arg(short, long, default_value_t = 50)]
    max_companies: usize,

    /// Route script-heavy pages through the headless renderer
    #[arg(long)]
    headless: bool,

    /// Concurrent request ceiling
    #[arg(long)]
    concurrency: Option<usize>,

    /// Output directory for CSV/JSON results
    #[arg(short, long)]
    output_dir: Option<String>,

    /// Config file path
    #[arg(short, long, default_value = "config.yml")]
    config: String,

    /// Verbose (debug-level) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "hirecrawl=debug" } else { "hirecrawl=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("{default_level},hyper=warn"))),
        )
        .init();

    let mut config = match load_config(&cli.config).await {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load {}: {}. Using defaults.", cli.config, e);
            Config::default()
        }
    };
    apply_cli_overrides(&mut config, &cli);
    config.validate()?;
    let config = Arc::new(config);

    tokio::fs::create_dir_all(&config.storage.output_dir).await?;

    let cancel = CancelToken::new();
    let fetcher = Arc::new(PageFetcher::new(&config)?);
    let registry = build_registry(&config, &fetcher, &cancel);

    let roles = if cli.roles.is_empty() {
        config.target_roles.clone()
    } else {
        cli.roles.clone()
    };

    let pipeline = ContactPipeline::new(
        Arc::clone(&config),
        registry,
        cli.max_companies,
        cancel.clone(),
    );

    // First Ctrl+C cancels gracefully; in-flight work gets a grace period.
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down gracefully...");
                cancel.cancel();
            }
        });
    }

    let summary = pipeline.run(&cli.locations, &roles, cli.max_companies).await?;

    info!(
        companies = summary.companies_discovered,
        with_emails = summary.companies_with_emails,
        emails = summary.total_emails,
        elapsed = ?summary.elapsed,
        cancelled = summary.cancelled,
        "🏁 run complete"
    );
    info!("CSV:  {}", summary.output.csv.display());
    info!("JSON: {}", summary.output.json.display());

    Ok(())
}

fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if cli.headless {
        config.browser.use_headless = true;
    }
    if let Some(concurrency) = cli.concurrency {
        config.rate_limit.max_concurrent_requests = concurrency;
    }
    if let Some(output_dir) = &cli.output_dir {
        config.storage.output_dir = output_dir.clone();
    }
}
