//! PaperWatch Replay
//!
//! Replays recorded source results through the pipeline:
//! 1. Loads the recorded results and the previously delivered keys
//! 2. Filters, scores and selects against the configured vocabulary
//! 3. Prints the run report as JSON on stdout
//!
//! With `--database` the seen keys, run record and score records live in
//! the configured PostgreSQL database instead of memory.

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use paperwatch_common::config::{AppConfig, ObservabilityConfig};
use paperwatch_common::models::SourceResult;
use paperwatch_common::store::{MemoryStore, RunStore};
use paperwatch_common::{DbPool, Repository, VERSION};
use paperwatch_pipeline::{Pipeline, RecordedSource};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "paperwatch-replay", version, about = "Replay recorded source results through the pipeline")]
struct Args {
    /// JSON array of recorded source results
    #[arg(long)]
    results: PathBuf,

    /// JSON array of canonical keys delivered by earlier runs
    #[arg(long, conflicts_with = "database")]
    seen: Option<PathBuf>,

    /// Persist to the configured database instead of an in-memory store
    #[arg(long)]
    database: bool,

    /// Reference date, YYYY-MM-DD (defaults to today in UTC)
    #[arg(long)]
    today: Option<NaiveDate>,

    /// Override selection.target_k
    #[arg(long)]
    target_k: Option<usize>,

    /// Configuration file to use instead of the layered config/ directory
    #[arg(long, env = "PAPERWATCH_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = match args.config {
        Some(ref path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;

    init_tracing(&config.observability);
    paperwatch_common::metrics::register_metrics();
    info!("Starting PaperWatch Replay v{}", VERSION);

    let results: Vec<SourceResult> = read_json(&args.results)?;
    info!(sources = results.len(), "Loaded recorded results");

    if let Some(target_k) = args.target_k {
        config.pipeline.selection.target_k = target_k;
    }
    let today = args.today.unwrap_or_else(|| Utc::now().date_naive());

    let store: Arc<dyn RunStore> = if args.database {
        let pool = DbPool::new(&config.database)
            .await
            .context("Failed to connect to database")?;
        let repository = Repository::new(pool);
        repository.ping().await?;
        Arc::new(repository)
    } else {
        let seen: Vec<String> = match args.seen {
            Some(ref path) => read_json(path)?,
            None => Vec::new(),
        };
        info!(seen = seen.len(), "Loaded previously delivered keys");
        Arc::new(MemoryStore::with_seen(seen))
    };

    let mut pipeline = Pipeline::new(config.pipeline, store)?;
    for result in results {
        pipeline.register(RecordedSource::new(result));
    }

    let cancel = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let report = pipeline.run_until(today, cancel).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn init_tracing(observability: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&observability.log_level));

    // stdout carries the report
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if observability.json_logging {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}
