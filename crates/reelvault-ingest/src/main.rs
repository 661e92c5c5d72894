//! ReelVault Ingest - fetch platform entities into the configured store

use anyhow::{Context, Result};
use clap::Parser;
use reelvault_common::logging::{init_logging, LogConfig, LogLevel};
use reelvault_ingest::config::IngestConfig;
use reelvault_ingest::fetcher::Fetcher;
use reelvault_ingest::pipeline::run_ingestion;
use reelvault_ingest::storage::StorageType;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "reelvault-ingest")]
#[command(author, version, about = "Short-video entity ingestion tool")]
struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(short, long, env = "REELVAULT_CONFIG")]
    config: Option<PathBuf>,

    /// Storage backend: file, relational or document
    #[arg(long)]
    storage_type: Option<StorageType>,

    /// Root directory for the file backend
    #[arg(long)]
    storage_location: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("reelvault-ingest")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    let mut config = IngestConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(storage_type) = cli.storage_type {
        config.storage.kind = storage_type;
    }
    if let Some(location) = cli.storage_location {
        config.storage.location = Some(location);
    }
    config.validate().context("Invalid configuration")?;

    let fetcher = Fetcher::from_config(config.fetcher.clone())?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing current record");
            on_signal.cancel();
        }
    });

    info!(storage_type = %config.storage.kind, "Starting ingestion");
    let summary = match run_ingestion(&config.storage, &fetcher, &config.pipeline, &cancel).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "Ingestion aborted");
            return Err(e.into());
        },
    };

    info!(
        saved = summary.total_saved(),
        failed = summary.total_failed(),
        cancelled = summary.cancelled,
        "Ingestion complete"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
