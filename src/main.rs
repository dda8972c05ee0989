// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! fanout-replicator: process one day's change log and exit.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fanout_replicator::config::{MarkPolicy, ReplicatorConfig};
use fanout_replicator::error::Result;
use fanout_replicator::log::DateKey;
use fanout_replicator::{Replicator, RunReport};

/// Replicate one day's change log from the source store to every destination.
#[derive(Parser)]
#[command(name = "fanout-replicator")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(short, long, env = "REPLICATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Source credential blob (JSON or URL shorthand such as sqlite:///path)
    #[arg(long, env = "REPLICATOR_SOURCE", conflicts_with = "source_file")]
    source: Option<String>,

    /// File holding the source credential blob (defaults to source.credentials_file)
    #[arg(long, env = "REPLICATOR_SOURCE_FILE")]
    source_file: Option<PathBuf>,

    /// Log day to process, YYYY-MM-DD (defaults to today in UTC)
    #[arg(short, long, env = "REPLICATOR_DATE")]
    date: Option<String>,

    /// When to mark an entry processed
    #[arg(long, value_enum)]
    mark_policy: Option<MarkPolicy>,

    /// Apply each entry to all destinations concurrently
    #[arg(long)]
    parallel: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    match run(cli).await {
        Ok(report) => {
            tracing::info!(%report, "Done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, kind = %e.kind(), "Replication run failed");
            ExitCode::from(1)
        }
    }
}

fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(cli: Cli) -> Result<RunReport> {
    let mut config = match &cli.config {
        Some(path) => ReplicatorConfig::from_file(path)?,
        None => ReplicatorConfig::default(),
    };
    if let Some(policy) = cli.mark_policy {
        config.log.mark_policy = policy;
    }
    if cli.parallel {
        config.fanout.parallel = true;
    }

    let date = match &cli.date {
        Some(raw) => raw.parse::<DateKey>()?,
        None => DateKey::today_utc(),
    };

    let blob = match cli.source {
        Some(blob) => blob,
        None => {
            let path = cli
                .source_file
                .unwrap_or_else(|| PathBuf::from(&config.source.credentials_file));
            Replicator::read_source_credentials(path)?
        }
    };

    tracing::info!(
        date = %date,
        mark_policy = %config.log.mark_policy,
        parallel = config.fanout.parallel,
        "Starting replication run"
    );

    Replicator::new(config).run_from_credentials(&blob, date).await
}
