//! Stream Harvest - Binary Entry Point
//!
//! `collect` runs one scheduled collection window and exports it, `export`
//! re-exports an existing buffer, `window` prints the window a run started
//! now would use.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use stream_harvest::types::AppResult;
use stream_harvest::utils::utc_now;
use stream_harvest::{Collector, CollectorConfig, LineSource, RunManifest};

#[derive(Parser)]
#[command(name = "stream-harvest", version, about = "Scheduled stream collection into batch files")]
struct Cli {
    /// Path to the JSON config file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, overriding the config and STREAM_HARVEST_DATA_DIR
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Collect one window from the input stream, then export it
    Collect {
        /// Newline-delimited event file; stdin when omitted
        #[arg(long)]
        input: Option<PathBuf>,

        /// Discard any existing buffer before collecting
        #[arg(long)]
        fresh: bool,
    },
    /// Export the existing buffer to the handoff artifact
    Export,
    /// Print the collection window a run started now would use
    Window,
}

fn load_config(cli: &Cli) -> AppResult<CollectorConfig> {
    let mut config = match &cli.config {
        Some(path) => CollectorConfig::from_file(path)?,
        None => CollectorConfig::default(),
    }
    .with_env_overrides();

    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> AppResult<()> {
    let config = load_config(&cli)?;
    tracing::debug!(data_dir = %config.data_dir.display(), "config loaded");
    let collector = Collector::new(config);

    match cli.command {
        Command::Collect { input, fresh } => {
            let source = match input {
                Some(path) => LineSource::file(path),
                None => LineSource::stdin(),
            };
            let report = collector.collect(source, fresh).await?;
            print_json(&report)
        }
        Command::Export => print_json(&collector.export()?),
        Command::Window => {
            let window = collector.window(utc_now())?;
            print_json(&RunManifest::new(&collector.config().filter.name, window))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries the JSON report
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stream_harvest=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "stream-harvest failed");
            ExitCode::FAILURE
        }
    }
}
