//! EMGRID Ingest - Partitioned raster ingestion tool

use anyhow::Result;
use clap::Parser;
use emgrid_common::logging::{init_logging, LogConfig, LogLevel};
use emgrid_ingest::{IngestConfig, IngestionOrchestrator};
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "emgrid-ingest")]
#[command(author, version, about = "EMGRID raster ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Import every <year>_emission directory under the root
    Run {
        /// Root directory to scan (overrides EMGRID_ROOT_DIR)
        #[arg(short, long)]
        root: Option<PathBuf>,
    },

    /// Pre-flight checks only (store connectivity and master table)
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Environment configuration first, verbose flag on top
    let mut log_config = LogConfig::from_env().unwrap_or_default();
    log_config.log_file_prefix = "emgrid-ingest".to_string();
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }

    init_logging(&log_config)?;

    let mut config = IngestConfig::load()?;

    let pool = Arc::new(
        PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
            .connect_lazy(&config.database.url)?,
    );

    match cli.command {
        Command::Run { root } => {
            if let Some(root) = root {
                config.pipeline.root_dir = root;
            }

            let orchestrator = IngestionOrchestrator::new(config, pool);
            let summary = orchestrator.run().await?;

            println!(
                "Processed {} directories, {} files, {} errors",
                summary.processed_dirs, summary.total_files, summary.total_errors
            );
        }
        Command::Check => {
            let orchestrator = IngestionOrchestrator::new(config, pool);
            orchestrator.preflight().await?;
            info!("Pre-flight checks passed");
        }
    }

    Ok(())
}
