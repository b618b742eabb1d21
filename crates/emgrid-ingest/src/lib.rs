//! EMGRID Ingest Library
//!
//! Ingests large batches of yearly emission rasters into a partitioned
//! spatial store so that downstream calculators can query by year, category
//! and pollutant without scanning the whole dataset.
//!
//! # Pipeline
//!
//! - **classify**: pure filename → (category, subcategory) mapping
//! - **catalog**: idempotent year → category → subcategory partition chain
//! - **convert**: deadline-bound wrapper around the external
//!   raster-to-relation utility
//! - **staging**: per-file stage-then-merge import with unconditional
//!   cleanup
//! - **orchestrator**: directory walk, partial-failure counters, summary
//!
//! # Example
//!
//! ```no_run
//! use emgrid_ingest::{IngestConfig, IngestionOrchestrator};
//! use sqlx::postgres::PgPoolOptions;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::load()?;
//!     let pool = Arc::new(PgPoolOptions::new().connect_lazy(&config.database.url)?);
//!     let summary = IngestionOrchestrator::new(config, pool).run().await?;
//!     println!("{} errors", summary.total_errors);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod classify;
pub mod config;
pub mod convert;
pub mod error;
pub mod guard;
pub mod orchestrator;
pub mod staging;

pub use catalog::PartitionCatalog;
pub use classify::{classify, Category, Classification};
pub use config::IngestConfig;
pub use convert::RasterConverter;
pub use error::{IngestError, IngestResult};
pub use guard::ConnectivityGuard;
pub use orchestrator::{BatchSummary, IngestionOrchestrator};
pub use staging::StagingImporter;
