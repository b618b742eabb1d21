//! Batch ingestion orchestrator
//!
//! Walks year-named directories under a root, drives the per-file staging
//! import, and accumulates partial-failure-tolerant counters. One file is
//! fully imported before the next begins; the conversion step is CPU and
//! I/O heavy and partition DDL is easier to reason about without races.
//!
//! Only the pre-flight checks decide process-level success. Per-file
//! failures are caught here, counted and summarized; there is no cross-file
//! rollback because each file's import commits independently.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use sqlx::PgPool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::OnceLock;
use tracing::{error, info, warn};

use crate::catalog::PartitionCatalog;
use crate::config::IngestConfig;
use crate::convert::RasterConverter;
use crate::error::{IngestError, IngestResult};
use crate::guard::ConnectivityGuard;
use crate::staging::StagingImporter;

/// Outcome of one batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub processed_dirs: usize,
    pub total_files: usize,
    pub total_errors: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Drives a full batch over a root directory
pub struct IngestionOrchestrator {
    config: IngestConfig,
    pool: Arc<PgPool>,
}

impl IngestionOrchestrator {
    /// Create a new orchestrator over an explicit configuration value.
    pub fn new(config: IngestConfig, pool: Arc<PgPool>) -> Self {
        Self { config, pool }
    }

    /// Pre-flight checks: store reachability and master table existence.
    ///
    /// These are the only errors that abort a run and reach the process
    /// exit code.
    pub async fn preflight(&self) -> IngestResult<()> {
        let guard = ConnectivityGuard::new(self.pool.clone(), self.config.check_timeout());
        guard.check().await?;

        self.ensure_master_table().await?;

        Ok(())
    }

    /// Run the full batch over the configured root directory.
    pub async fn run(&self) -> IngestResult<BatchSummary> {
        let started_at = Utc::now();

        self.preflight().await?;

        let root = self.config.pipeline.root_dir.clone();
        let year_dirs = scan_year_dirs(&root)?;

        info!(root = %root.display(), dirs = year_dirs.len(), "Starting batch run");

        let mut catalog = PartitionCatalog::new(
            self.pool.clone(),
            self.config.pipeline.fact_table.clone(),
            self.config.ddl_timeout(),
        );

        let converter = RasterConverter::new(
            self.config.pipeline.raster2pgsql_path.clone(),
            self.config.pipeline.srid,
            self.config.pipeline.tile_size.clone(),
            self.config.conversion_timeout(),
        );

        let importer = StagingImporter::new(
            self.pool.clone(),
            converter,
            self.config.ddl_timeout(),
            self.config.import_timeout(),
        );

        let mut summary = BatchSummary {
            processed_dirs: 0,
            total_files: 0,
            total_errors: 0,
            started_at: Some(started_at),
            completed_at: None,
        };

        for (year, dir) in year_dirs {
            summary.processed_dirs += 1;

            // A directory that cannot be listed costs one error and the
            // batch moves on, same as a failing file.
            let files = match raster_files(&dir, &self.config.pipeline.raster_extension) {
                Ok(files) => files,
                Err(e) => {
                    error!(dir = %dir.display(), error = %e, "Failed to list directory");
                    summary.total_errors += 1;
                    continue;
                }
            };
            let mut imported = 0usize;
            let mut failed = 0usize;

            info!(dir = %dir.display(), year, files = files.len(), "Processing directory");

            for path in files {
                summary.total_files += 1;

                match importer.import(&mut catalog, &path, year).await {
                    Ok(()) => imported += 1,
                    Err(e) => {
                        error!(file = %path.display(), year, error = %e, "Import failed");
                        failed += 1;
                        summary.total_errors += 1;
                    }
                }
            }

            info!(dir = %dir.display(), year, imported, failed, "Directory completed");
        }

        // All prior imports committed independently; finalization failure
        // cannot undo them and stays a warning.
        if let Err(e) = self.finalize().await {
            warn!(error = %e, "Finalization step failed");
        }

        summary.completed_at = Some(Utc::now());

        info!(
            processed_dirs = summary.processed_dirs,
            total_files = summary.total_files,
            total_errors = summary.total_errors,
            "Batch run completed"
        );

        Ok(summary)
    }

    /// The master fact table must exist or be creatable before any
    /// directory is touched.
    async fn ensure_master_table(&self) -> IngestResult<()> {
        let table = &self.config.pipeline.fact_table;
        let ddl = master_table_ddl(table);
        let create = sqlx::query(&ddl).execute(&*self.pool);

        match tokio::time::timeout(self.config.ddl_timeout(), create).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(IngestError::MasterTable {
                table: table.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(IngestError::MasterTable {
                table: table.clone(),
                reason: format!("DDL timed out after {}s", self.config.ddl_timeout().as_secs()),
            }),
        }
    }

    /// Post-batch consistency metadata on the fact table. Best effort.
    async fn finalize(&self) -> IngestResult<()> {
        let sql = format!(
            "SELECT AddRasterConstraints('public'::name, '{}'::name, 'rast'::name)",
            self.config.pipeline.fact_table
        );
        let register = sqlx::query(&sql).execute(&*self.pool);

        match tokio::time::timeout(self.config.ddl_timeout(), register).await {
            Ok(result) => {
                result?;
                info!(table = %self.config.pipeline.fact_table, "Raster constraints registered");
                Ok(())
            }
            Err(_) => Err(IngestError::ImportTimeout {
                relation: self.config.pipeline.fact_table.clone(),
                secs: self.config.ddl_timeout().as_secs(),
            }),
        }
    }
}

fn master_table_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\
         rid bigserial, \
         rast raster, \
         filename text NOT NULL, \
         year integer NOT NULL, \
         category text NOT NULL, \
         subcategory text NOT NULL\
         ) PARTITION BY LIST (year)"
    )
}

fn year_dir_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{4})_emission$").expect("year directory pattern is valid")
    })
}

/// Parse a directory name of the form `<4-digit-year>_emission`.
pub fn parse_year_dir(name: &str) -> Option<i32> {
    year_dir_pattern()
        .captures(name)
        .and_then(|caps| caps[1].parse().ok())
}

/// Enumerate immediate subdirectories of `root` named `<year>_emission`,
/// oldest year first. Non-matching entries are skipped with a log line and
/// are not errors.
pub fn scan_year_dirs(root: &Path) -> IngestResult<Vec<(i32, PathBuf)>> {
    let mut dirs = Vec::new();

    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();

        if !path.is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        match parse_year_dir(&name) {
            Some(year) => dirs.push((year, path)),
            None => {
                info!(dir = %path.display(), "Skipping directory without a year prefix");
            }
        }
    }

    dirs.sort();
    Ok(dirs)
}

/// Files in `dir` carrying the expected raster extension, sorted by name.
pub fn raster_files(dir: &Path, extension: &str) -> IngestResult<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        let matches = path
            .extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
            .unwrap_or(false);

        if matches {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_year_dir() {
        assert_eq!(parse_year_dir("2020_emission"), Some(2020));
        assert_eq!(parse_year_dir("1999_emission"), Some(1999));
        // Non-numeric year is skipped, not an error
        assert_eq!(parse_year_dir("abc_emission"), None);
        assert_eq!(parse_year_dir("20_emission"), None);
        assert_eq!(parse_year_dir("2020_emissions"), None);
        assert_eq!(parse_year_dir("2020"), None);
    }

    #[test]
    fn test_master_table_ddl() {
        let ddl = master_table_ddl("emission_raster");
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS emission_raster ("));
        assert!(ddl.ends_with("PARTITION BY LIST (year)"));
        assert!(ddl.contains("filename text NOT NULL"));
        assert!(ddl.contains("subcategory text NOT NULL"));
    }
}
