//! Staged per-file import
//!
//! Each file is imported through an ephemeral staging relation owned by that
//! single attempt:
//!
//! 1. classify the filename
//! 2. ensure the partition chain, abort the file on failure
//! 3. delete prior rows for the same filename in the leaf (idempotent
//!    re-import; a failure here is a warning, not fatal)
//! 4. run the conversion utility into a uniquely named staging relation
//! 5. execute the emitted script against the store
//! 6. copy the staged rows into the leaf, stamping filename, year, category
//!    and subcategory
//! 7. drop the staging relation unconditionally, success or failure
//!
//! Re-running the same filename therefore converges on exactly one row set
//! in its leaf partition, and no staging relation outlives its attempt.

use sqlx::PgPool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::PartitionCatalog;
use crate::classify::{classify, Classification};
use crate::convert::RasterConverter;
use crate::error::{IngestError, IngestResult};

/// Imports one raster file at a time through a staging relation
pub struct StagingImporter {
    pool: Arc<PgPool>,
    converter: RasterConverter,
    /// Short deadline for row deletes and staging drops
    statement_timeout: Duration,
    /// Long deadline for script execution and the bulk copy
    import_timeout: Duration,
}

impl StagingImporter {
    pub fn new(
        pool: Arc<PgPool>,
        converter: RasterConverter,
        statement_timeout: Duration,
        import_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            converter,
            statement_timeout,
            import_timeout,
        }
    }

    /// Import a single file into its leaf partition.
    ///
    /// Side-effecting on the store. Any failure is scoped to this file; the
    /// staging relation is reclaimed on every exit path.
    pub async fn import(
        &self,
        catalog: &mut PartitionCatalog,
        path: &Path,
        year: i32,
    ) -> IngestResult<()> {
        let filename = basename(path);
        let classification = classify(&filename);

        let leaf = catalog
            .ensure_chain(
                year,
                classification.category.as_str(),
                &classification.subcategory,
            )
            .await?;

        // Idempotent re-import: prior rows for this filename go first. Not
        // fatal; the import itself may still succeed.
        if let Err(e) = self.delete_prior_rows(&leaf, &filename).await {
            warn!(file = %filename, relation = %leaf, error = %e, "Failed to clear prior rows");
        }

        let staging = staging_relation_name();

        let result = self
            .stage_and_merge(path, &filename, year, &classification, &staging, &leaf)
            .await;

        // Unconditional cleanup: runs on every exit path so a long batch
        // cannot leak staging relations.
        if let Err(e) = self.drop_staging(&staging).await {
            warn!(relation = %staging, error = %e, "Failed to drop staging relation");
        }

        if result.is_ok() {
            info!(
                file = %filename,
                year,
                category = %classification.category,
                subcategory = %classification.subcategory,
                relation = %leaf,
                "Imported raster"
            );
        }

        result
    }

    async fn stage_and_merge(
        &self,
        path: &Path,
        filename: &str,
        year: i32,
        classification: &Classification,
        staging: &str,
        leaf: &str,
    ) -> IngestResult<()> {
        let script = self.converter.convert(path, staging).await?;
        self.execute_script(&script, staging).await?;
        self.merge_into_leaf(staging, leaf, filename, year, classification)
            .await
    }

    /// Execute the conversion script, creating and populating the staging
    /// relation. Bulk data transfer happens here, so this carries the long
    /// deadline.
    async fn execute_script(&self, script: &str, staging: &str) -> IngestResult<()> {
        let run = sqlx::raw_sql(script).execute(&*self.pool);

        match tokio::time::timeout(self.import_timeout, run).await {
            Ok(result) => {
                result?;
                Ok(())
            }
            Err(_) => Err(IngestError::ImportTimeout {
                relation: staging.to_string(),
                secs: self.import_timeout.as_secs(),
            }),
        }
    }

    /// Copy staged rows into the leaf, stamping each with its metadata.
    async fn merge_into_leaf(
        &self,
        staging: &str,
        leaf: &str,
        filename: &str,
        year: i32,
        classification: &Classification,
    ) -> IngestResult<()> {
        let sql = merge_sql(staging, leaf);
        let copy = sqlx::query(&sql)
            .bind(filename)
            .bind(year)
            .bind(classification.category.as_str())
            .bind(&classification.subcategory)
            .execute(&*self.pool);

        match tokio::time::timeout(self.import_timeout, copy).await {
            Ok(result) => {
                let outcome = result?;
                info!(relation = %leaf, rows = outcome.rows_affected(), "Merged staged rows");
                Ok(())
            }
            Err(_) => Err(IngestError::ImportTimeout {
                relation: leaf.to_string(),
                secs: self.import_timeout.as_secs(),
            }),
        }
    }

    async fn delete_prior_rows(&self, leaf: &str, filename: &str) -> IngestResult<u64> {
        let sql = format!("DELETE FROM {leaf} WHERE filename = $1");
        let delete = sqlx::query(&sql).bind(filename).execute(&*self.pool);

        match tokio::time::timeout(self.statement_timeout, delete).await {
            Ok(result) => Ok(result?.rows_affected()),
            Err(_) => Err(IngestError::ImportTimeout {
                relation: leaf.to_string(),
                secs: self.statement_timeout.as_secs(),
            }),
        }
    }

    async fn drop_staging(&self, staging: &str) -> IngestResult<()> {
        let sql = format!("DROP TABLE IF EXISTS {staging}");
        let drop = sqlx::query(&sql).execute(&*self.pool);

        match tokio::time::timeout(self.statement_timeout, drop).await {
            Ok(result) => {
                result?;
                Ok(())
            }
            Err(_) => Err(IngestError::ImportTimeout {
                relation: staging.to_string(),
                secs: self.statement_timeout.as_secs(),
            }),
        }
    }
}

/// Unique staging relation name for one import attempt. Uniqueness per
/// attempt keeps concurrent executions safe should they ever be introduced.
fn staging_relation_name() -> String {
    format!("staging_{}", Uuid::new_v4().simple())
}

fn merge_sql(staging: &str, leaf: &str) -> String {
    format!(
        "INSERT INTO {leaf} (rast, filename, year, category, subcategory) \
         SELECT rast, $1, $2, $3, $4 FROM {staging}"
    )
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_names_are_unique_per_attempt() {
        let a = staging_relation_name();
        let b = staging_relation_name();
        assert_ne!(a, b);
        assert!(a.starts_with("staging_"));
    }

    #[test]
    fn test_merge_sql_stamps_metadata() {
        let sql = merge_sql("staging_ab12", "emission_raster_y2020_point_co");
        assert_eq!(
            sql,
            "INSERT INTO emission_raster_y2020_point_co \
             (rast, filename, year, category, subcategory) \
             SELECT rast, $1, $2, $3, $4 FROM staging_ab12"
        );
    }

    #[test]
    fn test_basename() {
        assert_eq!(
            basename(Path::new("/data/2020_emission/emission.p.co.tif")),
            "emission.p.co.tif"
        );
    }
}
