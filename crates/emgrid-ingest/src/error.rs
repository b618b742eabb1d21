//! Ingestion error types
//!
//! Only the pre-flight variants (`Connectivity`, `MasterTable`) abort a run.
//! Everything else is scoped to a single file and counted by the
//! orchestrator.

use thiserror::Error;

/// Result type alias for ingestion operations
pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Error type for the ingestion pipeline
#[derive(Error, Debug)]
pub enum IngestError {
    /// The store did not answer the pre-flight probe. Fatal.
    #[error("store unreachable: {0}")]
    Connectivity(String),

    /// The master fact table does not exist and could not be created. Fatal.
    #[error("master table {table} could not be ensured: {reason}")]
    MasterTable { table: String, reason: String },

    /// A level of the partition chain could not be checked or created.
    /// Fails the current file only.
    #[error("partition {relation} could not be ensured: {reason}")]
    PartitionCreation { relation: String, reason: String },

    /// The external conversion utility exited abnormally.
    #[error("conversion failed for {file}: {reason}")]
    ConversionFailed { file: String, reason: String },

    /// The external conversion utility exceeded its deadline.
    #[error("conversion of {file} timed out after {secs}s")]
    ConversionTimeout { file: String, secs: u64 },

    /// A store-side import step (script execution or merge) exceeded its
    /// deadline.
    #[error("import into {relation} timed out after {secs}s")]
    ImportTimeout { relation: String, secs: u64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] emgrid_common::EmgridError),
}

impl IngestError {
    /// True for errors that must abort the whole run rather than a single
    /// file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IngestError::Connectivity(_) | IngestError::MasterTable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(IngestError::Connectivity("refused".into()).is_fatal());
        assert!(IngestError::MasterTable {
            table: "emission_raster".into(),
            reason: "permission denied".into(),
        }
        .is_fatal());

        assert!(!IngestError::PartitionCreation {
            relation: "emission_raster_y2020".into(),
            reason: "timeout".into(),
        }
        .is_fatal());
        assert!(!IngestError::ConversionTimeout {
            file: "emission.p.co.tif".into(),
            secs: 120,
        }
        .is_fatal());
    }
}
