//! Configuration management
//!
//! The pipeline is configured with an explicit value passed into the
//! orchestrator at construction. Nothing in the pipeline reads ambient
//! global state; `IngestConfig::from_env` is a convenience for the CLI
//! entry point only.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Ingestion Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/emgrid";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default root directory holding the `<year>_emission` directories.
pub const DEFAULT_ROOT_DIR: &str = "./data";

/// Default master fact table name.
pub const DEFAULT_FACT_TABLE: &str = "emission_raster";

/// Default raster file extension to scan for.
pub const DEFAULT_RASTER_EXTENSION: &str = "tif";

/// Default spatial reference identifier stamped onto converted rasters.
pub const DEFAULT_SRID: i32 = 5179;

/// Default tiling parameter handed to the conversion utility.
pub const DEFAULT_TILE_SIZE: &str = "256x256";

/// Default conversion utility executable.
pub const DEFAULT_RASTER2PGSQL_PATH: &str = "raster2pgsql";

/// Default pre-flight connectivity deadline in seconds.
pub const DEFAULT_CHECK_TIMEOUT_SECS: u64 = 10;

/// Default deadline for existence checks and partition DDL in seconds.
pub const DEFAULT_DDL_TIMEOUT_SECS: u64 = 30;

/// Default deadline for the external conversion step in seconds.
pub const DEFAULT_CONVERSION_TIMEOUT_SECS: u64 = 120;

/// Default deadline for store-side script execution and bulk copy in
/// seconds. Larger than the conversion deadline since bulk data transfer
/// follows.
pub const DEFAULT_IMPORT_TIMEOUT_SECS: u64 = 600;

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub database: DatabaseConfig,
    pub pipeline: PipelineConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Pipeline-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root directory scanned for `<year>_emission` subdirectories
    pub root_dir: PathBuf,
    /// Master fact table receiving all imported rasters
    pub fact_table: String,
    /// File extension of importable rasters
    pub raster_extension: String,
    /// Spatial reference identifier for the conversion utility
    pub srid: i32,
    /// Tiling parameter for the conversion utility
    pub tile_size: String,
    /// Conversion utility executable
    pub raster2pgsql_path: PathBuf,
    /// Pre-flight connectivity deadline
    pub check_timeout_secs: u64,
    /// Deadline for existence checks and partition DDL
    pub ddl_timeout_secs: u64,
    /// Deadline for the external conversion step
    pub conversion_timeout_secs: u64,
    /// Deadline for script execution and bulk copy
    pub import_timeout_secs: u64,
}

impl IngestConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = IngestConfig {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                connect_timeout_secs: std::env::var("DATABASE_CONNECT_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
            },
            pipeline: PipelineConfig {
                root_dir: std::env::var("EMGRID_ROOT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_ROOT_DIR)),
                fact_table: std::env::var("EMGRID_FACT_TABLE")
                    .unwrap_or_else(|_| DEFAULT_FACT_TABLE.to_string()),
                raster_extension: std::env::var("EMGRID_RASTER_EXTENSION")
                    .unwrap_or_else(|_| DEFAULT_RASTER_EXTENSION.to_string()),
                srid: std::env::var("EMGRID_SRID")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SRID),
                tile_size: std::env::var("EMGRID_TILE_SIZE")
                    .unwrap_or_else(|_| DEFAULT_TILE_SIZE.to_string()),
                raster2pgsql_path: std::env::var("EMGRID_RASTER2PGSQL")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_RASTER2PGSQL_PATH)),
                check_timeout_secs: std::env::var("EMGRID_CHECK_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_CHECK_TIMEOUT_SECS),
                ddl_timeout_secs: std::env::var("EMGRID_DDL_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DDL_TIMEOUT_SECS),
                conversion_timeout_secs: std::env::var("EMGRID_CONVERSION_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_CONVERSION_TIMEOUT_SECS),
                import_timeout_secs: std::env::var("EMGRID_IMPORT_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_IMPORT_TIMEOUT_SECS),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.pipeline.fact_table.is_empty() {
            anyhow::bail!("Fact table name cannot be empty");
        }

        if !self
            .pipeline
            .fact_table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            anyhow::bail!(
                "Fact table name {:?} must contain only alphanumerics and underscores",
                self.pipeline.fact_table
            );
        }

        if !valid_tile_size(&self.pipeline.tile_size) {
            anyhow::bail!(
                "Tile size {:?} must be of the form <width>x<height>",
                self.pipeline.tile_size
            );
        }

        if self.pipeline.import_timeout_secs <= self.pipeline.conversion_timeout_secs {
            anyhow::bail!(
                "Import timeout ({}s) must exceed the conversion timeout ({}s)",
                self.pipeline.import_timeout_secs,
                self.pipeline.conversion_timeout_secs
            );
        }

        Ok(())
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.check_timeout_secs)
    }

    pub fn ddl_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.ddl_timeout_secs)
    }

    pub fn conversion_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.conversion_timeout_secs)
    }

    pub fn import_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.import_timeout_secs)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            pipeline: PipelineConfig {
                root_dir: PathBuf::from(DEFAULT_ROOT_DIR),
                fact_table: DEFAULT_FACT_TABLE.to_string(),
                raster_extension: DEFAULT_RASTER_EXTENSION.to_string(),
                srid: DEFAULT_SRID,
                tile_size: DEFAULT_TILE_SIZE.to_string(),
                raster2pgsql_path: PathBuf::from(DEFAULT_RASTER2PGSQL_PATH),
                check_timeout_secs: DEFAULT_CHECK_TIMEOUT_SECS,
                ddl_timeout_secs: DEFAULT_DDL_TIMEOUT_SECS,
                conversion_timeout_secs: DEFAULT_CONVERSION_TIMEOUT_SECS,
                import_timeout_secs: DEFAULT_IMPORT_TIMEOUT_SECS,
            },
        }
    }
}

fn valid_tile_size(tile_size: &str) -> bool {
    match tile_size.split_once('x') {
        Some((w, h)) => {
            w.chars().all(|c| c.is_ascii_digit())
                && h.chars().all(|c| c.is_ascii_digit())
                && !w.is_empty()
                && !h.is_empty()
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = IngestConfig::default();
        config.validate().unwrap();
        assert_eq!(config.pipeline.fact_table, "emission_raster");
        assert_eq!(config.pipeline.srid, 5179);
    }

    #[test]
    fn test_import_timeout_must_exceed_conversion_timeout() {
        let mut config = IngestConfig::default();
        config.pipeline.import_timeout_secs = config.pipeline.conversion_timeout_secs;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fact_table_identifier_is_checked() {
        let mut config = IngestConfig::default();
        config.pipeline.fact_table = "emission raster; drop".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tile_size_format() {
        assert!(valid_tile_size("256x256"));
        assert!(valid_tile_size("100x50"));
        assert!(!valid_tile_size("256"));
        assert!(!valid_tile_size("x256"));
        assert!(!valid_tile_size("256x"));
        assert!(!valid_tile_size("autoxauto"));
    }
}
