//! External raster-to-relation conversion
//!
//! The pipeline treats the conversion utility (`raster2pgsql`) as a black
//! box: given a file path, a target relation name, a spatial reference
//! identifier and a tile size, it emits a SQL script that creates and
//! populates that relation. Decoding, reprojection and tiling all live on
//! the other side of this boundary.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::{IngestError, IngestResult};

/// Deadline-bound wrapper around the conversion utility
#[derive(Debug, Clone)]
pub struct RasterConverter {
    program: PathBuf,
    srid: i32,
    tile_size: String,
    timeout: Duration,
}

impl RasterConverter {
    pub fn new(
        program: impl Into<PathBuf>,
        srid: i32,
        tile_size: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            srid,
            tile_size: tile_size.into(),
            timeout,
        }
    }

    /// Argument vector for converting `path` into `relation`.
    pub fn command_args(&self, path: &Path, relation: &str) -> Vec<String> {
        vec![
            "-s".to_string(),
            self.srid.to_string(),
            "-t".to_string(),
            self.tile_size.clone(),
            path.display().to_string(),
            relation.to_string(),
        ]
    }

    /// Run the utility against `path`, targeting `relation`, and capture the
    /// emitted SQL script. Bounded by the conversion deadline; a breach
    /// kills the child process and fails the current file.
    pub async fn convert(&self, path: &Path, relation: &str) -> IngestResult<String> {
        let file = path.display().to_string();

        let output = Command::new(&self.program)
            .args(self.command_args(path, relation))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, output).await {
            Ok(result) => result.map_err(|e| IngestError::ConversionFailed {
                file: file.clone(),
                reason: format!("failed to spawn {}: {e}", self.program.display()),
            })?,
            Err(_) => {
                return Err(IngestError::ConversionTimeout {
                    file,
                    secs: self.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IngestError::ConversionFailed {
                file,
                reason: format!(
                    "{} exited with {}: {}",
                    self.program.display(),
                    output.status,
                    stderr.trim()
                ),
            });
        }

        let script = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(file = %file, relation = %relation, script_bytes = script.len(), "Conversion script captured");

        Ok(script)
    }
}
