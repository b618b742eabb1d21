//! Pre-flight connectivity check
//!
//! A batch run can take hours; nothing is worth starting if the store is
//! not reachable. The guard performs one bounded round trip before any
//! directory is touched, and its failure is the only condition (together
//! with the master table check) that aborts the whole run.

use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{IngestError, IngestResult};

/// Bounded reachability probe against the store
pub struct ConnectivityGuard {
    pool: Arc<PgPool>,
    timeout: Duration,
}

impl ConnectivityGuard {
    pub fn new(pool: Arc<PgPool>, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// One `SELECT 1` round trip within the deadline.
    pub async fn check(&self) -> IngestResult<()> {
        let probe = sqlx::query("SELECT 1").execute(&*self.pool);

        match tokio::time::timeout(self.timeout, probe).await {
            Ok(Ok(_)) => {
                debug!("Store reachable");
                Ok(())
            }
            Ok(Err(e)) => Err(IngestError::Connectivity(e.to_string())),
            Err(_) => Err(IngestError::Connectivity(format!(
                "no response within {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}
