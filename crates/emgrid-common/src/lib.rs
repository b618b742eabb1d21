//! EMGRID Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the EMGRID workspace.
//!
//! # Overview
//!
//! This crate provides the functionality used across all EMGRID workspace
//! members:
//!
//! - **Error Handling**: the workspace-level error type and result alias
//! - **Logging**: centralized `tracing` configuration and initialization
//!
//! # Example
//!
//! ```no_run
//! use emgrid_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{EmgridError, Result};
