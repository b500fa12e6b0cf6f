//! # Outline Backup
//!
//! Unattended, periodic backups of an [Outline](https://www.getoutline.com) wiki.
//!
//! ## Overview
//!
//! A backup run drives the wiki's asynchronous export job through its lifecycle
//! (initiate, poll, fetch, delete), optionally relays the archive to S3 or an
//! S3-compatible store, and then prunes old archives so storage stays bounded.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use outline_backup::config::BackupConfig;
//! use outline_backup::runner::BackupRunner;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BackupConfig::from_env()?;
//! let report = BackupRunner::new(&config).run().await?;
//! println!("saved {}", report.archive.file_name);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and fail-fast validation
//! - [`export`]: Outline API client and the export lifecycle
//! - [`backup`]: Artifact stores and the retention policy
//! - [`preflight`]: Connectivity checks run before a backup
//! - [`runner`]: One complete backup run

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use thiserror::Error;

/// Result type for backup operations
pub type Result<T> = std::result::Result<T, OutlineBackupError>;

/// Top-level error for a backup invocation
#[derive(Error, Debug)]
pub enum OutlineBackupError {
    /// Configuration is missing or invalid
    #[error(transparent)]
    Config(#[from] config::ConfigReport),

    /// A pre-flight check failed
    #[error("Preflight check failed: {0}")]
    Preflight(#[from] preflight::PreflightError),

    /// The backup run aborted
    #[error("Backup run failed: {0}")]
    Run(#[from] runner::RunError),
}

/// Configuration loading and validation
pub mod config;

/// Outline export lifecycle
pub mod export;

/// Artifact storage and retention
pub mod backup;

/// Pre-flight connectivity checks
pub mod preflight;

/// Backup run orchestration
pub mod runner;
