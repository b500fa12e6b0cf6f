//! Checks run once before a backup starts.
//!
//! Configuration validity is already established by [`BackupConfig`]; these
//! checks prove the environment can actually carry a run: the save directory
//! is writable, the wiki answers, and object storage is reachable.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::backup::StoreError;
use crate::config::{BackupConfig, S3Config};

const PROBE_FILE: &str = "test_write";
const API_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A failed pre-flight check
#[derive(Debug, Error)]
pub enum PreflightError {
    /// The save directory could not be created
    #[error("Unable to create save directory {}: {source}", path.display())]
    SaveDirCreate {
        /// Save directory
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Writing a file into the save directory failed
    #[error("Save directory {} is not writable: {source}", path.display())]
    SaveDirNotWritable {
        /// Save directory
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The wiki gave no HTTP answer in time
    #[error("API endpoint {url} is not reachable: {source}")]
    ApiUnreachable {
        /// URL that was tried
        url: String,
        /// Transport failure
        #[source]
        source: reqwest::Error,
    },

    /// Object storage did not answer ListBuckets
    #[error("Object storage check failed: {0}")]
    ObjectStorage(#[from] StoreError),
}

/// Run every pre-flight check, stopping at the first failure
pub async fn run_checks(config: &BackupConfig) -> Result<(), PreflightError> {
    check_save_dir(config).await?;
    check_api(config).await?;
    check_object_storage(config).await?;
    info!("Preflight checks passed");
    Ok(())
}

/// Create the save directory and prove it is writable
pub async fn check_save_dir(config: &BackupConfig) -> Result<(), PreflightError> {
    let dir = &config.save_dir;
    fs::create_dir_all(dir)
        .await
        .map_err(|source| PreflightError::SaveDirCreate {
            path: dir.clone(),
            source,
        })?;

    let probe = dir.join(PROBE_FILE);
    fs::write(&probe, b"test")
        .await
        .map_err(|source| PreflightError::SaveDirNotWritable {
            path: dir.clone(),
            source,
        })?;
    if let Err(e) = fs::remove_file(&probe).await {
        warn!(path = %probe.display(), error = %e, "Failed to remove write probe");
    }

    Ok(())
}

/// Any HTTP response counts as reachable
pub async fn check_api(config: &BackupConfig) -> Result<(), PreflightError> {
    let url = config.api_base_url.as_str();
    let unreachable = |source: reqwest::Error| PreflightError::ApiUnreachable {
        url: url.to_string(),
        source,
    };

    let client = reqwest::Client::builder()
        .timeout(API_PROBE_TIMEOUT)
        .build()
        .map_err(unreachable)?;

    client.get(url).send().await.map_err(unreachable)?;
    Ok(())
}

/// Probe object storage unless it is off or limited to minimal permissions
pub async fn check_object_storage(config: &BackupConfig) -> Result<(), PreflightError> {
    let Some(s3) = &config.s3 else {
        return Ok(());
    };

    if s3.minimal_permissions {
        info!("S3 connectivity check disabled via MINIMAL_S3_PERMISSIONS");
        return Ok(());
    }

    probe_object_storage(s3).await?;
    Ok(())
}

#[cfg(feature = "s3")]
async fn probe_object_storage(s3: &S3Config) -> Result<(), StoreError> {
    crate::backup::S3ArtifactStore::new(s3.clone())
        .await
        .check_connectivity()
        .await
}

#[cfg(not(feature = "s3"))]
async fn probe_object_storage(_s3: &S3Config) -> Result<(), StoreError> {
    Err(StoreError::ObjectStorage(
        "object storage requested but built without the `s3` feature".to_string(),
    ))
}
