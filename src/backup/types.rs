// Backup artifact types - artifacts, retention policy, errors

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Backend;

/// One stored backup archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupArtifact {
    /// File name (local) or object key (S3)
    pub key: String,
    /// Filesystem mtime or provider-reported LastModified
    pub last_modified: DateTime<Utc>,
    /// Size in bytes
    pub size_bytes: u64,
}

/// Keep-count retention: the newest `keep` artifacts survive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Number of most recent artifacts to keep
    pub keep: usize,
}

impl RetentionPolicy {
    /// Keep the `keep` most recent artifacts
    pub fn new(keep: usize) -> Self {
        Self { keep }
    }
}

/// What one retention pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupResult {
    /// Backend the pass ran against
    pub backend: Backend,
    /// Keys deleted, oldest first
    pub deleted: Vec<String>,
    /// Artifacts left after the pass
    pub retained: usize,
}

/// Failure inside an artifact store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem operation failed
    #[error("IO error at {}: {source}", path.display())]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },
    /// Key is not a plain file name or not valid UTF-8
    #[error("Invalid artifact key: {0:?}")]
    InvalidKey(String),
    /// The object storage service refused or failed a request
    #[error("Object storage error: {0}")]
    ObjectStorage(String),
}

/// Failure of a retention pass
#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    /// Enumeration failed; nothing was deleted
    #[error("Failed to list {backend} artifacts: {source}")]
    List {
        /// Backend being listed
        backend: Backend,
        /// Store failure
        #[source]
        source: StoreError,
    },
    /// A deletion failed; the remaining victims were left in place
    #[error("Failed to delete {key} after pruning {deleted_before} artifact(s): {source}")]
    Delete {
        /// Artifact that could not be deleted
        key: String,
        /// Deletions that succeeded before the failure
        deleted_before: usize,
        /// Store failure
        #[source]
        source: StoreError,
    },
}
