// Artifact Storage Backends - local filesystem and object storage

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, warn};

use super::types::{BackupArtifact, StoreError};
use crate::config::{Backend, BackupConfig};

/// A place where backup archives live
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Which backend this store represents
    fn backend(&self) -> Backend;

    /// Every artifact currently held, in listing order
    async fn list_artifacts(&self) -> Result<Vec<BackupArtifact>, StoreError>;

    /// Remove one artifact by key
    async fn delete_artifact(&self, key: &str) -> Result<(), StoreError>;

    /// Make the archive at `path` an artifact of this store
    async fn store_archive(&self, path: &Path) -> Result<BackupArtifact, StoreError>;
}

/// Build the store for the backend this configuration selects
pub async fn open_store(config: &BackupConfig) -> Result<Box<dyn ArtifactStore>, StoreError> {
    match &config.s3 {
        None => Ok(Box::new(LocalArtifactStore::new(&config.save_dir))),
        #[cfg(feature = "s3")]
        Some(s3) => Ok(Box::new(super::s3::S3ArtifactStore::new(s3.clone()).await)),
        #[cfg(not(feature = "s3"))]
        Some(_) => Err(StoreError::ObjectStorage(
            "object storage requested but built without the `s3` feature".to_string(),
        )),
    }
}

/// Artifacts as plain files in one directory, ordered by mtime
pub struct LocalArtifactStore {
    directory: PathBuf,
}

impl LocalArtifactStore {
    /// Store rooted at `directory`; it need not exist yet
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// The directory holding the artifacts
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn artifact_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let is_plain_name = Path::new(key).file_name().and_then(|n| n.to_str()) == Some(key);
        if !is_plain_name {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.directory.join(key))
    }

    async fn describe(path: &Path) -> Result<BackupArtifact, StoreError> {
        let metadata = fs::metadata(path).await.map_err(|source| io_error(path, source))?;
        let modified = metadata.modified().map_err(|source| io_error(path, source))?;
        let key = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::InvalidKey(path.display().to_string()))?
            .to_string();

        Ok(BackupArtifact {
            key,
            last_modified: DateTime::<Utc>::from(modified),
            size_bytes: metadata.len(),
        })
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    fn backend(&self) -> Backend {
        Backend::Local
    }

    async fn list_artifacts(&self) -> Result<Vec<BackupArtifact>, StoreError> {
        let mut entries = match fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(io_error(&self.directory, source)),
        };

        let mut artifacts = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| io_error(&self.directory, source))?
        {
            let path = entry.path();

            // Keys must round-trip through `delete_artifact`, which takes UTF-8
            if entry.file_name().to_str().is_none() {
                warn!(path = %path.display(), "Skipping entry with a non-UTF-8 name");
                continue;
            }

            let file_type = entry
                .file_type()
                .await
                .map_err(|source| io_error(&path, source))?;

            // Subdirectories are not artifacts; symlinks are judged by their target
            if file_type.is_dir() {
                continue;
            }
            if file_type.is_symlink() && fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(true) {
                continue;
            }

            artifacts.push(Self::describe(&path).await?);
        }

        debug!(
            directory = %self.directory.display(),
            count = artifacts.len(),
            "Listed local artifacts"
        );

        Ok(artifacts)
    }

    async fn delete_artifact(&self, key: &str) -> Result<(), StoreError> {
        let path = self.artifact_path(key)?;
        fs::remove_file(&path)
            .await
            .map_err(|source| io_error(&path, source))
    }

    async fn store_archive(&self, path: &Path) -> Result<BackupArtifact, StoreError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::InvalidKey(path.display().to_string()))?;
        let target = self.artifact_path(file_name)?;

        if path != target.as_path() {
            fs::create_dir_all(&self.directory)
                .await
                .map_err(|source| io_error(&self.directory, source))?;
            fs::copy(path, &target)
                .await
                .map_err(|source| io_error(&target, source))?;
        }

        Self::describe(&target).await
    }
}

pub(crate) fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}
