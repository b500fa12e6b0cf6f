//! One complete backup run.
//!
//! The run is strictly sequential: initiate, wait, fetch, hand the archive to
//! the active store, delete the server-side export, then prune. The first
//! failure aborts everything after it; nothing that already succeeded is
//! rolled back.

use std::path::PathBuf;

use thiserror::Error;
use tokio::fs;
use tracing::{error, info};

use crate::backup::{
    open_store, ArtifactStore, BackupArtifact, CleanupResult, RetentionError, RetentionManager,
    RetentionPolicy, StoreError,
};
use crate::config::{Backend, BackupConfig};
use crate::export::{ExportError, ExportOrchestrator, FetchedArchive};

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Server-side export job id
    pub job_id: String,
    /// The downloaded archive; for object storage its local path is gone by now
    pub archive: FetchedArchive,
    /// Store that received the archive
    pub backend: Backend,
    /// The archive as listed by that store
    pub stored: BackupArtifact,
    /// Object key of the upload; `None` for local runs
    pub uploaded_key: Option<String>,
    /// `None` when no keep-count is configured
    pub cleanup: Option<CleanupResult>,
}

/// The stage at which a run aborted
#[derive(Debug, Error)]
pub enum RunError {
    /// The configured store could not be built
    #[error("Failed to open {backend} artifact store: {source}")]
    OpenStore {
        /// Backend that was requested
        backend: Backend,
        /// Store failure
        #[source]
        source: StoreError,
    },

    /// Initiate, poll, or fetch failed
    #[error(transparent)]
    Export(#[from] ExportError),

    /// The store rejected the archive; the local file is kept
    #[error("Failed to store {} in {backend}: {source}", archive.path.display())]
    Store {
        /// The downloaded archive
        archive: FetchedArchive,
        /// Store that rejected it
        backend: Backend,
        /// Store failure
        #[source]
        source: StoreError,
    },

    /// The archive was uploaded but its local copy could not be removed
    #[error("Failed to remove local copy {}: {source}", path.display())]
    RemoveLocalCopy {
        /// Local copy left behind
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The archive was fetched, but the server-side export could not be removed
    #[error("Archive {} was saved, but {source}", archive.file_name)]
    DeleteExport {
        /// The archive that was saved
        archive: FetchedArchive,
        /// Delete failure
        #[source]
        source: ExportError,
    },

    /// Pruning old artifacts failed
    #[error(transparent)]
    Retention(#[from] RetentionError),
}

/// Runs one backup from a validated configuration
pub struct BackupRunner<'a> {
    config: &'a BackupConfig,
}

impl<'a> BackupRunner<'a> {
    /// Runner for `config`
    pub fn new(config: &'a BackupConfig) -> Self {
        Self { config }
    }

    /// Run against the store the configuration selects
    pub async fn run(&self) -> Result<RunReport, RunError> {
        let backend = self.config.backend();
        let store = open_store(self.config)
            .await
            .map_err(|source| RunError::OpenStore { backend, source })?;

        self.run_with_store(store.as_ref()).await
    }

    /// Run against an explicit store
    pub async fn run_with_store(&self, store: &dyn ArtifactStore) -> Result<RunReport, RunError> {
        let result = self.execute(store).await;
        if let Err(ref e) = result {
            error!(error = %e, "Backup run aborted");
        }
        result
    }

    async fn execute(&self, store: &dyn ArtifactStore) -> Result<RunReport, RunError> {
        info!("Starting Outline Wiki Backup");
        let orchestrator = ExportOrchestrator::from_config(self.config);
        let backend = store.backend();

        let job = orchestrator.initiate().await?;

        info!(job_id = %job.id, "Checking export progress");
        let job = orchestrator.wait_for_completion(&job).await?;
        info!(job_id = %job.id, "Export completed");

        let archive = orchestrator.fetch(&job).await?;

        let stored = match store.store_archive(&archive.path).await {
            Ok(stored) => stored,
            Err(source) => {
                return Err(RunError::Store {
                    archive,
                    backend,
                    source,
                })
            }
        };

        let uploaded_key = (backend == Backend::ObjectStorage).then(|| stored.key.clone());

        if backend != Backend::Local {
            fs::remove_file(&archive.path)
                .await
                .map_err(|source| RunError::RemoveLocalCopy {
                    path: archive.path.clone(),
                    source,
                })?;
            info!(path = %archive.path.display(), "Local copy deleted after upload");
        }

        if let Err(source) = orchestrator.delete(&job).await {
            return Err(RunError::DeleteExport { archive, source });
        }

        let cleanup = match self.config.keep_backups {
            Some(keep) => {
                info!(keep, backend = %backend, "Keeping only the most recent backups");
                let manager = RetentionManager::new(store, RetentionPolicy::new(keep));
                Some(manager.apply().await?)
            }
            None => {
                info!("Keeping all backups");
                None
            }
        };

        info!(job_id = %job.id, file = %archive.file_name, "Backup completed successfully");

        Ok(RunReport {
            job_id: job.id,
            archive,
            backend,
            stored,
            uploaded_key,
            cleanup,
        })
    }
}
