// Export Orchestrator - drives one export job from initiation to deletion

use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::StreamExt;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::client::{
    OutlineClient, DELETE_ENDPOINT, DOWNLOAD_ENDPOINT, EXPORT_ENDPOINT, PROGRESS_ENDPOINT,
};
use super::poll::PollPolicy;
use super::types::{
    ExportJob, ExportRequest, ExportResponse, ExportState, FileOperationRequest, ProgressResponse,
    EXPORT_FORMAT,
};
use super::{ExportError, StepError};
use crate::config::BackupConfig;

/// An archive written to the local save directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArchive {
    /// Full path in the save directory
    pub path: PathBuf,
    /// `<host>-outline-backup-<timestamp>.zip`
    pub file_name: String,
    /// Bytes written
    pub size_bytes: u64,
    /// Hex SHA-256 of the archive contents
    pub sha256: String,
}

/// `<host>-outline-backup-<RFC3339>.zip`
pub fn archive_file_name(host: &str, timestamp: DateTime<Utc>) -> String {
    format!(
        "{}-outline-backup-{}.zip",
        host,
        timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Drives one export job through initiate, poll, fetch, and delete
pub struct ExportOrchestrator {
    client: OutlineClient,
    poll: PollPolicy,
    save_dir: PathBuf,
    host: String,
}

impl ExportOrchestrator {
    /// Orchestrator saving archives into `save_dir`
    pub fn new(client: OutlineClient, poll: PollPolicy, save_dir: impl Into<PathBuf>) -> Self {
        let host = client.base_url().host_str().unwrap_or("outline").to_string();
        Self {
            client,
            poll,
            save_dir: save_dir.into(),
            host,
        }
    }

    /// Orchestrator for the configured instance and save directory
    pub fn from_config(config: &BackupConfig) -> Self {
        Self::new(
            OutlineClient::from_config(config),
            config.poll,
            config.save_dir.clone(),
        )
    }

    /// Ask Outline to start a full export
    pub async fn initiate(&self) -> Result<ExportJob, ExportError> {
        self.request_export().await.map_err(ExportError::Initiate)
    }

    async fn request_export(&self) -> Result<ExportJob, StepError> {
        let request = ExportRequest {
            format: EXPORT_FORMAT,
        };
        let response = self.client.post(EXPORT_ENDPOINT, &request).await?;
        let export: ExportResponse = decode_json(response).await?;

        if !export.success {
            return Err(StepError::Rejected);
        }

        let operation = export.data.file_operation;
        if operation.id.is_empty() {
            return Err(StepError::MissingJobId);
        }

        info!(job_id = %operation.id, "Export initiated");

        let format = if operation.format.is_empty() {
            EXPORT_FORMAT.to_string()
        } else {
            operation.format
        };

        Ok(ExportJob {
            id: operation.id,
            state: ExportState::from(operation.state),
            format,
        })
    }

    /// Poll until the job reports `complete`, within the configured bounds
    pub async fn wait_for_completion(&self, job: &ExportJob) -> Result<ExportJob, ExportError> {
        let result = match timeout(self.poll.max_wait, self.poll_until_complete(job)).await {
            Ok(result) => result,
            Err(_) => Err(StepError::TimedOut(self.poll.max_wait)),
        };

        result.map_err(|source| ExportError::Poll {
            id: job.id.clone(),
            source,
        })
    }

    async fn poll_until_complete(&self, job: &ExportJob) -> Result<ExportJob, StepError> {
        let mut last_state = job.state.clone();

        for attempt in 1..=self.poll.max_attempts {
            sleep(self.poll.interval).await;

            let state = self.check_status(&job.id).await?;
            info!(job_id = %job.id, attempt, state = %state, "Export state");

            if state.is_complete() {
                return Ok(ExportJob {
                    state,
                    ..job.clone()
                });
            }
            if state.is_failed() {
                return Err(StepError::JobFailed(state.to_string()));
            }

            debug!(job_id = %job.id, "Export is still in progress, waiting");
            last_state = state;
        }

        Err(StepError::AttemptsExhausted {
            attempts: self.poll.max_attempts,
            last_state: last_state.to_string(),
        })
    }

    async fn check_status(&self, id: &str) -> Result<ExportState, StepError> {
        let response = self
            .client
            .post(PROGRESS_ENDPOINT, &FileOperationRequest { id })
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StepError::Status(status));
        }

        let progress: ProgressResponse = decode_json(response).await?;
        Ok(ExportState::from(progress.data.state))
    }

    /// Download the finished archive into the save directory
    pub async fn fetch(&self, job: &ExportJob) -> Result<FetchedArchive, ExportError> {
        self.download(job).await.map_err(|source| ExportError::Fetch {
            id: job.id.clone(),
            source,
        })
    }

    async fn download(&self, job: &ExportJob) -> Result<FetchedArchive, StepError> {
        let response = self
            .client
            .post(DOWNLOAD_ENDPOINT, &FileOperationRequest { id: &job.id })
            .await?;

        if response.status() != StatusCode::OK {
            return Err(StepError::Status(response.status()));
        }

        fs::create_dir_all(&self.save_dir)
            .await
            .map_err(|source| storage_error(&self.save_dir, source))?;

        let file_name = archive_file_name(&self.host, Utc::now());
        let path = self.save_dir.join(&file_name);

        let mut file = fs::File::create(&path)
            .await
            .map_err(|source| storage_error(&path, source))?;

        match write_body(response, &mut file, &path).await {
            Ok((size_bytes, sha256)) => {
                info!(
                    job_id = %job.id,
                    path = %path.display(),
                    size_bytes,
                    sha256 = %sha256,
                    "Export archive saved"
                );
                Ok(FetchedArchive {
                    path,
                    file_name,
                    size_bytes,
                    sha256,
                })
            }
            Err(e) => {
                drop(file);
                if let Err(rm) = fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %rm, "Failed to remove partial archive");
                }
                Err(e)
            }
        }
    }

    /// Delete the server-side export; the fetched archive is never touched
    pub async fn delete(&self, job: &ExportJob) -> Result<(), ExportError> {
        self.delete_export(&job.id)
            .await
            .map_err(|source| ExportError::Delete {
                id: job.id.clone(),
                source,
            })
    }

    async fn delete_export(&self, id: &str) -> Result<(), StepError> {
        let response = self
            .client
            .post(DELETE_ENDPOINT, &FileOperationRequest { id })
            .await?;

        if response.status() != StatusCode::OK {
            return Err(StepError::Status(response.status()));
        }

        info!(job_id = %id, "Export deleted from server");
        Ok(())
    }
}

/// Decode a JSON body; an undecodable error response reports its status
async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, StepError> {
    let status = response.status();
    let body = response.bytes().await?;

    match serde_json::from_slice(&body) {
        Ok(value) => Ok(value),
        Err(_) if !status.is_success() => Err(StepError::Status(status)),
        Err(e) => Err(StepError::Decode(e)),
    }
}

async fn write_body(
    response: Response,
    file: &mut fs::File,
    path: &Path,
) -> Result<(u64, String), StepError> {
    let mut stream = response.bytes_stream();
    let mut hasher = Sha256::new();
    let mut size_bytes = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk: Bytes = chunk?;
        hasher.update(&chunk);
        file.write_all(&chunk)
            .await
            .map_err(|source| storage_error(path, source))?;
        size_bytes += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|source| storage_error(path, source))?;

    Ok((size_bytes, format!("{:x}", hasher.finalize())))
}

fn storage_error(path: &Path, source: std::io::Error) -> StepError {
    StepError::Storage {
        path: path.to_path_buf(),
        source,
    }
}
