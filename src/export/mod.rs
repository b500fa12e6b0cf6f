// Outline export lifecycle - initiate, poll, fetch, delete

/// HTTP client for the Outline API
pub mod client;
/// The export lifecycle driver
pub mod orchestrator;
pub mod poll;
/// Outline request and response bodies
pub mod types;

pub use client::OutlineClient;
pub use orchestrator::{archive_file_name, ExportOrchestrator, FetchedArchive};
pub use poll::PollPolicy;
pub use types::{ExportJob, ExportResponse, ExportState, ProgressResponse, EXPORT_FORMAT};

use std::path::PathBuf;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Classification of a lifecycle failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network or connection failure
    Transport,
    /// Decodable but unsuccessful response
    Protocol,
    /// Malformed response body
    Decode,
    /// Local filesystem failure
    Storage,
    /// The job did not complete within the poll bounds
    Timeout,
}

/// What went wrong inside a single lifecycle step
#[derive(Debug, Error)]
pub enum StepError {
    /// Connection, TLS, or body transfer failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("unexpected HTTP status {0}")]
    Status(StatusCode),

    /// The initiate envelope said `success: false`
    #[error("remote reported success: false")]
    Rejected,

    /// The initiate envelope had no job id
    #[error("response carried no file operation id")]
    MissingJobId,

    /// The job reached a terminal failure state
    #[error("export job entered state {0:?}")]
    JobFailed(String),

    /// Body was not the expected JSON
    #[error("malformed response body: {0}")]
    Decode(#[source] serde_json::Error),

    /// Writing the archive locally failed
    #[error("failed to write {}: {source}", path.display())]
    Storage {
        /// File or directory being written
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Every allowed status check came back incomplete
    #[error("export still {last_state:?} after {attempts} status checks")]
    AttemptsExhausted {
        /// Status checks made
        attempts: u32,
        /// State reported by the last check
        last_state: String,
    },

    /// The total wait elapsed first
    #[error("export did not complete within {0:?}")]
    TimedOut(Duration),
}

impl StepError {
    /// Coarse classification of this failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            StepError::Transport(_) => ErrorKind::Transport,
            StepError::Status(_)
            | StepError::Rejected
            | StepError::MissingJobId
            | StepError::JobFailed(_) => ErrorKind::Protocol,
            StepError::Decode(_) => ErrorKind::Decode,
            StepError::Storage { .. } => ErrorKind::Storage,
            StepError::AttemptsExhausted { .. } | StepError::TimedOut(_) => ErrorKind::Timeout,
        }
    }
}

/// A lifecycle failure, scoped to the step that produced it
#[derive(Debug, Error)]
pub enum ExportError {
    /// `collections.export_all` failed; no job exists
    #[error("failed to initiate export: {0}")]
    Initiate(#[source] StepError),

    /// Waiting for completion failed
    #[error("failed while waiting for export {id}: {source}")]
    Poll {
        /// Export job id
        id: String,
        /// Step failure
        #[source]
        source: StepError,
    },

    /// Downloading the archive failed; no archive file is left behind
    #[error("failed to fetch export {id}: {source}")]
    Fetch {
        /// Export job id
        id: String,
        /// Step failure
        #[source]
        source: StepError,
    },

    /// Removing the server-side export failed
    #[error("failed to delete export {id}: {source}")]
    Delete {
        /// Export job id
        id: String,
        /// Step failure
        #[source]
        source: StepError,
    },
}

impl ExportError {
    /// The step-level cause
    pub fn step(&self) -> &StepError {
        match self {
            ExportError::Initiate(source)
            | ExportError::Poll { source, .. }
            | ExportError::Fetch { source, .. }
            | ExportError::Delete { source, .. } => source,
        }
    }

    /// Classification of the step-level cause
    pub fn kind(&self) -> ErrorKind {
        self.step().kind()
    }
}
