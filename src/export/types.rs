// Outline API wire types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Export format requested from Outline
pub const EXPORT_FORMAT: &str = "outline-markdown";

/// Body of `collections.export_all`
#[derive(Debug, Clone, Serialize)]
pub struct ExportRequest<'a> {
    /// Requested archive format
    pub format: &'a str,
}

/// Body of the `fileOperations.*` calls
#[derive(Debug, Clone, Serialize)]
pub struct FileOperationRequest<'a> {
    /// Export job id
    pub id: &'a str,
}

/// A file operation as Outline reports it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileOperation {
    /// Job id
    #[serde(default)]
    pub id: String,
    /// Raw state string
    #[serde(default)]
    pub state: String,
    /// Archive name on the server
    #[serde(default)]
    pub name: String,
    /// Archive format
    #[serde(default)]
    pub format: String,
}

/// `data` member of the initiate envelope
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportData {
    /// The created job
    #[serde(rename = "fileOperation", default)]
    pub file_operation: FileOperation,
}

/// Response of `collections.export_all`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    /// Whether the export was accepted
    pub success: bool,
    /// Job details
    #[serde(default)]
    pub data: ExportData,
    /// Echoed HTTP status
    #[serde(default)]
    pub status: Option<u16>,
    /// Echoed ok flag
    #[serde(default)]
    pub ok: Option<bool>,
}

/// Response of `fileOperations.info`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressResponse {
    /// Current job details
    pub data: FileOperation,
    /// Echoed HTTP status
    #[serde(default)]
    pub status: Option<u16>,
    /// Echoed ok flag
    #[serde(default)]
    pub ok: Option<bool>,
}

/// Lifecycle state of a server-side export, as reported by Outline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExportState {
    /// Accepted, not yet started (`creating`)
    Initiated,
    /// Being built (`processing`, `uploading`)
    Processing,
    /// Archive ready to fetch
    Complete,
    /// Terminal failure (`failed`, `error`)
    Failed,
    /// Any state string the service reports that we do not model
    Other(String),
}

impl ExportState {
    /// Whether the archive can be fetched
    pub fn is_complete(&self) -> bool {
        matches!(self, ExportState::Complete)
    }

    /// Whether the job ended in failure
    pub fn is_failed(&self) -> bool {
        matches!(self, ExportState::Failed)
    }

    /// Canonical state string
    pub fn as_str(&self) -> &str {
        match self {
            ExportState::Initiated => "initiated",
            ExportState::Processing => "processing",
            ExportState::Complete => "complete",
            ExportState::Failed => "failed",
            ExportState::Other(state) => state,
        }
    }
}

impl From<String> for ExportState {
    fn from(state: String) -> Self {
        match state.as_str() {
            "initiated" | "creating" => ExportState::Initiated,
            "processing" | "uploading" => ExportState::Processing,
            "complete" => ExportState::Complete,
            "failed" | "error" => ExportState::Failed,
            _ => ExportState::Other(state),
        }
    }
}

impl From<&str> for ExportState {
    fn from(state: &str) -> Self {
        ExportState::from(state.to_string())
    }
}

impl From<ExportState> for String {
    fn from(state: ExportState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A server-side export job observed by this process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJob {
    /// Job id assigned by Outline
    pub id: String,
    /// Last observed state
    pub state: ExportState,
    /// Archive format
    pub format: String,
}
