// Outline API client - one request path for every lifecycle call

use reqwest::{Client, Response};
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::config::BackupConfig;

/// Starts a full export
pub const EXPORT_ENDPOINT: &str = "/api/collections.export_all";
/// Reports a job's state
pub const PROGRESS_ENDPOINT: &str = "/api/fileOperations.info";
/// Serves the finished archive
pub const DOWNLOAD_ENDPOINT: &str = "/api/fileOperations.redirect";
/// Removes the server-side export
pub const DELETE_ENDPOINT: &str = "/api/fileOperations.delete";

/// Authenticated client for the Outline API
#[derive(Debug, Clone)]
pub struct OutlineClient {
    http: Client,
    base_url: Url,
    auth_token: String,
}

impl OutlineClient {
    /// Client for `base_url` using `auth_token` as the bearer token
    pub fn new(base_url: Url, auth_token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            auth_token: auth_token.into(),
        }
    }

    /// Client for the configured instance
    pub fn from_config(config: &BackupConfig) -> Self {
        Self::new(config.api_base_url.clone(), config.auth_token.clone())
    }

    /// Root URL of the instance
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), endpoint)
    }

    /// POST a JSON payload to `endpoint` with bearer authorization
    pub async fn post<P>(&self, endpoint: &str, payload: &P) -> Result<Response, reqwest::Error>
    where
        P: Serialize + ?Sized,
    {
        let url = self.url(endpoint);
        debug!(url = %url, "Sending Outline API request");

        self.http
            .post(&url)
            .bearer_auth(&self.auth_token)
            .json(payload)
            .send()
            .await
    }
}
