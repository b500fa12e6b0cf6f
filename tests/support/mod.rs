// Shared fixtures for integration tests: a scripted Outline API and an
// in-memory artifact store.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use url::Url;

use outline_backup::backup::{ArtifactStore, BackupArtifact, StoreError};
use outline_backup::config::{Backend, BackupConfig};

pub const TEST_TOKEN: &str = "test-token";
pub const FAKE_ZIP: &[u8] = b"PK\x03\x04\x14\x00\x00\x00\x08\x00fake-outline-backup-content";

/// How the mock Outline server should answer
#[derive(Debug, Clone)]
pub struct MockScript {
    pub initiate_success: bool,
    /// Overrides the JSON body of `collections.export_all`
    pub initiate_raw_body: Option<&'static str>,
    pub job_id: String,
    /// Successive poll answers; the last one repeats
    pub states: Vec<&'static str>,
    pub archive: Vec<u8>,
    pub fetch_status: StatusCode,
    pub delete_status: StatusCode,
}

impl Default for MockScript {
    fn default() -> Self {
        Self {
            initiate_success: true,
            initiate_raw_body: None,
            job_id: "export-1".to_string(),
            states: vec!["processing", "processing", "complete"],
            archive: FAKE_ZIP.to_vec(),
            fetch_status: StatusCode::OK,
            delete_status: StatusCode::OK,
        }
    }
}

/// One request as seen by the mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub endpoint: &'static str,
    pub id: Option<String>,
    pub format: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Debug, Default)]
struct Shared {
    requests: Vec<RecordedRequest>,
    polls: usize,
}

#[derive(Clone)]
struct MockState {
    script: Arc<MockScript>,
    shared: Arc<Mutex<Shared>>,
}

pub struct MockOutline {
    pub base_url: Url,
    shared: Arc<Mutex<Shared>>,
}

impl MockOutline {
    pub async fn start(script: MockScript) -> Self {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let state = MockState {
            script: Arc::new(script),
            shared: shared.clone(),
        };

        let app = Router::new()
            .route("/api/collections.export_all", post(export_all))
            .route("/api/fileOperations.info", post(info))
            .route("/api/fileOperations.redirect", post(redirect))
            .route("/api/fileOperations.delete", post(delete))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: Url::parse(&format!("http://{}", addr)).unwrap(),
            shared,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.shared.lock().unwrap().requests.clone()
    }

    pub fn endpoints(&self) -> Vec<&'static str> {
        self.requests().into_iter().map(|r| r.endpoint).collect()
    }

    pub fn count(&self, endpoint: &str) -> usize {
        self.requests().iter().filter(|r| r.endpoint == endpoint).count()
    }
}

impl MockState {
    /// Record the request; `Err` carries the 401 for a bad token
    fn record(
        &self,
        endpoint: &'static str,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Result<Option<String>, Response> {
        let payload: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let id = payload.get("id").and_then(Value::as_str).map(str::to_string);

        self.shared.lock().unwrap().requests.push(RecordedRequest {
            endpoint,
            id: id.clone(),
            format: payload.get("format").and_then(Value::as_str).map(str::to_string),
            authorization: authorization.clone(),
        });

        let expected = format!("Bearer {}", TEST_TOKEN);
        if authorization.as_deref() != Some(expected.as_str()) {
            return Err((StatusCode::UNAUTHORIZED, "Unauthorized").into_response());
        }
        Ok(id)
    }

    fn known(&self, id: Option<String>) -> Result<(), Response> {
        match id {
            Some(id) if id == self.script.job_id => Ok(()),
            _ => Err((StatusCode::NOT_FOUND, "Export not found").into_response()),
        }
    }
}

async fn export_all(State(state): State<MockState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(denied) = state.record("export_all", &headers, &body) {
        return denied;
    }

    if let Some(raw) = state.script.initiate_raw_body {
        return (StatusCode::OK, raw).into_response();
    }

    axum::Json(json!({
        "success": state.script.initiate_success,
        "data": {
            "fileOperation": {
                "id": state.script.job_id,
                "state": "creating",
                "name": "outline-backup.zip",
                "format": "outline-markdown"
            }
        },
        "status": 200,
        "ok": true
    }))
    .into_response()
}

async fn info(State(state): State<MockState>, headers: HeaderMap, body: Bytes) -> Response {
    let id = match state.record("info", &headers, &body) {
        Ok(id) => id,
        Err(denied) => return denied,
    };
    if let Err(missing) = state.known(id) {
        return missing;
    }

    let reported = {
        let mut shared = state.shared.lock().unwrap();
        let index = shared.polls.min(state.script.states.len().saturating_sub(1));
        shared.polls += 1;
        state.script.states.get(index).copied().unwrap_or("processing")
    };

    axum::Json(json!({
        "data": {
            "id": state.script.job_id,
            "state": reported,
            "format": "outline-markdown",
            "name": "outline-backup.zip"
        },
        "status": 200,
        "ok": true
    }))
    .into_response()
}

async fn redirect(State(state): State<MockState>, headers: HeaderMap, body: Bytes) -> Response {
    let id = match state.record("redirect", &headers, &body) {
        Ok(id) => id,
        Err(denied) => return denied,
    };
    if let Err(missing) = state.known(id) {
        return missing;
    }
    if state.script.fetch_status != StatusCode::OK {
        return (state.script.fetch_status, "Export not ready").into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/zip")],
        state.script.archive.clone(),
    )
        .into_response()
}

async fn delete(State(state): State<MockState>, headers: HeaderMap, body: Bytes) -> Response {
    let id = match state.record("delete", &headers, &body) {
        Ok(id) => id,
        Err(denied) => return denied,
    };
    if let Err(missing) = state.known(id) {
        return missing;
    }

    (state.script.delete_status, "Export deleted successfully").into_response()
}

/// A server that answers every request with a 200 whose body stops short of
/// its declared `Content-Length`, then closes the connection
pub async fn truncated_archive_server(declared_len: usize, sent: &'static [u8]) -> Url {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            // Read through the JSON request body before answering
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.contains(&b'}') {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }

            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/zip\r\nContent-Length: {}\r\n\r\n",
                declared_len
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(sent).await;
            let _ = socket.flush().await;
            let _ = socket.shutdown().await;
        }
    });

    Url::parse(&format!("http://{}", addr)).unwrap()
}

/// Configuration pointing at `base_url`, saving into `save_dir`
pub fn test_config(base_url: &Url, save_dir: &Path, keep: Option<usize>) -> BackupConfig {
    let mut config = BackupConfig::from_lookup(|key| match key {
        "API_BASE_URL" => Some(base_url.to_string()),
        "AUTH_TOKEN" => Some(TEST_TOKEN.to_string()),
        "SAVE_DIR" => Some(save_dir.to_string_lossy().to_string()),
        _ => None,
    })
    .unwrap();

    config.poll = config
        .poll
        .interval(Duration::from_millis(10))
        .max_attempts(20)
        .max_wait(Duration::from_secs(10));
    config.keep_backups = keep;
    config
}

/// An object store held in memory, with optional injected delete failures
pub struct InMemoryStore {
    backend: Backend,
    objects: Mutex<BTreeMap<String, BackupArtifact>>,
    fail_delete_of: Option<String>,
}

impl InMemoryStore {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            objects: Mutex::new(BTreeMap::new()),
            fail_delete_of: None,
        }
    }

    pub fn failing_delete_of(mut self, key: &str) -> Self {
        self.fail_delete_of = Some(key.to_string());
        self
    }

    pub fn insert(&self, key: &str, last_modified: DateTime<Utc>) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            BackupArtifact {
                key: key.to_string(),
                last_modified,
                size_bytes: 1,
            },
        );
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryStore {
    fn backend(&self) -> Backend {
        self.backend
    }

    async fn list_artifacts(&self) -> Result<Vec<BackupArtifact>, StoreError> {
        Ok(self.objects.lock().unwrap().values().cloned().collect())
    }

    async fn delete_artifact(&self, key: &str) -> Result<(), StoreError> {
        if self.fail_delete_of.as_deref() == Some(key) {
            return Err(StoreError::ObjectStorage(format!("access denied for {}", key)));
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn store_archive(&self, path: &Path) -> Result<BackupArtifact, StoreError> {
        let key = path.file_name().unwrap().to_string_lossy().to_string();
        let size_bytes = std::fs::metadata(path)
            .map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        let artifact = BackupArtifact {
            key: key.clone(),
            last_modified: Utc::now(),
            size_bytes,
        };
        self.objects.lock().unwrap().insert(key, artifact.clone());
        Ok(artifact)
    }
}
