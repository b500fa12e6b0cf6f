// S3 Artifact Store
// Works against AWS S3 or any S3-compatible service (MinIO) via a custom endpoint

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, RequestChecksumCalculation};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, info};

use super::storage::{io_error, ArtifactStore};
use super::types::{BackupArtifact, StoreError};
use crate::config::{Backend, S3Config};

/// Bucket-backed artifact store
pub struct S3ArtifactStore {
    client: Client,
    config: S3Config,
}

impl S3ArtifactStore {
    /// Create a store with the given configuration
    pub async fn new(config: S3Config) -> Self {
        let mut aws_config_builder = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        // Support for MinIO with custom endpoint
        if let Some(ref endpoint) = config.endpoint_url {
            aws_config_builder = aws_config_builder.endpoint_url(endpoint);
        }

        if let Some(ref credentials) = config.credentials {
            aws_config_builder = aws_config_builder.credentials_provider(Credentials::new(
                credentials.access_key_id.clone(),
                credentials.secret_access_key.clone(),
                None,
                None,
                "outline-backup-static",
            ));
        }

        let aws_config = aws_config_builder.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        // Self-hosted stores frequently reject the default flexible checksums
        if config.endpoint_url.is_some() {
            s3_config_builder = s3_config_builder
                .request_checksum_calculation(RequestChecksumCalculation::WhenRequired);
        }

        let client = Client::from_conf(s3_config_builder.build());

        Self { client, config }
    }

    /// Bucket holding the artifacts
    pub fn bucket(&self) -> &str {
        &self.config.bucket_name
    }

    /// Probe the service with ListBuckets
    pub async fn check_connectivity(&self) -> Result<(), StoreError> {
        self.client
            .list_buckets()
            .send()
            .await
            .map_err(|e| StoreError::ObjectStorage(format!("S3 is not reachable: {}", e)))?;
        Ok(())
    }
}

/// Convert a provider timestamp; objects without one sort as the oldest
fn to_utc(timestamp: Option<&aws_sdk_s3::primitives::DateTime>) -> DateTime<Utc> {
    timestamp
        .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    fn backend(&self) -> Backend {
        Backend::ObjectStorage
    }

    async fn list_artifacts(&self) -> Result<Vec<BackupArtifact>, StoreError> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.config.bucket_name)
            .into_paginator()
            .send();

        let mut artifacts = Vec::new();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                StoreError::ObjectStorage(format!(
                    "Failed to list objects in bucket {}: {}",
                    self.config.bucket_name, e
                ))
            })?;

            for object in page.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                artifacts.push(BackupArtifact {
                    key: key.to_string(),
                    last_modified: to_utc(object.last_modified()),
                    size_bytes: object.size().unwrap_or(0).max(0) as u64,
                });
            }
        }

        debug!(
            bucket = %self.config.bucket_name,
            count = artifacts.len(),
            "Listed S3 artifacts"
        );

        Ok(artifacts)
    }

    async fn delete_artifact(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.config.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                StoreError::ObjectStorage(format!("Failed to delete object {}: {}", key, e))
            })?;
        Ok(())
    }

    async fn store_archive(&self, path: &Path) -> Result<BackupArtifact, StoreError> {
        let key = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::InvalidKey(path.display().to_string()))?
            .to_string();

        let size_bytes = fs::metadata(path)
            .await
            .map_err(|source| io_error(path, source))?
            .len();

        let body = ByteStream::from_path(path).await.map_err(|e| {
            StoreError::ObjectStorage(format!("Failed to open {}: {}", path.display(), e))
        })?;

        self.client
            .put_object()
            .bucket(&self.config.bucket_name)
            .key(&key)
            .body(body)
            .acl(ObjectCannedAcl::Private)
            .send()
            .await
            .map_err(|e| {
                StoreError::ObjectStorage(format!(
                    "Failed to upload {} to {}: {}",
                    key, self.config.bucket_name, e
                ))
            })?;

        info!(
            bucket = %self.config.bucket_name,
            key = %key,
            size_bytes,
            "Archive uploaded"
        );

        Ok(BackupArtifact {
            key,
            last_modified: Utc::now(),
            size_bytes,
        })
    }
}
