// Backup artifacts - storage backends and retention

/// Retention over a single store
pub mod manager;
/// S3 and S3-compatible object storage
#[cfg(feature = "s3")]
pub mod s3;
/// The store trait and the local filesystem store
pub mod storage;
/// Artifact, policy, and error types
pub mod types;

pub use manager::{select_victims, RetentionManager};
#[cfg(feature = "s3")]
pub use s3::S3ArtifactStore;
pub use storage::{open_store, ArtifactStore, LocalArtifactStore};
pub use types::{
    BackupArtifact, CleanupResult, RetentionError, RetentionPolicy, StoreError,
};
