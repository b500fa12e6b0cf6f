// Retention Manager - keeps the N most recent artifacts of one backend

use tracing::{info, warn};

use super::storage::ArtifactStore;
use super::types::{BackupArtifact, CleanupResult, RetentionError, RetentionPolicy};

/// The artifacts to prune so that at most `keep` remain, oldest first.
///
/// Ordering is ascending by `last_modified`; equal timestamps fall back to the
/// key so the same input always yields the same victims.
pub fn select_victims(mut artifacts: Vec<BackupArtifact>, keep: usize) -> Vec<BackupArtifact> {
    if artifacts.len() <= keep {
        return Vec::new();
    }

    artifacts.sort_by(|a, b| {
        a.last_modified
            .cmp(&b.last_modified)
            .then_with(|| a.key.cmp(&b.key))
    });

    let excess = artifacts.len() - keep;
    artifacts.truncate(excess);
    artifacts
}

/// Applies a [`RetentionPolicy`] to one store
pub struct RetentionManager<'a> {
    store: &'a dyn ArtifactStore,
    policy: RetentionPolicy,
}

impl<'a> RetentionManager<'a> {
    /// Manager for `store` under `policy`
    pub fn new(store: &'a dyn ArtifactStore, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    /// Enumerate, order, and delete every artifact beyond the keep-count
    pub async fn apply(&self) -> Result<CleanupResult, RetentionError> {
        let backend = self.store.backend();

        let artifacts = self
            .store
            .list_artifacts()
            .await
            .map_err(|source| RetentionError::List { backend, source })?;

        let total = artifacts.len();
        let victims = select_victims(artifacts, self.policy.keep);

        info!(
            backend = %backend,
            total,
            keep = self.policy.keep,
            to_delete = victims.len(),
            "Applying retention policy"
        );

        let mut deleted = Vec::with_capacity(victims.len());

        for victim in victims {
            if let Err(source) = self.store.delete_artifact(&victim.key).await {
                warn!(backend = %backend, key = %victim.key, error = %source, "Failed to delete artifact");
                return Err(RetentionError::Delete {
                    key: victim.key,
                    deleted_before: deleted.len(),
                    source,
                });
            }
            info!(backend = %backend, key = %victim.key, "Deleted artifact");
            deleted.push(victim.key);
        }

        Ok(CleanupResult {
            backend,
            retained: total - deleted.len(),
            deleted,
        })
    }
}
