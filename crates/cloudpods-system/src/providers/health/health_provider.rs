//! Health status provider.
//!
//! One row per pod, overwritten on every check. The auto-heal decision
//! (threshold crossing) belongs to the health checker in the core; this
//! provider just folds observations into the stored row.

use crate::error::SystemError;
use cloudpods_commons::models::HealthStatus;
use cloudpods_commons::{PodId, StoragePartition};
use cloudpods_store::entity_store::EntityStore;
use cloudpods_store::{IndexedEntityStore, StorageBackend};
use std::sync::Arc;

/// Type alias for the health status store
pub type HealthStore = IndexedEntityStore<PodId, HealthStatus>;

pub struct HealthProvider {
    store: HealthStore,
}

impl std::fmt::Debug for HealthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthProvider").finish()
    }
}

impl HealthProvider {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let store =
            IndexedEntityStore::new(backend, StoragePartition::HealthStatus.name(), Vec::new());
        Self { store }
    }

    pub fn get_status(&self, pod_id: &PodId) -> Result<Option<HealthStatus>, SystemError> {
        Ok(self.store.get(pod_id)?)
    }

    /// Fold one check result into the pod's row, creating it on first
    /// observation. Returns the updated row.
    pub fn observe(
        &self,
        pod_id: &PodId,
        healthy: bool,
        message: Option<String>,
        now: i64,
    ) -> Result<HealthStatus, SystemError> {
        let mut status = self
            .store
            .get(pod_id)?
            .unwrap_or_else(|| HealthStatus::unknown(pod_id.clone()));
        status.observe(healthy, message, now);
        self.store.put(pod_id, &status)?;
        Ok(status)
    }

    /// Clear accumulated failures without claiming health, e.g. right after
    /// a heal job is enqueued so the next sweep does not re-trigger.
    pub fn reset_failures(&self, pod_id: &PodId, now: i64) -> Result<HealthStatus, SystemError> {
        let mut status = self
            .store
            .get(pod_id)?
            .ok_or_else(|| SystemError::NotFound(format!("Health status not found: {}", pod_id)))?;
        status.consecutive_failures = 0;
        status.last_checked_at = now;
        self.store.put(pod_id, &status)?;
        Ok(status)
    }

    /// Drop the row when its pod is deleted.
    pub fn delete_status(&self, pod_id: &PodId) -> Result<(), SystemError> {
        self.store.delete(pod_id)?;
        Ok(())
    }
}
