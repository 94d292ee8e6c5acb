//! Volumes provider.
//!
//! Volumes attach to exactly one pod; the pod index answers "what storage
//! does this pod own" during provisioning, deletion, and metering.

use crate::error::SystemError;
use cloudpods_commons::models::{ResourceStatus, Volume};
use cloudpods_commons::{encode_key, encode_prefix, PodId, StoragePartition, VolumeId};
use cloudpods_store::entity_store::EntityStore;
use cloudpods_store::{IndexDefinition, IndexedEntityStore, StorageBackend};
use std::sync::Arc;

/// Index position for `VolumePodIndex`.
pub const POD_INDEX: usize = 0;

/// Index: volumes by owning pod. Key: `(pod_id, volume_id)`.
pub struct VolumePodIndex;

impl IndexDefinition<VolumeId, Volume> for VolumePodIndex {
    fn partition(&self) -> &str {
        StoragePartition::VolumesPodIdx.name()
    }

    fn indexed_columns(&self) -> Vec<&str> {
        vec!["pod_id", "volume_id"]
    }

    fn extract_key(&self, _pk: &VolumeId, volume: &Volume) -> Option<Vec<u8>> {
        Some(encode_key(&(
            volume.pod_id.as_str(),
            volume.volume_id.as_str(),
        )))
    }
}

/// Type alias for the indexed volumes store
pub type VolumesStore = IndexedEntityStore<VolumeId, Volume>;

pub struct VolumesProvider {
    store: VolumesStore,
}

impl std::fmt::Debug for VolumesProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumesProvider").finish()
    }
}

impl VolumesProvider {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let store = IndexedEntityStore::new(
            backend,
            StoragePartition::Volumes.name(),
            vec![Arc::new(VolumePodIndex) as Arc<dyn IndexDefinition<VolumeId, Volume>>],
        );
        Self { store }
    }

    pub fn create_volume(&self, volume: Volume) -> Result<Volume, SystemError> {
        if self.store.get(&volume.volume_id)?.is_some() {
            return Err(SystemError::AlreadyExists(format!(
                "Volume already exists: {}",
                volume.volume_id
            )));
        }
        self.store.insert(&volume.volume_id, &volume)?;
        Ok(volume)
    }

    pub fn get_volume(&self, volume_id: &VolumeId) -> Result<Option<Volume>, SystemError> {
        Ok(self.store.get(volume_id)?)
    }

    /// Mark a volume's provisioning outcome.
    pub fn set_status(
        &self,
        volume_id: &VolumeId,
        status: ResourceStatus,
        last_error: Option<String>,
        now: i64,
    ) -> Result<Volume, SystemError> {
        let volume = self
            .store
            .get(volume_id)?
            .ok_or_else(|| SystemError::NotFound(format!("Volume not found: {}", volume_id)))?;
        let mut updated = volume.clone();
        updated.status = status;
        updated.last_error = last_error;
        updated.updated_at = now;
        self.store.update_with_old(volume_id, Some(&volume), &updated)?;
        Ok(updated)
    }

    pub fn list_by_pod(&self, pod_id: &PodId) -> Result<Vec<Volume>, SystemError> {
        let prefix = encode_prefix(&(pod_id.as_str(),));
        let entries = self.store.scan_by_index(POD_INDEX, Some(&prefix), None)?;
        Ok(entries.into_iter().map(|(_, v)| v).collect())
    }

    pub fn delete_volume(&self, volume_id: &VolumeId) -> Result<(), SystemError> {
        self.store.delete(volume_id)?;
        Ok(())
    }

    /// Remove every volume attached to a pod. Returns the number removed.
    pub fn delete_all_for_pod(&self, pod_id: &PodId) -> Result<usize, SystemError> {
        let volumes = self.list_by_pod(pod_id)?;
        let count = volumes.len();
        for volume in &volumes {
            self.store.delete_with_entity(&volume.volume_id, volume)?;
        }
        if count > 0 {
            log::debug!("Deleted {} volumes for pod {}", count, pod_id);
        }
        Ok(count)
    }
}
