//! Backup policies provider.
//!
//! Policies are few (at most a handful per pod), so due-schedule sweeps and
//! per-pod lookups run over a plain scan.

use crate::error::SystemError;
use cloudpods_commons::models::BackupPolicy;
use cloudpods_commons::{BackupPolicyId, PodId, StoragePartition};
use cloudpods_store::entity_store::EntityStore;
use cloudpods_store::{IndexedEntityStore, StorageBackend};
use std::sync::Arc;

/// Type alias for the backup policies store
pub type BackupPoliciesStore = IndexedEntityStore<BackupPolicyId, BackupPolicy>;

pub struct BackupPoliciesProvider {
    store: BackupPoliciesStore,
}

impl std::fmt::Debug for BackupPoliciesProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupPoliciesProvider").finish()
    }
}

impl BackupPoliciesProvider {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let store =
            IndexedEntityStore::new(backend, StoragePartition::BackupPolicies.name(), Vec::new());
        Self { store }
    }

    pub fn create_policy(&self, policy: BackupPolicy) -> Result<BackupPolicy, SystemError> {
        if self.store.get(&policy.policy_id)?.is_some() {
            return Err(SystemError::AlreadyExists(format!(
                "Backup policy already exists: {}",
                policy.policy_id
            )));
        }
        self.store.insert(&policy.policy_id, &policy)?;
        log::info!(
            "Created backup policy {} for pod {} (every {}h, keep {})",
            policy.policy_id,
            policy.pod_id,
            policy.interval_hours,
            policy.retention_count
        );
        Ok(policy)
    }

    pub fn get_policy(&self, policy_id: &BackupPolicyId) -> Result<Option<BackupPolicy>, SystemError> {
        Ok(self.store.get(policy_id)?)
    }

    /// Replace a policy row (interval, retention, active flag).
    pub fn update_policy(&self, policy: BackupPolicy) -> Result<BackupPolicy, SystemError> {
        if self.store.get(&policy.policy_id)?.is_none() {
            return Err(SystemError::NotFound(format!(
                "Backup policy not found: {}",
                policy.policy_id
            )));
        }
        self.store.put(&policy.policy_id, &policy)?;
        Ok(policy)
    }

    pub fn list_all(&self) -> Result<Vec<BackupPolicy>, SystemError> {
        let entries = self.store.scan_all(None, None, None)?;
        Ok(entries.into_iter().map(|(_, p)| p).collect())
    }

    pub fn list_for_pod(&self, pod_id: &PodId) -> Result<Vec<BackupPolicy>, SystemError> {
        let policies = self.list_all()?;
        Ok(policies.into_iter().filter(|p| &p.pod_id == pod_id).collect())
    }

    /// Active policies whose interval has elapsed.
    pub fn list_due(&self, now: i64) -> Result<Vec<BackupPolicy>, SystemError> {
        let policies = self.list_all()?;
        Ok(policies.into_iter().filter(|p| p.is_due(now)).collect())
    }

    /// Stamp a policy as fired so it stops being due until the next interval.
    pub fn mark_fired(&self, policy_id: &BackupPolicyId, now: i64) -> Result<BackupPolicy, SystemError> {
        let mut policy = self.store.get(policy_id)?.ok_or_else(|| {
            SystemError::NotFound(format!("Backup policy not found: {}", policy_id))
        })?;
        policy.mark_fired(now);
        self.store.put(policy_id, &policy)?;
        Ok(policy)
    }

    pub fn delete_policy(&self, policy_id: &BackupPolicyId) -> Result<(), SystemError> {
        self.store.delete(policy_id)?;
        Ok(())
    }

    /// Remove every policy attached to a pod. Returns the number removed.
    pub fn delete_all_for_pod(&self, pod_id: &PodId) -> Result<usize, SystemError> {
        let policies = self.list_for_pod(pod_id)?;
        let count = policies.len();
        for policy in policies {
            self.store.delete(&policy.policy_id)?;
        }
        Ok(count)
    }
}
