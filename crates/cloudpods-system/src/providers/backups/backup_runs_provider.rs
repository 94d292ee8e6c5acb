//! Backup runs provider.

use crate::error::SystemError;
use cloudpods_commons::models::BackupRun;
use cloudpods_commons::{BackupPolicyId, BackupRunId, PodId, StoragePartition};
use cloudpods_store::entity_store::EntityStore;
use cloudpods_store::{IndexedEntityStore, StorageBackend};
use std::sync::Arc;

/// Type alias for the backup runs store
pub type BackupRunsStore = IndexedEntityStore<BackupRunId, BackupRun>;

pub struct BackupRunsProvider {
    store: BackupRunsStore,
}

impl std::fmt::Debug for BackupRunsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupRunsProvider").finish()
    }
}

impl BackupRunsProvider {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let store =
            IndexedEntityStore::new(backend, StoragePartition::BackupRuns.name(), Vec::new());
        Self { store }
    }

    pub fn create_run(&self, run: BackupRun) -> Result<BackupRun, SystemError> {
        if self.store.get(&run.run_id)?.is_some() {
            return Err(SystemError::AlreadyExists(format!(
                "Backup run already exists: {}",
                run.run_id
            )));
        }
        self.store.insert(&run.run_id, &run)?;
        Ok(run)
    }

    pub fn get_run(&self, run_id: &BackupRunId) -> Result<Option<BackupRun>, SystemError> {
        Ok(self.store.get(run_id)?)
    }

    /// Replace a run row after a status change (start, complete, fail).
    pub fn update_run(&self, run: BackupRun) -> Result<BackupRun, SystemError> {
        if self.store.get(&run.run_id)?.is_none() {
            return Err(SystemError::NotFound(format!(
                "Backup run not found: {}",
                run.run_id
            )));
        }
        self.store.put(&run.run_id, &run)?;
        Ok(run)
    }

    /// Runs of one policy, newest first.
    pub fn list_for_policy(&self, policy_id: &BackupPolicyId) -> Result<Vec<BackupRun>, SystemError> {
        let entries = self.store.scan_all(None, None, None)?;
        let mut runs: Vec<BackupRun> = entries
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| &r.policy_id == policy_id)
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }

    pub fn list_for_pod(&self, pod_id: &PodId) -> Result<Vec<BackupRun>, SystemError> {
        let entries = self.store.scan_all(None, None, None)?;
        Ok(entries
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| &r.pod_id == pod_id)
            .collect())
    }

    /// Keep the newest `retention_count` settled runs of a policy, delete the
    /// rest. In-flight runs are never pruned. Returns the number deleted.
    pub fn prune_old_runs(
        &self,
        policy_id: &BackupPolicyId,
        retention_count: u32,
    ) -> Result<usize, SystemError> {
        let runs = self.list_for_policy(policy_id)?;
        let settled: Vec<&BackupRun> = runs.iter().filter(|r| r.status.is_terminal()).collect();

        let mut deleted = 0;
        for run in settled.iter().skip(retention_count as usize) {
            self.store.delete(&run.run_id)?;
            deleted += 1;
        }
        if deleted > 0 {
            log::info!(
                "Backup retention pruned {} runs for policy {}",
                deleted,
                policy_id
            );
        }
        Ok(deleted)
    }

    /// Remove every run belonging to a pod. Returns the number removed.
    pub fn delete_all_for_pod(&self, pod_id: &PodId) -> Result<usize, SystemError> {
        let runs = self.list_for_pod(pod_id)?;
        let count = runs.len();
        for run in runs {
            self.store.delete(&run.run_id)?;
        }
        Ok(count)
    }
}
