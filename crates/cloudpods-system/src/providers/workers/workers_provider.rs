//! Worker registration provider.
//!
//! Workers are few (one per coordinator instance) so the table carries no
//! secondary indexes; staleness sweeps run over a full scan.

use crate::error::SystemError;
use cloudpods_commons::models::{Worker, WorkerStatus};
use cloudpods_commons::{StoragePartition, WorkerId};
use cloudpods_store::entity_store::EntityStore;
use cloudpods_store::{IndexedEntityStore, StorageBackend};
use std::sync::Arc;

/// Type alias for the workers store
pub type WorkersStore = IndexedEntityStore<WorkerId, Worker>;

pub struct WorkersProvider {
    store: WorkersStore,
}

impl std::fmt::Debug for WorkersProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkersProvider").finish()
    }
}

impl WorkersProvider {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let store = IndexedEntityStore::new(backend, StoragePartition::Workers.name(), Vec::new());
        Self { store }
    }

    /// Register a worker, replacing any previous registration for the same id.
    ///
    /// Re-registering after a crash resumes the same identity, so the reaper
    /// stops treating the worker's old claims as abandoned.
    pub fn register(&self, worker: Worker) -> Result<Worker, SystemError> {
        self.store.insert(&worker.worker_id, &worker)?;
        log::info!(
            "Registered worker {} (queue={}, name={})",
            worker.worker_id,
            worker.queue,
            worker.name
        );
        Ok(worker)
    }

    pub fn get_worker(&self, worker_id: &WorkerId) -> Result<Option<Worker>, SystemError> {
        Ok(self.store.get(worker_id)?)
    }

    /// Refresh a worker's heartbeat. Flips it back Online if it was marked
    /// offline while unreachable.
    pub fn heartbeat(&self, worker_id: &WorkerId, now: i64) -> Result<Worker, SystemError> {
        let worker = self
            .store
            .get(worker_id)?
            .ok_or_else(|| SystemError::NotFound(format!("Worker not found: {}", worker_id)))?;
        let updated = worker.clone().beat(now);
        self.store.update_with_old(worker_id, Some(&worker), &updated)?;
        Ok(updated)
    }

    /// Mark a worker offline. Idempotent.
    pub fn mark_offline(&self, worker_id: &WorkerId) -> Result<Worker, SystemError> {
        let worker = self
            .store
            .get(worker_id)?
            .ok_or_else(|| SystemError::NotFound(format!("Worker not found: {}", worker_id)))?;
        if worker.status == WorkerStatus::Offline {
            return Ok(worker);
        }
        let updated = worker.clone().offline();
        self.store.update_with_old(worker_id, Some(&worker), &updated)?;
        log::warn!("Worker {} marked offline", worker_id);
        Ok(updated)
    }

    pub fn list_all(&self) -> Result<Vec<Worker>, SystemError> {
        let entries = self.store.scan_all(None, None, None)?;
        Ok(entries.into_iter().map(|(_, worker)| worker).collect())
    }

    /// Online workers whose heartbeat is older than `threshold_ms`.
    pub fn list_stale(&self, threshold_ms: i64, now: i64) -> Result<Vec<Worker>, SystemError> {
        let workers = self.list_all()?;
        Ok(workers
            .into_iter()
            .filter(|w| w.status == WorkerStatus::Online && w.is_stale(threshold_ms, now))
            .collect())
    }

    pub fn delete_worker(&self, worker_id: &WorkerId) -> Result<(), SystemError> {
        self.store.delete(worker_id)?;
        Ok(())
    }

    /// Async version of `heartbeat()`.
    ///
    /// Uses `spawn_blocking` internally to avoid blocking the async runtime.
    pub async fn heartbeat_async(
        self: &Arc<Self>,
        worker_id: WorkerId,
        now: i64,
    ) -> Result<Worker, SystemError> {
        let provider = Arc::clone(self);
        tokio::task::spawn_blocking(move || provider.heartbeat(&worker_id, now))
            .await
            .map_err(|e| SystemError::Other(format!("spawn_blocking error: {}", e)))?
    }
}
