//! Type-safe entity storage with generic key types.
//!
//! This module provides the `EntityStore<K, V>` trait which uses typed keys
//! (instead of raw strings) to provide compile-time safety and prevent
//! wrong-key bugs.
//!
//! ## Architecture
//!
//! ```text
//! EntityStore<K, V>        ← Typed entity CRUD with generic keys (this file)
//!     ↓
//! StorageBackend           ← Generic K/V operations (storage_trait.rs)
//!     ↓
//! RocksDB / in-memory      ← Actual storage implementation
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use cloudpods_store::{EntityStore, StorageBackend};
//! use cloudpods_commons::{StorageKey, WorkerId, models::Worker};
//! use std::sync::Arc;
//!
//! struct WorkerStore {
//!     backend: Arc<dyn StorageBackend>,
//! }
//!
//! impl EntityStore<WorkerId, Worker> for WorkerStore {
//!     fn backend(&self) -> &Arc<dyn StorageBackend> {
//!         &self.backend
//!     }
//!
//!     fn partition(&self) -> &str {
//!         "workers"
//!     }
//! }
//!
//! // Type-safe usage:
//! let worker_id = WorkerId::new("wk-1");
//! store.put(&worker_id, &worker)?;
//! let retrieved = store.get(&worker_id)?;
//! ```

use crate::storage_trait::{Partition, Result, StorageBackend};
use cloudpods_commons::serialization::Storable;
use cloudpods_commons::StorageKey;
use std::sync::Arc;

/// Trait for typed entity storage with type-safe keys and automatic serialization.
///
/// Entities are encoded via `Storable` (bincode under the hood) and keys via
/// `StorageKey` (order-preserving bytes), so range scans over typed keys work.
///
/// ## Type Parameters
/// - `K`: Key type that implements `StorageKey` (JobId, PodId, ...)
/// - `V`: Entity type that implements `Storable`
///
/// ## Required Methods
/// - `backend()`: Returns reference to the storage backend
/// - `partition()`: Returns partition name for this entity type
pub trait EntityStore<K, V>
where
    K: StorageKey,
    V: Storable,
{
    /// Returns a reference to the storage backend.
    fn backend(&self) -> &Arc<dyn StorageBackend>;

    /// Returns the partition name for this entity type.
    ///
    /// Examples: "jobs", "pods", "webhook_deliveries"
    fn partition(&self) -> &str;

    /// Stores an entity with the given key.
    fn put(&self, key: &K, entity: &V) -> Result<()> {
        let partition = Partition::new(self.partition());
        let value = entity.encode()?;
        self.backend().put(&partition, &key.storage_key(), &value)
    }

    /// Stores multiple entities atomically in a batch.
    ///
    /// All writes succeed or all fail. Much cheaper than individual `put()`
    /// calls for bulk inserts.
    fn batch_put(&self, entries: &[(K, V)]) -> Result<()> {
        use crate::storage_trait::Operation;

        let partition = Partition::new(self.partition());
        let operations: Result<Vec<Operation>> = entries
            .iter()
            .map(|(key, entity)| {
                let value = entity.encode()?;
                Ok(Operation::Put {
                    partition: partition.clone(),
                    key: key.storage_key(),
                    value,
                })
            })
            .collect();

        self.backend().batch(operations?)
    }

    /// Retrieves an entity by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    fn get(&self, key: &K) -> Result<Option<V>> {
        let partition = Partition::new(self.partition());
        match self.backend().get(&partition, &key.storage_key())? {
            Some(bytes) => Ok(Some(V::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Deletes an entity by key.
    ///
    /// Returns `Ok(())` even if the key doesn't exist (idempotent).
    fn delete(&self, key: &K) -> Result<()> {
        let partition = Partition::new(self.partition());
        self.backend().delete(&partition, &key.storage_key())
    }

    /// Checks whether an entity exists without decoding it.
    fn exists(&self, key: &K) -> Result<bool> {
        let partition = Partition::new(self.partition());
        Ok(self.backend().get(&partition, &key.storage_key())?.is_some())
    }

    /// Scans entities with an optional limit, typed key prefix, and start key.
    ///
    /// Streams from the underlying backend and stops once `limit` results are
    /// reached. Keys are returned as raw bytes; higher-level stores provide
    /// typed wrappers where needed.
    fn scan_all(
        &self,
        limit: Option<usize>,
        prefix: Option<&K>,
        start_key: Option<&K>,
    ) -> Result<Vec<(Vec<u8>, V)>> {
        // Hard cap to avoid scanning massive partitions into memory
        const MAX_SCAN_LIMIT: usize = 100000;

        let effective_limit = limit.unwrap_or(MAX_SCAN_LIMIT).min(MAX_SCAN_LIMIT);
        let partition = Partition::new(self.partition());
        let prefix_bytes = prefix.map(|p| p.storage_key());
        let start_bytes = start_key.map(|s| s.storage_key());

        let iter = self.backend().scan(
            &partition,
            prefix_bytes.as_deref(),
            start_bytes.as_deref(),
            Some(effective_limit),
        )?;

        let mut results = Vec::new();
        for (key_bytes, value_bytes) in iter {
            let entity = V::decode(&value_bytes)?;
            results.push((key_bytes, entity));
            if results.len() >= effective_limit {
                if limit.is_none() {
                    log::warn!(
                        "Scan of partition '{}' reached max limit of {} entries, stopping early",
                        self.partition(),
                        MAX_SCAN_LIMIT
                    );
                }
                break;
            }
        }

        Ok(results)
    }

    /// Scans entities with a raw byte prefix, limited to `limit` results.
    fn scan_prefix_bytes(&self, prefix: &[u8], limit: Option<usize>) -> Result<Vec<(Vec<u8>, V)>> {
        let partition = Partition::new(self.partition());
        let iter = self.backend().scan(&partition, Some(prefix), None, limit)?;

        let mut results = Vec::new();
        for (key_bytes, value_bytes) in iter {
            let entity = V::decode(&value_bytes)?;
            results.push((key_bytes, entity));
            if let Some(max) = limit {
                if results.len() >= max {
                    break;
                }
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::InMemoryBackend;
    use cloudpods_commons::models::{Worker, WorkerStatus};
    use cloudpods_commons::{now_millis, WorkerId};

    struct WorkerStore {
        backend: Arc<dyn StorageBackend>,
    }

    impl EntityStore<WorkerId, Worker> for WorkerStore {
        fn backend(&self) -> &Arc<dyn StorageBackend> {
            &self.backend
        }

        fn partition(&self) -> &str {
            "workers"
        }
    }

    fn create_store() -> WorkerStore {
        let backend: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
        backend.create_partition(&Partition::new("workers")).unwrap();
        WorkerStore { backend }
    }

    fn create_worker(id: &str) -> Worker {
        let now = now_millis();
        Worker {
            worker_id: WorkerId::new(id),
            name: "test-host/0".to_string(),
            queue: "default".to_string(),
            status: WorkerStatus::Online,
            last_heartbeat_at: now,
            registered_at: now,
        }
    }

    #[test]
    fn test_put_get_delete() {
        let store = create_store();
        let worker = create_worker("wk-1");

        store.put(&worker.worker_id, &worker).unwrap();
        let retrieved = store.get(&worker.worker_id).unwrap();
        assert_eq!(retrieved.unwrap().name, "test-host/0");
        assert!(store.exists(&worker.worker_id).unwrap());

        store.delete(&worker.worker_id).unwrap();
        assert!(store.get(&worker.worker_id).unwrap().is_none());
        assert!(!store.exists(&worker.worker_id).unwrap());
    }

    #[test]
    fn test_batch_put_and_scan() {
        let store = create_store();
        let entries: Vec<_> = (0..5)
            .map(|i| {
                let worker = create_worker(&format!("wk-{}", i));
                (worker.worker_id.clone(), worker)
            })
            .collect();

        store.batch_put(&entries).unwrap();

        let all = store.scan_all(None, None, None).unwrap();
        assert_eq!(all.len(), 5);

        let limited = store.scan_all(Some(2), None, None).unwrap();
        assert_eq!(limited.len(), 2);
    }
}
