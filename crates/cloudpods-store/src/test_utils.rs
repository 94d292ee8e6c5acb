//! Test utilities for cloudpods-store and dependent crates.
//!
//! Provides an in-memory `StorageBackend` and a RocksDB tempdir wrapper so
//! provider and coordinator tests run without touching a real data directory.

use crate::storage_trait::{KvIterator, Operation, Partition, Result, StorageBackend, StorageError};
use anyhow::Result as AnyResult;
use rocksdb::{Options, DB};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tempfile::TempDir;

/// In-memory implementation of `StorageBackend`.
///
/// Partitions map to `BTreeMap` namespaces so scans come back in key order,
/// matching RocksDB iteration semantics. `batch()` applies all operations
/// under a single write lock, which preserves the all-or-nothing behavior
/// providers rely on.
#[derive(Default)]
pub struct InMemoryBackend {
    partitions: RwLock<HashMap<String, BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_guard(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, BTreeMap<Vec<u8>, Vec<u8>>>>> {
        self.partitions
            .read()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))
    }

    fn write_guard(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, BTreeMap<Vec<u8>, Vec<u8>>>>> {
        self.partitions
            .write()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))
    }
}

impl StorageBackend for InMemoryBackend {
    fn get(&self, partition: &Partition, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let guard = self.read_guard()?;
        let map = guard
            .get(partition.name())
            .ok_or_else(|| StorageError::PartitionNotFound(partition.name().to_string()))?;
        Ok(map.get(key).cloned())
    }

    fn put(&self, partition: &Partition, key: &[u8], value: &[u8]) -> Result<()> {
        let mut guard = self.write_guard()?;
        let map = guard
            .get_mut(partition.name())
            .ok_or_else(|| StorageError::PartitionNotFound(partition.name().to_string()))?;
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, partition: &Partition, key: &[u8]) -> Result<()> {
        let mut guard = self.write_guard()?;
        let map = guard
            .get_mut(partition.name())
            .ok_or_else(|| StorageError::PartitionNotFound(partition.name().to_string()))?;
        map.remove(key);
        Ok(())
    }

    fn batch(&self, operations: Vec<Operation>) -> Result<()> {
        // Single write lock for the whole batch keeps it atomic with respect
        // to every other accessor.
        let mut guard = self.write_guard()?;

        // Validate all partitions first so a failure cannot apply half a batch
        for op in &operations {
            let name = match op {
                Operation::Put { partition, .. } => partition.name(),
                Operation::Delete { partition, .. } => partition.name(),
            };
            if !guard.contains_key(name) {
                return Err(StorageError::PartitionNotFound(name.to_string()));
            }
        }

        for op in operations {
            match op {
                Operation::Put {
                    partition,
                    key,
                    value,
                } => {
                    if let Some(map) = guard.get_mut(partition.name()) {
                        map.insert(key, value);
                    }
                }
                Operation::Delete { partition, key } => {
                    if let Some(map) = guard.get_mut(partition.name()) {
                        map.remove(&key);
                    }
                }
            }
        }

        Ok(())
    }

    fn scan(
        &self,
        partition: &Partition,
        prefix: Option<&[u8]>,
        start_key: Option<&[u8]>,
        limit: Option<usize>,
    ) -> Result<KvIterator<'_>> {
        let guard = self.read_guard()?;
        let map = guard
            .get(partition.name())
            .ok_or_else(|| StorageError::PartitionNotFound(partition.name().to_string()))?;

        // Collect under the lock; iterators cannot hold the guard
        let lower: Option<&[u8]> = match (start_key, prefix) {
            (Some(s), _) => Some(s),
            (None, Some(p)) => Some(p),
            (None, None) => None,
        };

        let mut results: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        let range: Box<dyn Iterator<Item = (&Vec<u8>, &Vec<u8>)>> = match lower {
            Some(bound) => Box::new(map.range::<Vec<u8>, _>(bound.to_vec()..)),
            None => Box::new(map.iter()),
        };

        for (key, value) in range {
            if let Some(p) = prefix {
                if !key.starts_with(p) {
                    break;
                }
            }
            results.push((key.clone(), value.clone()));
            if let Some(max) = limit {
                if results.len() >= max {
                    break;
                }
            }
        }

        Ok(Box::new(results.into_iter()))
    }

    fn partition_exists(&self, partition: &Partition) -> bool {
        self.read_guard()
            .map(|guard| guard.contains_key(partition.name()))
            .unwrap_or(false)
    }

    fn create_partition(&self, partition: &Partition) -> Result<()> {
        let mut guard = self.write_guard()?;
        guard.entry(partition.name().to_string()).or_default();
        Ok(())
    }

    fn list_partitions(&self) -> Result<Vec<Partition>> {
        let guard = self.read_guard()?;
        Ok(guard.keys().map(|name| Partition::new(name.clone())).collect())
    }

    fn drop_partition(&self, partition: &Partition) -> Result<()> {
        let mut guard = self.write_guard()?;
        guard.remove(partition.name());
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Creates an in-memory backend with every orchestrator partition pre-created.
///
/// The usual starting point for provider tests.
pub fn in_memory_backend() -> Arc<dyn StorageBackend> {
    let backend = InMemoryBackend::new();
    for partition in cloudpods_commons::partitions::StoragePartition::all() {
        let _ = backend.create_partition(&Partition::new(partition.name()));
    }
    Arc::new(backend)
}

/// Test database wrapper that automatically cleans up on drop.
pub struct TestDb {
    /// RocksDB instance
    pub db: Arc<DB>,
    /// Temporary directory (kept alive for the duration of the test)
    #[allow(dead_code)]
    temp_dir: TempDir,
}

impl TestDb {
    /// Create a new test database with the specified column families.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use cloudpods_store::test_utils::TestDb;
    ///
    /// let test_db = TestDb::new(&["jobs", "jobs_queue_claim_idx"]).unwrap();
    /// // Use test_db.db for testing...
    /// ```
    pub fn new(cf_names: &[&str]) -> AnyResult<Self> {
        let temp_dir = TempDir::new()?;
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, temp_dir.path(), cf_names)?;

        Ok(Self {
            db: Arc::new(db),
            temp_dir,
        })
    }

    /// Create a test database with every orchestrator partition.
    pub fn with_all_partitions() -> AnyResult<Self> {
        let names: Vec<&str> = cloudpods_commons::partitions::StoragePartition::all()
            .iter()
            .map(|p| p.name())
            .collect();
        Self::new(&names)
    }

    /// Create a test database with a single column family.
    pub fn single_cf(cf_name: &str) -> AnyResult<Self> {
        Self::new(&[cf_name])
    }
}
