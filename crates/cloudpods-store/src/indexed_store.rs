//! Indexed Entity Store - Automatic secondary index management.
//!
//! This module provides `IndexedEntityStore<K, V>` which extends `EntityStore`
//! with automatic secondary index maintenance using the backend's atomic batch.
//!
//! ## Architecture
//!
//! ```text
//! IndexedEntityStore<K, V>
//!     │
//!     ├── insert(key, entity)
//!     │       │
//!     │       ▼
//!     │   backend.batch([
//!     │       Put { entity },
//!     │       Put { index1 },
//!     │       Put { index2 },
//!     │   ])
//!     │
//!     ├── update(key, entity)
//!     │       │
//!     │       ▼
//!     │   1. Fetch old entity
//!     │   2. backend.batch([
//!     │       Delete { old_index1 },  // if changed
//!     │       Put { entity },
//!     │       Put { new_index1 },
//!     │   ])
//!     │
//!     └── delete(key)
//!             │
//!             ▼
//!         1. Fetch entity
//!         2. backend.batch([
//!             Delete { entity },
//!             Delete { index1 },
//!         ])
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use cloudpods_store::{IndexedEntityStore, IndexDefinition};
//! use cloudpods_commons::{JobId, models::{Job, JobStatus}};
//!
//! // Define an index
//! struct JobStatusIndex;
//!
//! impl IndexDefinition<JobId, Job> for JobStatusIndex {
//!     fn partition(&self) -> &str {
//!         "jobs_status_idx"
//!     }
//!
//!     fn indexed_columns(&self) -> Vec<&str> {
//!         vec!["status"]
//!     }
//!
//!     fn extract_key(&self, _pk: &JobId, job: &Job) -> Option<Vec<u8>> {
//!         let mut key = Vec::new();
//!         key.push(job.status as u8);
//!         key.extend_from_slice(&(job.updated_at as u64).to_be_bytes());
//!         key.extend_from_slice(job.job_id.as_bytes());
//!         Some(key)
//!     }
//! }
//!
//! // Create store with indexes
//! let store = IndexedEntityStore::new(backend, "jobs", vec![Arc::new(JobStatusIndex)]);
//!
//! // Insert - automatically updates indexes
//! store.insert(&job.job_id, &job)?;
//! ```

use crate::entity_store::EntityStore;
use crate::storage_trait::{Operation, Partition, Result, StorageBackend, StorageError};
use cloudpods_commons::serialization::Storable;
use cloudpods_commons::StorageKey;
use std::sync::Arc;

// ============================================================================
// IndexDefinition Trait
// ============================================================================

/// Defines how to extract index keys from an entity.
///
/// Each index is defined by:
/// - A partition name where index entries are stored
/// - Column names covered by the index (documentation and diagnostics)
/// - A function to extract the index key from the entity
/// - Optional: Custom index value (default is primary key for reverse lookup)
///
/// ## Index Key Design Guidelines
///
/// For range queries, design composite keys with the most selective field first:
/// ```text
/// [status][scheduled_at_be][job_id]
///    1B        8B            var
/// ```
///
/// - Use big-endian for numeric fields (ensures lexicographic = numeric order)
/// - Append primary key to ensure uniqueness
/// - Return `None` from `extract_key()` to skip indexing (conditional indexes)
pub trait IndexDefinition<K, V>: Send + Sync
where
    K: StorageKey,
    V: Storable,
{
    /// Returns the partition name for this index.
    ///
    /// Must be unique across all indexes in the system.
    /// Convention: `{main_partition}_{columns}_idx` e.g. `jobs_status_updated_idx`
    fn partition(&self) -> &str;

    /// Returns the column names this index covers, in index-key order.
    fn indexed_columns(&self) -> Vec<&str>;

    /// Extracts the index key from the entity.
    ///
    /// Returns `None` if this entity should not be indexed (e.g., a claim
    /// index that only covers pending jobs).
    fn extract_key(&self, primary_key: &K, entity: &V) -> Option<Vec<u8>>;

    /// Returns the value to store in the index.
    ///
    /// Default: Store the primary key bytes for reverse lookup.
    /// Override for covering indexes that include additional data.
    fn index_value(&self, primary_key: &K, _entity: &V) -> Vec<u8> {
        primary_key.storage_key()
    }
}

// ============================================================================
// IndexedEntityStore
// ============================================================================

/// An EntityStore that automatically manages secondary indexes.
///
/// All write operations (insert/update/delete) atomically update the entity
/// and all defined indexes using the backend's batch.
///
/// ## Type Parameters
///
/// - `K`: Primary key type (implements `StorageKey`)
/// - `V`: Entity value type (implements `Storable`)
///
/// ## Thread Safety
///
/// This struct is `Send + Sync` and can be safely shared across threads.
/// The underlying `StorageBackend` handles concurrent access.
pub struct IndexedEntityStore<K, V>
where
    K: StorageKey,
    V: Storable + 'static,
{
    backend: Arc<dyn StorageBackend>,
    partition: String,
    indexes: Vec<Arc<dyn IndexDefinition<K, V>>>,
    _marker: std::marker::PhantomData<(K, V)>,
}

impl<K, V> IndexedEntityStore<K, V>
where
    K: StorageKey,
    V: Storable + 'static,
{
    /// Creates a new IndexedEntityStore.
    ///
    /// # Arguments
    ///
    /// * `backend` - Storage backend (RocksDB or in-memory)
    /// * `partition` - Partition name for the main entity table
    /// * `indexes` - List of index definitions
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        partition: impl Into<String>,
        indexes: Vec<Arc<dyn IndexDefinition<K, V>>>,
    ) -> Self {
        let partition_str = partition.into();

        // Ensure main partition exists
        let main_partition = Partition::new(&partition_str);
        let _ = backend.create_partition(&main_partition); // Ignore error if already exists

        // Ensure all index partitions exist
        for index in &indexes {
            let index_partition = Partition::new(index.partition());
            let _ = backend.create_partition(&index_partition); // Ignore error if already exists
        }

        Self {
            backend,
            partition: partition_str,
            indexes,
            _marker: std::marker::PhantomData,
        }
    }

    /// Returns the index definitions.
    pub fn indexes(&self) -> &[Arc<dyn IndexDefinition<K, V>>] {
        &self.indexes
    }

    /// Returns an index definition by position.
    pub fn get_index(&self, idx: usize) -> Option<&Arc<dyn IndexDefinition<K, V>>> {
        self.indexes.get(idx)
    }

    // ========================================================================
    // Sync Write Operations (Atomic with Indexes)
    // ========================================================================

    /// Inserts a new entity with all indexes atomically.
    ///
    /// All operations succeed or none are applied.
    pub fn insert(&self, key: &K, entity: &V) -> Result<()> {
        let mut operations = Vec::with_capacity(1 + self.indexes.len());

        // 1. Main entity write
        let partition = Partition::new(&self.partition);
        let value = entity.encode()?;
        operations.push(Operation::Put {
            partition,
            key: key.storage_key(),
            value,
        });

        // 2. Index writes
        for index in &self.indexes {
            if let Some(index_key) = index.extract_key(key, entity) {
                let index_partition = Partition::new(index.partition());
                let index_value = index.index_value(key, entity);
                operations.push(Operation::Put {
                    partition: index_partition,
                    key: index_key,
                    value: index_value,
                });
            }
        }

        // Atomic batch write
        self.backend.batch(operations)
    }

    /// Inserts multiple entities with all indexes atomically in a single batch.
    ///
    /// Significantly cheaper than calling `insert()` N times: one disk write
    /// instead of N.
    pub fn insert_batch(&self, entries: &[(K, V)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        // Pre-allocate: each entry = 1 entity write + N index writes
        let ops_per_entry = 1 + self.indexes.len();
        let mut operations = Vec::with_capacity(entries.len() * ops_per_entry);

        let partition = Partition::new(&self.partition);

        for (key, entity) in entries {
            let value = entity.encode()?;
            operations.push(Operation::Put {
                partition: partition.clone(),
                key: key.storage_key(),
                value,
            });

            for index in &self.indexes {
                if let Some(index_key) = index.extract_key(key, entity) {
                    let index_partition = Partition::new(index.partition());
                    let index_value = index.index_value(key, entity);
                    operations.push(Operation::Put {
                        partition: index_partition,
                        key: index_key,
                        value: index_value,
                    });
                }
            }
        }

        // Single atomic batch write for ALL entities
        self.backend.batch(operations)
    }

    /// Updates an entity and its indexes atomically.
    ///
    /// 1. Fetches old entity to determine stale index entries
    /// 2. Deletes old index entries (if keys changed)
    /// 3. Writes new entity
    /// 4. Writes new index entries
    ///
    /// All in a single atomic batch.
    ///
    /// # Note
    ///
    /// This method fetches the old entity first to determine which index
    /// entries need to be deleted. If you already have the old entity,
    /// use `update_with_old()` to skip the extra fetch.
    pub fn update(&self, key: &K, new_entity: &V) -> Result<()> {
        // Fetch old entity to determine which index entries to remove
        let old_entity = self.get(key)?;
        self.update_internal(key, old_entity.as_ref(), new_entity)
    }

    /// Updates an entity when you already have the old entity.
    pub fn update_with_old(&self, key: &K, old_entity: Option<&V>, new_entity: &V) -> Result<()> {
        self.update_internal(key, old_entity, new_entity)
    }

    fn update_internal(&self, key: &K, old_entity: Option<&V>, new_entity: &V) -> Result<()> {
        let mut operations = Vec::with_capacity(1 + self.indexes.len() * 2);

        // 1. Delete stale index entries (if entity existed and index key changed)
        if let Some(old) = old_entity {
            for index in &self.indexes {
                let old_index_key = index.extract_key(key, old);
                let new_index_key = index.extract_key(key, new_entity);

                // Only delete if index key changed
                if old_index_key != new_index_key {
                    if let Some(old_key) = old_index_key {
                        let index_partition = Partition::new(index.partition());
                        operations.push(Operation::Delete {
                            partition: index_partition,
                            key: old_key,
                        });
                    }
                }
            }
        }

        // 2. Write new entity
        let partition = Partition::new(&self.partition);
        let value = new_entity.encode()?;
        operations.push(Operation::Put {
            partition,
            key: key.storage_key(),
            value,
        });

        // 3. Write new index entries (only if changed or new entity)
        for index in &self.indexes {
            let new_index_key = index.extract_key(key, new_entity);
            let old_index_key = old_entity.and_then(|old| index.extract_key(key, old));

            if new_index_key != old_index_key {
                if let Some(idx_key) = new_index_key {
                    let index_partition = Partition::new(index.partition());
                    let index_value = index.index_value(key, new_entity);
                    operations.push(Operation::Put {
                        partition: index_partition,
                        key: idx_key,
                        value: index_value,
                    });
                }
            }
        }

        // Atomic batch write
        self.backend.batch(operations)
    }

    /// Deletes an entity and all its index entries atomically.
    ///
    /// # Note
    ///
    /// Fetches the entity first to determine which index entries need to be
    /// deleted. If you already have the entity, use `delete_with_entity()`.
    pub fn delete(&self, key: &K) -> Result<()> {
        let entity = match self.get(key)? {
            Some(e) => e,
            None => return Ok(()), // Already deleted
        };

        self.delete_with_entity(key, &entity)
    }

    /// Deletes an entity when you already have it.
    pub fn delete_with_entity(&self, key: &K, entity: &V) -> Result<()> {
        let mut operations = Vec::with_capacity(1 + self.indexes.len());

        // 1. Delete main entity
        let partition = Partition::new(&self.partition);
        operations.push(Operation::Delete {
            partition,
            key: key.storage_key(),
        });

        // 2. Delete all index entries
        for index in &self.indexes {
            if let Some(index_key) = index.extract_key(key, entity) {
                let index_partition = Partition::new(index.partition());
                operations.push(Operation::Delete {
                    partition: index_partition,
                    key: index_key,
                });
            }
        }

        // Atomic batch write
        self.backend.batch(operations)
    }

    // ========================================================================
    // Sync Read/Scan Operations
    // ========================================================================

    /// Scans an index by prefix and returns matching entities.
    ///
    /// # Arguments
    ///
    /// * `index_idx` - Index number (0-based)
    /// * `prefix` - Optional prefix to filter by
    /// * `limit` - Optional limit on number of results
    ///
    /// # Returns
    ///
    /// Vector of (primary_key, entity) tuples in index-key order.
    pub fn scan_by_index(
        &self,
        index_idx: usize,
        prefix: Option<&[u8]>,
        limit: Option<usize>,
    ) -> Result<Vec<(K, V)>> {
        let index = self
            .indexes
            .get(index_idx)
            .ok_or_else(|| StorageError::Other(format!("Index {} not found", index_idx)))?;

        let index_partition = Partition::new(index.partition());
        let iter = self.backend.scan(&index_partition, prefix, None, limit)?;

        let mut results = Vec::new();
        for (_index_key, primary_key_bytes) in iter {
            // Deserialize primary key from index value
            let primary_key =
                K::from_storage_key(&primary_key_bytes).map_err(StorageError::SerializationError)?;

            // Fetch actual entity
            if let Some(entity) = self.get(&primary_key)? {
                results.push((primary_key, entity));
            }
        }

        Ok(results)
    }

    /// Scans an index and returns only the primary keys (no entity fetch).
    pub fn scan_index_keys(
        &self,
        index_idx: usize,
        prefix: Option<&[u8]>,
        limit: Option<usize>,
    ) -> Result<Vec<K>> {
        let index = self
            .indexes
            .get(index_idx)
            .ok_or_else(|| StorageError::Other(format!("Index {} not found", index_idx)))?;

        let index_partition = Partition::new(index.partition());
        let iter = self.backend.scan(&index_partition, prefix, None, limit)?;

        let mut results = Vec::new();
        for (_index_key, primary_key_bytes) in iter {
            let primary_key =
                K::from_storage_key(&primary_key_bytes).map_err(StorageError::SerializationError)?;
            results.push(primary_key);
        }

        Ok(results)
    }

    /// Checks if any entry exists in an index with the given prefix.
    ///
    /// The cheapest check available: scans the index only, no entity fetch,
    /// stops at first match. Use this for uniqueness and in-flight checks.
    pub fn exists_by_index(&self, index_idx: usize, prefix: &[u8]) -> Result<bool> {
        let index = self
            .indexes
            .get(index_idx)
            .ok_or_else(|| StorageError::Other(format!("Index {} not found", index_idx)))?;

        let index_partition = Partition::new(index.partition());
        // Only fetch 1 result - we just need to know if anything exists
        let iter = self.backend.scan(&index_partition, Some(prefix), None, Some(1))?;

        Ok(iter.into_iter().next().is_some())
    }

    /// Scans an index returning raw (index_key, primary_key) pairs.
    ///
    /// Useful when the caller needs the index key itself, e.g. for ordering
    /// decisions or resuming a scan.
    pub fn scan_index_raw(
        &self,
        index_idx: usize,
        prefix: Option<&[u8]>,
        start_key: Option<&[u8]>,
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let index = self
            .indexes
            .get(index_idx)
            .ok_or_else(|| StorageError::Other(format!("Index {} not found", index_idx)))?;

        let index_partition = Partition::new(index.partition());
        let iter = self.backend.scan(&index_partition, prefix, start_key, limit)?;

        Ok(iter.collect())
    }
}

// ============================================================================
// EntityStore Implementation
// ============================================================================

impl<K, V> EntityStore<K, V> for IndexedEntityStore<K, V>
where
    K: StorageKey,
    V: Storable + 'static,
{
    fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    fn partition(&self) -> &str {
        &self.partition
    }
}

// ============================================================================
// Clone Implementation
// ============================================================================

impl<K, V> Clone for IndexedEntityStore<K, V>
where
    K: StorageKey,
    V: Storable + 'static,
{
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            partition: self.partition.clone(),
            indexes: self.indexes.clone(),
            _marker: std::marker::PhantomData,
        }
    }
}

// ============================================================================
// Async Support
// ============================================================================

impl<K, V> IndexedEntityStore<K, V>
where
    K: StorageKey + Clone + Send + Sync + 'static,
    V: Storable + Clone + Send + Sync + 'static,
{
    /// Async version of `insert()`.
    ///
    /// Uses `spawn_blocking` to avoid blocking the async runtime.
    pub async fn insert_async(&self, key: K, entity: V) -> Result<()> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.insert(&key, &entity))
            .await
            .map_err(|e| StorageError::Other(format!("spawn_blocking error: {}", e)))?
    }

    /// Async version of `update()`.
    pub async fn update_async(&self, key: K, entity: V) -> Result<()> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.update(&key, &entity))
            .await
            .map_err(|e| StorageError::Other(format!("spawn_blocking error: {}", e)))?
    }

    /// Async version of `delete()`.
    pub async fn delete_async(&self, key: K) -> Result<()> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.delete(&key))
            .await
            .map_err(|e| StorageError::Other(format!("spawn_blocking error: {}", e)))?
    }

    /// Async version of `scan_by_index()`.
    pub async fn scan_by_index_async(
        &self,
        index_idx: usize,
        prefix: Option<Vec<u8>>,
        limit: Option<usize>,
    ) -> Result<Vec<(K, V)>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.scan_by_index(index_idx, prefix.as_deref(), limit))
            .await
            .map_err(|e| StorageError::Other(format!("spawn_blocking error: {}", e)))?
    }

    /// Async version of `get()` from EntityStore.
    pub async fn get_async(&self, key: K) -> Result<Option<V>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.get(&key))
            .await
            .map_err(|e| StorageError::Other(format!("spawn_blocking error: {}", e)))?
    }

    /// Async version of `scan_all()` from EntityStore.
    pub async fn scan_all_async(
        &self,
        limit: Option<usize>,
        prefix: Option<K>,
        start_key: Option<K>,
    ) -> Result<Vec<(Vec<u8>, V)>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            store.scan_all(limit, prefix.as_ref(), start_key.as_ref())
        })
        .await
        .map_err(|e| StorageError::Other(format!("spawn_blocking error: {}", e)))?
    }
}

// ============================================================================
// Tests
// ============================================================================
