//! Storage backend abstraction for pluggable storage implementations.
//!
//! This module provides a trait-based abstraction layer that lets the
//! orchestrator run against different storage backends (RocksDB in
//! production, in-memory for tests) without changing provider logic.
//!
//! ## Architecture
//!
//! The abstraction uses a `StorageBackend` trait that defines common operations:
//! - get/put/delete for key-value access
//! - batch for atomic multi-operation transactions
//! - scan for range queries
//! - partition management (maps to column families in RocksDB)
//!
//! ## Partition Model
//!
//! Since different backends have different concepts for data organization:
//! - **RocksDB**: Partition = Column Family
//! - **In-Memory**: Partition = BTreeMap namespace
//!
//! We use a generic `Partition` abstraction that backends map to their native
//! concepts. The partitions used by the orchestrator are enumerated in
//! `cloudpods_commons::partitions::StoragePartition`.

use std::any::Any;

pub use cloudpods_commons::storage::{KvIterator, Partition, StorageError};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Represents a single operation in a batch transaction.
///
/// Used with `StorageBackend::batch()` for atomic multi-operation transactions.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Insert or update a key-value pair
    Put {
        partition: Partition,
        key: Vec<u8>,
        value: Vec<u8>,
    },

    /// Delete a key
    Delete { partition: Partition, key: Vec<u8> },
}

/// Trait for pluggable storage backend implementations.
///
/// Implementations must be thread-safe (Send + Sync) to allow concurrent access.
///
/// ## Error Handling
///
/// Implementations should:
/// - Return `PartitionNotFound` if partition doesn't exist
/// - Return `IoError` for underlying storage failures
/// - Return `Unsupported` for operations not supported by the backend
pub trait StorageBackend: Send + Sync {
    /// Retrieves a value by key from the specified partition.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    fn get(&self, partition: &Partition, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Stores a key-value pair in the specified partition.
    ///
    /// If the key already exists, its value is updated.
    fn put(&self, partition: &Partition, key: &[u8], value: &[u8]) -> Result<()>;

    /// Deletes a key from the specified partition.
    ///
    /// Returns `Ok(())` even if the key doesn't exist (idempotent).
    fn delete(&self, partition: &Partition, key: &[u8]) -> Result<()>;

    /// Executes multiple operations atomically in a batch.
    ///
    /// Either all operations succeed or none are applied. Claim transitions
    /// and index maintenance rely on this atomicity.
    fn batch(&self, operations: Vec<Operation>) -> Result<()>;

    /// Scans keys in a partition, optionally filtered by prefix and limit.
    ///
    /// Returns an iterator of (key, value) pairs. The iterator should be
    /// memory-efficient (not loading all data at once).
    ///
    /// ## Parameters
    /// - `prefix`: If Some, only return keys starting with this prefix
    /// - `start_key`: If Some, start scanning from this key (inclusive). Must be >= prefix if both are set.
    /// - `limit`: If Some, return at most this many entries
    fn scan(
        &self,
        partition: &Partition,
        prefix: Option<&[u8]>,
        start_key: Option<&[u8]>,
        limit: Option<usize>,
    ) -> Result<KvIterator<'_>>;

    /// Checks if a partition exists.
    fn partition_exists(&self, partition: &Partition) -> bool;

    /// Creates a new partition.
    ///
    /// Returns `Ok(())` if the partition already exists (idempotent).
    fn create_partition(&self, partition: &Partition) -> Result<()>;

    /// Lists all partitions in the storage backend.
    fn list_partitions(&self) -> Result<Vec<Partition>>;

    /// Deletes a partition and all its data.
    ///
    /// **Warning**: This is a destructive operation and cannot be undone.
    fn drop_partition(&self, partition: &Partition) -> Result<()>;

    /// Downcast support for integration paths that need the concrete backend.
    ///
    /// Should be used sparingly; prefer the trait methods above.
    fn as_any(&self) -> &dyn Any;
}

/// Extension trait providing async versions of StorageBackend methods.
///
/// These methods internally use `tokio::task::spawn_blocking` to offload
/// synchronous storage operations to a blocking thread pool, preventing
/// the async runtime from being blocked.
#[async_trait::async_trait]
pub trait StorageBackendAsync: Send + Sync {
    /// Async version of `get()` - retrieves a value by key.
    async fn get_async(&self, partition: &Partition, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Async version of `put()` - stores a key-value pair.
    async fn put_async(&self, partition: &Partition, key: &[u8], value: &[u8]) -> Result<()>;

    /// Async version of `delete()` - removes a key.
    async fn delete_async(&self, partition: &Partition, key: &[u8]) -> Result<()>;

    /// Async version of `batch()` - executes multiple operations atomically.
    async fn batch_async(&self, operations: Vec<Operation>) -> Result<()>;

    /// Async version of `scan()` - scans keys in a partition.
    /// Returns collected results since iterators can't cross spawn_blocking boundary.
    async fn scan_async(
        &self,
        partition: &Partition,
        prefix: Option<Vec<u8>>,
        start_key: Option<Vec<u8>>,
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

// Blanket implementation for Arc<dyn StorageBackend>
#[async_trait::async_trait]
impl StorageBackendAsync for std::sync::Arc<dyn StorageBackend> {
    async fn get_async(&self, partition: &Partition, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let backend = self.clone();
        let partition = partition.clone();
        let key = key.to_vec();
        tokio::task::spawn_blocking(move || backend.get(&partition, &key))
            .await
            .map_err(|e| StorageError::Other(format!("spawn_blocking join error: {}", e)))?
    }

    async fn put_async(&self, partition: &Partition, key: &[u8], value: &[u8]) -> Result<()> {
        let backend = self.clone();
        let partition = partition.clone();
        let key = key.to_vec();
        let value = value.to_vec();
        tokio::task::spawn_blocking(move || backend.put(&partition, &key, &value))
            .await
            .map_err(|e| StorageError::Other(format!("spawn_blocking join error: {}", e)))?
    }

    async fn delete_async(&self, partition: &Partition, key: &[u8]) -> Result<()> {
        let backend = self.clone();
        let partition = partition.clone();
        let key = key.to_vec();
        tokio::task::spawn_blocking(move || backend.delete(&partition, &key))
            .await
            .map_err(|e| StorageError::Other(format!("spawn_blocking join error: {}", e)))?
    }

    async fn batch_async(&self, operations: Vec<Operation>) -> Result<()> {
        let backend = self.clone();
        tokio::task::spawn_blocking(move || backend.batch(operations))
            .await
            .map_err(|e| StorageError::Other(format!("spawn_blocking join error: {}", e)))?
    }

    async fn scan_async(
        &self,
        partition: &Partition,
        prefix: Option<Vec<u8>>,
        start_key: Option<Vec<u8>>,
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let backend = self.clone();
        let partition = partition.clone();
        tokio::task::spawn_blocking(move || {
            let iter = backend.scan(&partition, prefix.as_deref(), start_key.as_deref(), limit)?;
            Ok(iter.collect())
        })
        .await
        .map_err(|e| StorageError::Other(format!("spawn_blocking join error: {}", e)))?
    }
}
