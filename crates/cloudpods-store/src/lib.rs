//! # cloudpods-store
//!
//! Low-level key-value store abstraction for the orchestrator. This crate
//! isolates all direct RocksDB interactions so cloudpods-system and
//! cloudpods-core stay free of RocksDB dependencies.
//!
//! ## Architecture
//!
//! ```text
//! cloudpods-core (lifecycle, jobs, webhooks)
//!     ↓
//! cloudpods-system (typed entity providers)
//!     ↓
//! cloudpods-store (K/V operations)
//!     ↓
//! RocksDB (storage engine)
//! ```
//!
//! ## Store Types
//!
//! - **EntityStore**: Type-safe CRUD over one partition
//! - **IndexedEntityStore**: EntityStore plus atomically-maintained secondary
//!   indexes, used by every provider that needs ordered lookups (claim order,
//!   status scans, tenant scans)

pub mod entity_store;
pub mod indexed_store;
pub mod rocksdb_impl;
pub mod rocksdb_init;
pub mod storage_trait;

pub use rocksdb_impl::RocksDBBackend;
pub use rocksdb_init::RocksDbInit;
pub use storage_trait::{Operation, Partition, StorageBackend, StorageBackendAsync, StorageError};

// Re-export StorageKey from cloudpods-commons to avoid import inconsistency
pub use cloudpods_commons::StorageKey;

pub use entity_store::EntityStore;
pub use indexed_store::{IndexDefinition, IndexedEntityStore};

// Make test_utils available for testing in dependent crates
pub mod test_utils;

/// Attempt to extract a RocksDB handle from a generic `StorageBackend`.
///
/// Returns `Some(Arc<rocksdb::DB>)` when the backend is a RocksDB-backed implementation,
/// otherwise returns `None`.
pub fn try_extract_rocksdb_db(
    backend: &std::sync::Arc<dyn crate::storage_trait::StorageBackend>,
) -> Option<std::sync::Arc<rocksdb::DB>> {
    backend
        .as_any()
        .downcast_ref::<crate::rocksdb_impl::RocksDBBackend>()
        .map(|rb| rb.db().clone())
}
