//! RocksDB implementation of the StorageBackend trait.
//!
//! This module provides a concrete implementation of `StorageBackend` using RocksDB
//! as the underlying storage engine. It maps the generic partition concept to
//! RocksDB column families.

use crate::storage_trait::{Operation, Partition, Result, StorageBackend, StorageError};
use rocksdb::{ColumnFamily, IteratorMode, Options, DB};
use std::sync::Arc;

/// RocksDB implementation of the StorageBackend trait.
///
/// Maps partitions to RocksDB column families, providing thread-safe access
/// to the underlying database.
///
/// ## Example
///
/// ```rust,ignore
/// use cloudpods_store::{RocksDBBackend, StorageBackend, Partition};
/// use std::sync::Arc;
///
/// let db = Arc::new(DB::open_default("/tmp/test.db").unwrap());
/// let backend = RocksDBBackend::new(db);
///
/// let partition = Partition::new("jobs");
/// backend.create_partition(&partition).unwrap();
/// backend.put(&partition, b"key1", b"value1").unwrap();
/// ```
pub struct RocksDBBackend {
    db: Arc<DB>,
}

impl RocksDBBackend {
    /// Creates a new RocksDB backend with the given database handle.
    pub fn new(db: Arc<DB>) -> Self {
        Self { db }
    }

    /// Returns a reference to the underlying database.
    pub fn db(&self) -> &Arc<DB> {
        &self.db
    }

    /// Gets a column family handle by partition name.
    fn get_cf(&self, partition: &Partition) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(partition.name())
            .ok_or_else(|| StorageError::PartitionNotFound(partition.name().to_string()))
    }
}

impl StorageBackend for RocksDBBackend {
    fn get(&self, partition: &Partition, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.get_cf(partition)?;
        self.db
            .get_cf(cf, key)
            .map_err(|e| StorageError::IoError(e.to_string()))
    }

    fn put(&self, partition: &Partition, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.get_cf(partition)?;
        self.db
            .put_cf(cf, key, value)
            .map_err(|e| StorageError::IoError(e.to_string()))
    }

    fn delete(&self, partition: &Partition, key: &[u8]) -> Result<()> {
        let cf = self.get_cf(partition)?;
        self.db
            .delete_cf(cf, key)
            .map_err(|e| StorageError::IoError(e.to_string()))
    }

    fn batch(&self, operations: Vec<Operation>) -> Result<()> {
        use rocksdb::WriteBatch;

        let mut batch = WriteBatch::default();

        for op in operations {
            match op {
                Operation::Put {
                    partition,
                    key,
                    value,
                } => {
                    let cf = self.get_cf(&partition)?;
                    batch.put_cf(cf, key, value);
                }
                Operation::Delete { partition, key } => {
                    let cf = self.get_cf(&partition)?;
                    batch.delete_cf(cf, key);
                }
            }
        }

        self.db
            .write(batch)
            .map_err(|e| StorageError::IoError(e.to_string()))
    }

    fn scan(
        &self,
        partition: &Partition,
        prefix: Option<&[u8]>,
        start_key: Option<&[u8]>,
        limit: Option<usize>,
    ) -> Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>> {
        use rocksdb::Direction;

        let cf = self.get_cf(partition)?;

        // Take a consistent snapshot for the duration of the iterator
        let snapshot = self.db.snapshot();

        let prefix_vec = prefix.map(|p| p.to_vec());

        // Determine start position
        let iter_mode = if let Some(start) = start_key {
            IteratorMode::From(start, Direction::Forward)
        } else if let Some(p) = &prefix_vec {
            IteratorMode::From(p.as_slice(), Direction::Forward)
        } else {
            IteratorMode::Start
        };

        // RocksDB iterator over the snapshot: bind snapshot to ReadOptions
        let mut readopts = rocksdb::ReadOptions::default();
        readopts.set_snapshot(&snapshot);
        let inner = self.db.iterator_cf_opt(cf, readopts, iter_mode);

        struct SnapshotScanIter<'a, D: rocksdb::DBAccess> {
            // Hold the snapshot to keep it alive for 'a
            _snapshot: rocksdb::SnapshotWithThreadMode<'a, D>,
            inner: rocksdb::DBIteratorWithThreadMode<'a, D>,
            prefix: Option<Vec<u8>>,
            remaining: Option<usize>,
        }

        impl<'a, D: rocksdb::DBAccess> Iterator for SnapshotScanIter<'a, D> {
            type Item = (Vec<u8>, Vec<u8>);
            fn next(&mut self) -> Option<Self::Item> {
                // Respect limit
                if let Some(0) = self.remaining {
                    return None;
                }

                match self.inner.next()? {
                    Ok((k, v)) => {
                        if let Some(ref p) = self.prefix {
                            if !k.starts_with(p) {
                                return None;
                            }
                        }
                        if let Some(ref mut left) = self.remaining {
                            if *left > 0 {
                                *left -= 1;
                            }
                        }
                        Some((k.to_vec(), v.to_vec()))
                    }
                    Err(_) => None,
                }
            }
        }

        let iter = SnapshotScanIter::<DB> {
            _snapshot: snapshot,
            inner,
            prefix: prefix_vec,
            remaining: limit,
        };

        Ok(Box::new(iter))
    }

    fn partition_exists(&self, partition: &Partition) -> bool {
        self.db.cf_handle(partition.name()).is_some()
    }

    fn create_partition(&self, partition: &Partition) -> Result<()> {
        // Check if already exists
        if self.partition_exists(partition) {
            return Ok(());
        }

        // Create new column family
        let opts = Options::default();
        unsafe {
            // SAFETY: This is safe because:
            // 1. We're not holding any references to the DB that could be invalidated
            // 2. RocksDB's create_cf is thread-safe
            // 3. We're not accessing any column families during creation
            // 4. The Arc ensures the DB is valid for the duration of this call
            let db_ptr = Arc::as_ptr(&self.db) as *mut DB;
            match (*db_ptr).create_cf(partition.name(), &opts) {
                Ok(()) => {}
                Err(e) => {
                    let msg = e.to_string();
                    // Handle benign race: another thread created the CF between exists-check and create
                    if msg.contains("Column family already exists")
                        || msg.contains("column family already exists")
                    {
                        return Ok(());
                    }
                    return Err(StorageError::IoError(msg));
                }
            }
        }

        Ok(())
    }

    fn list_partitions(&self) -> Result<Vec<Partition>> {
        // Column families cannot be enumerated from a shared Arc<DB> handle;
        // the set of partitions is known statically via StoragePartition::all()
        // and created at open time by RocksDbInit.
        Ok(Vec::new())
    }

    fn drop_partition(&self, partition: &Partition) -> Result<()> {
        if !self.partition_exists(partition) {
            return Ok(());
        }

        unsafe {
            // SAFETY: Similar reasoning as create_partition
            let db_ptr = Arc::as_ptr(&self.db) as *mut DB;
            (*db_ptr)
                .drop_cf(partition.name())
                .map_err(|e| StorageError::IoError(e.to_string()))?;
        }

        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_db() -> (Arc<DB>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open(&opts, temp_dir.path()).unwrap();
        (Arc::new(db), temp_dir)
    }

    #[test]
    fn test_create_and_get_partition() {
        let (db, _temp) = create_test_db();
        let backend = RocksDBBackend::new(db);

        let partition = Partition::new("test_cf");
        backend.create_partition(&partition).unwrap();

        assert!(backend.partition_exists(&partition));
    }

    #[test]
    fn test_put_and_get() {
        let (db, _temp) = create_test_db();
        let backend = RocksDBBackend::new(db);

        let partition = Partition::new("test_cf");
        backend.create_partition(&partition).unwrap();

        backend.put(&partition, b"key1", b"value1").unwrap();
        let value = backend.get(&partition, b"key1").unwrap();

        assert_eq!(value, Some(b"value1".to_vec()));
    }

    #[test]
    fn test_delete() {
        let (db, _temp) = create_test_db();
        let backend = RocksDBBackend::new(db);

        let partition = Partition::new("test_cf");
        backend.create_partition(&partition).unwrap();

        backend.put(&partition, b"key1", b"value1").unwrap();
        backend.delete(&partition, b"key1").unwrap();

        let value = backend.get(&partition, b"key1").unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_batch_operations() {
        let (db, _temp) = create_test_db();
        let backend = RocksDBBackend::new(db);

        let partition = Partition::new("test_cf");
        backend.create_partition(&partition).unwrap();

        let ops = vec![
            Operation::Put {
                partition: partition.clone(),
                key: b"key1".to_vec(),
                value: b"value1".to_vec(),
            },
            Operation::Put {
                partition: partition.clone(),
                key: b"key2".to_vec(),
                value: b"value2".to_vec(),
            },
            Operation::Delete {
                partition: partition.clone(),
                key: b"key1".to_vec(),
            },
        ];

        backend.batch(ops).unwrap();

        assert_eq!(backend.get(&partition, b"key1").unwrap(), None);
        assert_eq!(
            backend.get(&partition, b"key2").unwrap(),
            Some(b"value2".to_vec())
        );
    }

    #[test]
    fn test_scan_all() {
        let (db, _temp) = create_test_db();
        let backend = RocksDBBackend::new(db);

        let partition = Partition::new("test_cf");
        backend.create_partition(&partition).unwrap();

        backend.put(&partition, b"key1", b"value1").unwrap();
        backend.put(&partition, b"key2", b"value2").unwrap();
        backend.put(&partition, b"key3", b"value3").unwrap();

        let results: Vec<_> = backend
            .scan(&partition, None, None, None)
            .unwrap()
            .collect();

        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_scan_with_prefix() {
        let (db, _temp) = create_test_db();
        let backend = RocksDBBackend::new(db);

        let partition = Partition::new("test_cf");
        backend.create_partition(&partition).unwrap();

        backend.put(&partition, b"job:1", b"value1").unwrap();
        backend.put(&partition, b"job:2", b"value2").unwrap();
        backend.put(&partition, b"pod:1", b"value3").unwrap();

        let results: Vec<_> = backend
            .scan(&partition, Some(b"job:"), None, None)
            .unwrap()
            .collect();

        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_scan_with_limit() {
        let (db, _temp) = create_test_db();
        let backend = RocksDBBackend::new(db);

        let partition = Partition::new("test_cf");
        backend.create_partition(&partition).unwrap();

        backend.put(&partition, b"key1", b"value1").unwrap();
        backend.put(&partition, b"key2", b"value2").unwrap();
        backend.put(&partition, b"key3", b"value3").unwrap();

        let results: Vec<_> = backend
            .scan(&partition, None, None, Some(2))
            .unwrap()
            .collect();

        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_scan_with_start_key() {
        let (db, _temp) = create_test_db();
        let backend = RocksDBBackend::new(db);

        let partition = Partition::new("test_cf");
        backend.create_partition(&partition).unwrap();

        backend.put(&partition, b"key1", b"value1").unwrap();
        backend.put(&partition, b"key2", b"value2").unwrap();
        backend.put(&partition, b"key3", b"value3").unwrap();

        let results: Vec<_> = backend
            .scan(&partition, None, Some(b"key2"), None)
            .unwrap()
            .collect();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, b"key2".to_vec());
    }

    #[test]
    fn test_missing_partition_errors() {
        let (db, _temp) = create_test_db();
        let backend = RocksDBBackend::new(db);

        let partition = Partition::new("missing");
        let result = backend.get(&partition, b"key1");
        assert!(matches!(result, Err(StorageError::PartitionNotFound(_))));
    }
}
