//! DNS records provider.

use crate::error::SystemError;
use cloudpods_commons::models::{DnsRecord, ResourceStatus};
use cloudpods_commons::{encode_key, encode_prefix, DnsRecordId, PodId, StoragePartition};
use cloudpods_store::entity_store::EntityStore;
use cloudpods_store::{IndexDefinition, IndexedEntityStore, StorageBackend};
use std::sync::Arc;

/// Index position for `DnsRecordPodIndex`.
pub const POD_INDEX: usize = 0;

/// Index: DNS records by owning pod. Key: `(pod_id, record_id)`.
pub struct DnsRecordPodIndex;

impl IndexDefinition<DnsRecordId, DnsRecord> for DnsRecordPodIndex {
    fn partition(&self) -> &str {
        StoragePartition::DnsRecordsPodIdx.name()
    }

    fn indexed_columns(&self) -> Vec<&str> {
        vec!["pod_id", "record_id"]
    }

    fn extract_key(&self, _pk: &DnsRecordId, record: &DnsRecord) -> Option<Vec<u8>> {
        Some(encode_key(&(
            record.pod_id.as_str(),
            record.record_id.as_str(),
        )))
    }
}

/// Type alias for the indexed DNS records store
pub type DnsRecordsStore = IndexedEntityStore<DnsRecordId, DnsRecord>;

pub struct DnsRecordsProvider {
    store: DnsRecordsStore,
}

impl std::fmt::Debug for DnsRecordsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsRecordsProvider").finish()
    }
}

impl DnsRecordsProvider {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let store = IndexedEntityStore::new(
            backend,
            StoragePartition::DnsRecords.name(),
            vec![Arc::new(DnsRecordPodIndex) as Arc<dyn IndexDefinition<DnsRecordId, DnsRecord>>],
        );
        Self { store }
    }

    pub fn create_record(&self, record: DnsRecord) -> Result<DnsRecord, SystemError> {
        if self.store.get(&record.record_id)?.is_some() {
            return Err(SystemError::AlreadyExists(format!(
                "DNS record already exists: {}",
                record.record_id
            )));
        }
        self.store.insert(&record.record_id, &record)?;
        Ok(record)
    }

    pub fn get_record(&self, record_id: &DnsRecordId) -> Result<Option<DnsRecord>, SystemError> {
        Ok(self.store.get(record_id)?)
    }

    /// Mark the registration outcome reported by the DNS backend.
    pub fn set_status(
        &self,
        record_id: &DnsRecordId,
        status: ResourceStatus,
        last_error: Option<String>,
        now: i64,
    ) -> Result<DnsRecord, SystemError> {
        let record = self
            .store
            .get(record_id)?
            .ok_or_else(|| SystemError::NotFound(format!("DNS record not found: {}", record_id)))?;
        let mut updated = record.clone();
        updated.status = status;
        updated.last_error = last_error;
        updated.updated_at = now;
        self.store.update_with_old(record_id, Some(&record), &updated)?;
        Ok(updated)
    }

    pub fn list_by_pod(&self, pod_id: &PodId) -> Result<Vec<DnsRecord>, SystemError> {
        let prefix = encode_prefix(&(pod_id.as_str(),));
        let entries = self.store.scan_by_index(POD_INDEX, Some(&prefix), None)?;
        Ok(entries.into_iter().map(|(_, r)| r).collect())
    }

    pub fn delete_record(&self, record_id: &DnsRecordId) -> Result<(), SystemError> {
        self.store.delete(record_id)?;
        Ok(())
    }

    /// Remove every record owned by a pod. Returns the number removed.
    pub fn delete_all_for_pod(&self, pod_id: &PodId) -> Result<usize, SystemError> {
        let records = self.list_by_pod(pod_id)?;
        let count = records.len();
        for record in &records {
            self.store.delete_with_entity(&record.record_id, record)?;
        }
        if count > 0 {
            log::debug!("Deleted {} DNS records for pod {}", count, pod_id);
        }
        Ok(count)
    }
}
