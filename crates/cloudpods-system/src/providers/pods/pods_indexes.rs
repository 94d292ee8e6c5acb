//! Index definitions for the pods table.

use cloudpods_commons::models::{Pod, PodStatus};
use cloudpods_commons::{encode_key, encode_prefix, PodId, StoragePartition, TenantId};
use cloudpods_store::IndexDefinition;
use std::sync::Arc;

/// Index position for `PodTenantIndex` in `create_pods_indexes()`.
pub const TENANT_INDEX: usize = 0;
/// Index position for `PodStatusIndex` in `create_pods_indexes()`.
pub const STATUS_INDEX: usize = 1;

/// Maps PodStatus to a stable byte for index key encoding.
pub fn pod_status_to_u8(status: PodStatus) -> u8 {
    match status {
        PodStatus::Pending => 0,
        PodStatus::Provisioning => 1,
        PodStatus::Active => 2,
        PodStatus::Suspended => 3,
        PodStatus::Deleting => 4,
        PodStatus::Failed => 5,
    }
}

/// Prefix for all pods of one tenant in `PodTenantIndex`.
pub fn tenant_prefix(tenant_id: &TenantId) -> Vec<u8> {
    encode_prefix(&(tenant_id.as_str(),))
}

/// Index: pods by owning tenant.
///
/// Key: `(tenant_id, pod_id)` via order-preserving tuple encoding, so a
/// tenant prefix cannot match another tenant whose id merely extends it.
pub struct PodTenantIndex;

impl IndexDefinition<PodId, Pod> for PodTenantIndex {
    fn partition(&self) -> &str {
        StoragePartition::PodsTenantIdx.name()
    }

    fn indexed_columns(&self) -> Vec<&str> {
        vec!["tenant_id", "pod_id"]
    }

    fn extract_key(&self, _pk: &PodId, pod: &Pod) -> Option<Vec<u8>> {
        Some(encode_key(&(
            pod.tenant_id.as_str(),
            pod.pod_id.as_str(),
        )))
    }
}

/// Index: pods by lifecycle status.
///
/// Key: `[status_byte][pod_id]`. Drives the metering sampler (Active pods)
/// and the health checker.
pub struct PodStatusIndex;

impl IndexDefinition<PodId, Pod> for PodStatusIndex {
    fn partition(&self) -> &str {
        StoragePartition::PodsStatusIdx.name()
    }

    fn indexed_columns(&self) -> Vec<&str> {
        vec!["status", "pod_id"]
    }

    fn extract_key(&self, _pk: &PodId, pod: &Pod) -> Option<Vec<u8>> {
        let id_bytes = pod.pod_id.as_bytes();
        let mut key = Vec::with_capacity(1 + id_bytes.len());
        key.push(pod_status_to_u8(pod.status));
        key.extend_from_slice(id_bytes);
        Some(key)
    }
}

/// Creates all index definitions for the pods table.
pub fn create_pods_indexes() -> Vec<Arc<dyn IndexDefinition<PodId, Pod>>> {
    vec![Arc::new(PodTenantIndex), Arc::new(PodStatusIndex)]
}
