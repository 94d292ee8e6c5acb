//! Daily usage rollup provider.
//!
//! Rows are keyed `(tenant_id, pod_id, date)` and written with a plain put,
//! so recomputing a day replaces the previous aggregate instead of appending
//! a second one. Billing reads one tenant's rows with a prefix scan.

use crate::error::SystemError;
use cloudpods_commons::models::{RollupKey, UsageDaily};
use cloudpods_commons::{encode_prefix, PodId, StoragePartition, TenantId};
use cloudpods_store::entity_store::EntityStore;
use cloudpods_store::{IndexedEntityStore, StorageBackend};
use std::sync::Arc;

/// Type alias for the daily rollup store
pub type UsageDailyStore = IndexedEntityStore<RollupKey, UsageDaily>;

pub struct UsageDailyProvider {
    store: UsageDailyStore,
}

impl std::fmt::Debug for UsageDailyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageDailyProvider").finish()
    }
}

impl UsageDailyProvider {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let store =
            IndexedEntityStore::new(backend, StoragePartition::UsageDaily.name(), Vec::new());
        Self { store }
    }

    /// Write or replace a rollup row. Idempotent by key.
    pub fn upsert(&self, daily: UsageDaily) -> Result<(), SystemError> {
        let key = RollupKey::new(daily.tenant_id.clone(), daily.pod_id.clone(), daily.date);
        self.store.put(&key, &daily)?;
        Ok(())
    }

    pub fn get_rollup(&self, key: &RollupKey) -> Result<Option<UsageDaily>, SystemError> {
        Ok(self.store.get(key)?)
    }

    /// All rollup rows for one tenant, oldest date first per pod.
    pub fn list_for_tenant(
        &self,
        tenant_id: &TenantId,
        limit: Option<usize>,
    ) -> Result<Vec<UsageDaily>, SystemError> {
        let prefix = encode_prefix(&(tenant_id.as_str(),));
        let entries = self.store.scan_prefix_bytes(&prefix, limit)?;
        Ok(entries.into_iter().map(|(_, d)| d).collect())
    }

    /// Rollup history for one pod.
    pub fn list_for_pod(
        &self,
        tenant_id: &TenantId,
        pod_id: &PodId,
    ) -> Result<Vec<UsageDaily>, SystemError> {
        let prefix = encode_prefix(&(tenant_id.as_str(), pod_id.as_str()));
        let entries = self.store.scan_prefix_bytes(&prefix, None)?;
        Ok(entries.into_iter().map(|(_, d)| d).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use cloudpods_commons::now_millis;
    use cloudpods_store::test_utils::InMemoryBackend;

    fn create_test_provider() -> UsageDailyProvider {
        let backend: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
        UsageDailyProvider::new(backend)
    }

    fn test_daily(tenant: &str, pod: &str, date: NaiveDate, avg_cpu: f64) -> UsageDaily {
        UsageDaily {
            tenant_id: TenantId::new(tenant),
            pod_id: PodId::new(pod),
            date,
            avg_cpu_pct: avg_cpu,
            max_cpu_pct: avg_cpu * 2.0,
            avg_memory_mb: 512.0,
            disk_gb: 20.0,
            total_net_in_mb: 100.0,
            total_net_out_mb: 50.0,
            sample_count: 288,
            computed_at: now_millis(),
        }
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let provider = create_test_provider();
        let date = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();

        provider.upsert(test_daily("t1", "pod-1", date, 10.0)).unwrap();
        // Recompute with corrected numbers: replaces, never appends
        provider.upsert(test_daily("t1", "pod-1", date, 12.0)).unwrap();

        let rows = provider
            .list_for_pod(&TenantId::new("t1"), &PodId::new("pod-1"))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].avg_cpu_pct, 12.0);
    }

    #[test]
    fn test_list_for_tenant_scoped_and_date_ordered() {
        let provider = create_test_provider();
        let d1 = NaiveDate::from_ymd_opt(2026, 8, 23).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();

        provider.upsert(test_daily("t1", "pod-1", d2, 20.0)).unwrap();
        provider.upsert(test_daily("t1", "pod-1", d1, 10.0)).unwrap();
        provider.upsert(test_daily("t2", "pod-9", d1, 99.0)).unwrap();

        let rows = provider.list_for_tenant(&TenantId::new("t1"), None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, d1);
        assert_eq!(rows[1].date, d2);
    }

    #[test]
    fn test_get_rollup_by_key() {
        let provider = create_test_provider();
        let date = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        provider.upsert(test_daily("t1", "pod-1", date, 10.0)).unwrap();

        let key = RollupKey::new(TenantId::new("t1"), PodId::new("pod-1"), date);
        assert!(provider.get_rollup(&key).unwrap().is_some());

        let missing = RollupKey::new(TenantId::new("t1"), PodId::new("pod-2"), date);
        assert!(provider.get_rollup(&missing).unwrap().is_none());
    }
}
