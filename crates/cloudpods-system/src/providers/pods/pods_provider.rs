//! Pods provider: lifecycle state machine over the pods table.
//!
//! All status changes go through `transition()`, which validates the edge
//! against the lifecycle graph before writing. An illegal edge is rejected
//! with `SystemError::InvalidTransition` and the row is left untouched; the
//! caller records the rejection in the audit trail.

use super::pods_indexes::{
    create_pods_indexes, pod_status_to_u8, tenant_prefix, STATUS_INDEX, TENANT_INDEX,
};
use crate::error::SystemError;
use cloudpods_commons::models::{Pod, PodStatus};
use cloudpods_commons::{InstanceId, PodId, StoragePartition, TenantId};
use cloudpods_store::entity_store::EntityStore;
use cloudpods_store::{IndexedEntityStore, StorageBackend};
use std::sync::Arc;

/// Type alias for the indexed pods store
pub type PodsStore = IndexedEntityStore<PodId, Pod>;

pub struct PodsProvider {
    store: PodsStore,
}

impl std::fmt::Debug for PodsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PodsProvider").finish()
    }
}

impl PodsProvider {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let store = IndexedEntityStore::new(
            backend,
            StoragePartition::Pods.name(),
            create_pods_indexes(),
        );
        Self { store }
    }

    fn load_pod(&self, pod_id: &PodId) -> Result<Pod, SystemError> {
        self.store
            .get(pod_id)?
            .ok_or_else(|| SystemError::NotFound(format!("Pod not found: {}", pod_id)))
    }

    pub fn create_pod(&self, pod: Pod) -> Result<Pod, SystemError> {
        if self.store.get(&pod.pod_id)?.is_some() {
            return Err(SystemError::AlreadyExists(format!(
                "Pod already exists: {}",
                pod.pod_id
            )));
        }
        self.store.insert(&pod.pod_id, &pod)?;
        log::info!(
            "Created pod {} for tenant {} (plan={}, template={})",
            pod.pod_id,
            pod.tenant_id,
            pod.plan_code,
            pod.template
        );
        Ok(pod)
    }

    pub fn get_pod(&self, pod_id: &PodId) -> Result<Option<Pod>, SystemError> {
        Ok(self.store.get(pod_id)?)
    }

    /// Apply a lifecycle transition.
    ///
    /// Rejects an illegal edge with `InvalidTransition` before any write; the
    /// stored row keeps its previous status and `updated_at`.
    pub fn transition(&self, pod_id: &PodId, to: PodStatus, now: i64) -> Result<Pod, SystemError> {
        let pod = self.load_pod(pod_id)?;

        if !pod.status.can_transition_to(to) {
            return Err(SystemError::InvalidTransition {
                resource: pod_id.to_string(),
                from: pod.status.to_string(),
                to: to.to_string(),
            });
        }

        let updated = pod.clone().with_status(to, now);
        self.store.update_with_old(pod_id, Some(&pod), &updated)?;
        log::info!("Pod {} transitioned {} -> {}", pod_id, pod.status, to);
        Ok(updated)
    }

    /// Record the hypervisor handle once allocation succeeds.
    pub fn set_instance(
        &self,
        pod_id: &PodId,
        instance_id: InstanceId,
        ip_address: String,
        now: i64,
    ) -> Result<Pod, SystemError> {
        let pod = self.load_pod(pod_id)?;
        let mut updated = pod.clone();
        updated.instance_id = Some(instance_id);
        updated.ip_address = Some(ip_address);
        updated.updated_at = now;
        self.store.update_with_old(pod_id, Some(&pod), &updated)?;
        Ok(updated)
    }

    pub fn list_by_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Pod>, SystemError> {
        let prefix = tenant_prefix(tenant_id);
        let entries = self.store.scan_by_index(TENANT_INDEX, Some(&prefix), None)?;
        Ok(entries.into_iter().map(|(_, pod)| pod).collect())
    }

    pub fn list_by_status(&self, status: PodStatus) -> Result<Vec<Pod>, SystemError> {
        let prefix = [pod_status_to_u8(status)];
        let entries = self.store.scan_by_index(STATUS_INDEX, Some(&prefix), None)?;
        Ok(entries.into_iter().map(|(_, pod)| pod).collect())
    }

    /// Every pod row regardless of status. Used by sweeps that must not
    /// miss suspended or failed pods, like the daily usage rollup.
    pub fn list_all(&self) -> Result<Vec<Pod>, SystemError> {
        let entries = self.store.scan_all(None, None, None)?;
        Ok(entries.into_iter().map(|(_, pod)| pod).collect())
    }

    /// Remove the pod row. Only called at the end of the deletion flow, after
    /// attached resources are gone.
    pub fn delete_pod(&self, pod_id: &PodId) -> Result<(), SystemError> {
        self.store.delete(pod_id)?;
        log::info!("Deleted pod {}", pod_id);
        Ok(())
    }

    // ========================================================================
    // Async wrappers
    // ========================================================================

    /// Async version of `get_pod()`.
    ///
    /// Uses `spawn_blocking` internally to avoid blocking the async runtime.
    pub async fn get_pod_async(self: &Arc<Self>, pod_id: PodId) -> Result<Option<Pod>, SystemError> {
        let provider = Arc::clone(self);
        tokio::task::spawn_blocking(move || provider.get_pod(&pod_id))
            .await
            .map_err(|e| SystemError::Other(format!("spawn_blocking error: {}", e)))?
    }

    /// Async version of `transition()`.
    pub async fn transition_async(
        self: &Arc<Self>,
        pod_id: PodId,
        to: PodStatus,
        now: i64,
    ) -> Result<Pod, SystemError> {
        let provider = Arc::clone(self);
        tokio::task::spawn_blocking(move || provider.transition(&pod_id, to, now))
            .await
            .map_err(|e| SystemError::Other(format!("spawn_blocking error: {}", e)))?
    }

    /// Async version of `list_by_status()`.
    pub async fn list_by_status_async(
        self: &Arc<Self>,
        status: PodStatus,
    ) -> Result<Vec<Pod>, SystemError> {
        let provider = Arc::clone(self);
        tokio::task::spawn_blocking(move || provider.list_by_status(status))
            .await
            .map_err(|e| SystemError::Other(format!("spawn_blocking error: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudpods_commons::now_millis;
    use cloudpods_store::test_utils::InMemoryBackend;

    fn create_test_provider() -> PodsProvider {
        let backend: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
        PodsProvider::new(backend)
    }

    fn test_pod(id: &str, tenant: &str) -> Pod {
        let now = now_millis();
        Pod {
            pod_id: PodId::new(id),
            tenant_id: TenantId::new(tenant),
            plan_code: "small".to_string(),
            template: "debian-12".to_string(),
            status: PodStatus::Pending,
            instance_id: None,
            ip_address: None,
            primary_domain: Some("example.test".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_create_and_get() {
        let provider = create_test_provider();
        provider.create_pod(test_pod("pod-1", "t1")).unwrap();

        let pod = provider.get_pod(&PodId::new("pod-1")).unwrap().unwrap();
        assert_eq!(pod.status, PodStatus::Pending);
    }

    #[test]
    fn test_create_duplicate_rejected() {
        let provider = create_test_provider();
        provider.create_pod(test_pod("pod-1", "t1")).unwrap();

        let err = provider.create_pod(test_pod("pod-1", "t1")).unwrap_err();
        assert!(matches!(err, SystemError::AlreadyExists(_)));
    }

    #[test]
    fn test_legal_transition_chain() {
        let provider = create_test_provider();
        let pod_id = PodId::new("pod-1");
        provider.create_pod(test_pod("pod-1", "t1")).unwrap();
        let now = now_millis();

        provider.transition(&pod_id, PodStatus::Provisioning, now).unwrap();
        provider.transition(&pod_id, PodStatus::Active, now + 1).unwrap();
        provider.transition(&pod_id, PodStatus::Suspended, now + 2).unwrap();
        let resumed = provider.transition(&pod_id, PodStatus::Active, now + 3).unwrap();

        assert_eq!(resumed.status, PodStatus::Active);
        assert_eq!(resumed.updated_at, now + 3);
    }

    #[test]
    fn test_illegal_transition_leaves_row_untouched() {
        let provider = create_test_provider();
        let pod_id = PodId::new("pod-1");
        provider.create_pod(test_pod("pod-1", "t1")).unwrap();
        let before = provider.get_pod(&pod_id).unwrap().unwrap();

        let err = provider
            .transition(&pod_id, PodStatus::Active, now_millis() + 10_000)
            .unwrap_err();
        match err {
            SystemError::InvalidTransition { resource, from, to } => {
                assert_eq!(resource, "pod-1");
                assert_eq!(from, "pending");
                assert_eq!(to, "active");
            }
            other => panic!("expected InvalidTransition, got {:?}", other),
        }

        let after = provider.get_pod(&pod_id).unwrap().unwrap();
        assert_eq!(after, before);
    }

    #[test]
    fn test_list_by_tenant_scoped() {
        let provider = create_test_provider();
        provider.create_pod(test_pod("pod-1", "t1")).unwrap();
        provider.create_pod(test_pod("pod-2", "t1")).unwrap();
        provider.create_pod(test_pod("pod-3", "t10")).unwrap();

        let t1_pods = provider.list_by_tenant(&TenantId::new("t1")).unwrap();
        assert_eq!(t1_pods.len(), 2);

        let t10_pods = provider.list_by_tenant(&TenantId::new("t10")).unwrap();
        assert_eq!(t10_pods.len(), 1);
    }

    #[test]
    fn test_list_by_status_follows_transitions() {
        let provider = create_test_provider();
        let now = now_millis();
        provider.create_pod(test_pod("pod-1", "t1")).unwrap();
        provider.create_pod(test_pod("pod-2", "t1")).unwrap();

        provider
            .transition(&PodId::new("pod-1"), PodStatus::Provisioning, now)
            .unwrap();
        provider
            .transition(&PodId::new("pod-1"), PodStatus::Active, now + 1)
            .unwrap();

        let active = provider.list_by_status(PodStatus::Active).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].pod_id.as_str(), "pod-1");

        let pending = provider.list_by_status(PodStatus::Pending).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].pod_id.as_str(), "pod-2");
    }

    #[test]
    fn test_list_all_spans_statuses() {
        let provider = create_test_provider();
        let now = now_millis();
        provider.create_pod(test_pod("pod-1", "t1")).unwrap();
        provider.create_pod(test_pod("pod-2", "t2")).unwrap();
        provider
            .transition(&PodId::new("pod-1"), PodStatus::Provisioning, now)
            .unwrap();

        let all = provider.list_all().unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_set_instance_records_handle() {
        let provider = create_test_provider();
        let pod_id = PodId::new("pod-1");
        provider.create_pod(test_pod("pod-1", "t1")).unwrap();

        let updated = provider
            .set_instance(
                &pod_id,
                InstanceId::new("i-abc123"),
                "203.0.113.7".to_string(),
                now_millis(),
            )
            .unwrap();
        assert_eq!(updated.instance_id, Some(InstanceId::new("i-abc123")));
        assert_eq!(updated.ip_address.as_deref(), Some("203.0.113.7"));
    }
}
