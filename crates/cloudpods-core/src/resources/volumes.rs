//! Volume reconciliation.
//!
//! Provisioning steps run with "ensure" semantics: a retry re-runs against
//! whatever rows a previous attempt left behind instead of creating
//! duplicates. Failures land on the volume row itself (`status` +
//! `last_error`) so a stuck provisioning pod points at the resource that
//! broke it.

use crate::error::{CoreError, Result};
use crate::hypervisor::HypervisorClient;
use cloudpods_commons::ids::prefixed_id;
use cloudpods_commons::models::{Pod, ResourceStatus, Volume};
use cloudpods_commons::{now_millis, PodId, VolumeId};
use cloudpods_system::VolumesProvider;
use std::sync::Arc;

pub struct VolumeReconciler {
    volumes: Arc<VolumesProvider>,
    hypervisor: Arc<dyn HypervisorClient>,
}

impl VolumeReconciler {
    pub fn new(volumes: Arc<VolumesProvider>, hypervisor: Arc<dyn HypervisorClient>) -> Self {
        Self { volumes, hypervisor }
    }

    /// Ensure the pod's root volume exists, is attached, and is active.
    ///
    /// Reuses the row a previous attempt created; a volume that failed to
    /// attach is re-attached, not duplicated. On hypervisor failure the row
    /// is marked failed with the error before the error propagates.
    pub async fn ensure_root_volume(&self, pod: &Pod, size_gb: u32) -> Result<Volume> {
        let instance_id = pod.instance_id.as_ref().ok_or_else(|| {
            CoreError::InvalidOperation(format!("Pod {} has no instance", pod.pod_id))
        })?;

        let existing = self.volumes.list_by_pod(&pod.pod_id)?;
        let volume = match existing.into_iter().next() {
            Some(volume) => volume,
            None => {
                let now = now_millis();
                self.volumes.create_volume(Volume {
                    volume_id: VolumeId::new(prefixed_id("VL")),
                    pod_id: pod.pod_id.clone(),
                    size_gb,
                    status: ResourceStatus::Creating,
                    last_error: None,
                    created_at: now,
                    updated_at: now,
                })?
            }
        };
        if volume.status == ResourceStatus::Active {
            return Ok(volume);
        }

        match self
            .hypervisor
            .attach_volume(instance_id, volume.volume_id.as_str())
            .await
        {
            Ok(()) => {
                let active = self.volumes.set_status(
                    &volume.volume_id,
                    ResourceStatus::Active,
                    None,
                    now_millis(),
                )?;
                log::info!("Volume {} active for pod {}", active.volume_id, pod.pod_id);
                Ok(active)
            }
            Err(e) => {
                self.volumes.set_status(
                    &volume.volume_id,
                    ResourceStatus::Failed,
                    Some(e.to_string()),
                    now_millis(),
                )?;
                Err(e.into())
            }
        }
    }

    /// Detach and delete every volume the pod owns. Returns the number of
    /// rows removed.
    ///
    /// A detach the hypervisor rejects (instance already gone) is treated as
    /// done so deletion converges; a transient detach failure propagates and
    /// the delete job retries.
    pub async fn teardown_for_pod(&self, pod: &Pod) -> Result<usize> {
        let volumes = self.volumes.list_by_pod(&pod.pod_id)?;
        let mut removed = 0;
        for volume in volumes {
            if let Some(instance_id) = pod.instance_id.as_ref() {
                match self
                    .hypervisor
                    .detach_volume(instance_id, volume.volume_id.as_str())
                    .await
                {
                    Ok(()) => {}
                    Err(e) if e.is_transient() => return Err(e.into()),
                    Err(e) => {
                        log::warn!(
                            "Detach of volume {} rejected ({}); dropping row anyway",
                            volume.volume_id,
                            e
                        );
                    }
                }
            }
            self.volumes.delete_volume(&volume.volume_id)?;
            removed += 1;
        }
        if removed > 0 {
            log::info!("Removed {} volume(s) for pod {}", removed, pod.pod_id);
        }
        Ok(removed)
    }

    pub fn list_for_pod(&self, pod_id: &PodId) -> Result<Vec<Volume>> {
        Ok(self.volumes.list_by_pod(pod_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypervisor::{HypervisorError, InstanceSpec, MockHypervisor};
    use cloudpods_commons::models::PodStatus;
    use cloudpods_commons::{InstanceId, TenantId};
    use cloudpods_store::test_utils::InMemoryBackend;
    use cloudpods_store::StorageBackend;

    async fn fixture() -> (VolumeReconciler, Arc<MockHypervisor>, Pod) {
        let backend: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
        let provider = Arc::new(VolumesProvider::new(backend));
        let hypervisor = Arc::new(MockHypervisor::new());
        let (instance_id, ip) = hypervisor
            .allocate(&InstanceSpec {
                tenant_id: TenantId::new("t1"),
                plan_code: "small".to_string(),
                template: "debian-12".to_string(),
            })
            .await
            .unwrap();
        let now = now_millis();
        let pod = Pod {
            pod_id: PodId::new("pod-1"),
            tenant_id: TenantId::new("t1"),
            plan_code: "small".to_string(),
            template: "debian-12".to_string(),
            status: PodStatus::Provisioning,
            instance_id: Some(instance_id),
            ip_address: Some(ip),
            primary_domain: None,
            created_at: now,
            updated_at: now,
        };
        let reconciler = VolumeReconciler::new(provider, hypervisor.clone());
        (reconciler, hypervisor, pod)
    }

    #[tokio::test]
    async fn test_ensure_creates_attaches_and_activates() {
        let (reconciler, hypervisor, pod) = fixture().await;

        let volume = reconciler.ensure_root_volume(&pod, 20).await.unwrap();
        assert_eq!(volume.status, ResourceStatus::Active);
        assert_eq!(volume.size_gb, 20);
        let instance_id = pod.instance_id.clone().unwrap();
        assert_eq!(
            hypervisor.attached_volumes(&instance_id),
            vec![volume.volume_id.as_str().to_string()]
        );
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let (reconciler, _, pod) = fixture().await;

        let first = reconciler.ensure_root_volume(&pod, 20).await.unwrap();
        let second = reconciler.ensure_root_volume(&pod, 20).await.unwrap();
        assert_eq!(first.volume_id, second.volume_id);
        assert_eq!(reconciler.list_for_pod(&pod.pod_id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_attach_marks_row_and_retry_reuses_it() {
        let (reconciler, hypervisor, pod) = fixture().await;
        hypervisor.fail_next(HypervisorError::Unavailable("host busy".to_string()));

        let err = reconciler.ensure_root_volume(&pod, 20).await.unwrap_err();
        assert!(err.is_transient());

        let rows = reconciler.list_for_pod(&pod.pod_id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, ResourceStatus::Failed);
        assert!(rows[0].last_error.as_deref().unwrap().contains("host busy"));

        // Retry picks up the same row and completes the attach
        let volume = reconciler.ensure_root_volume(&pod, 20).await.unwrap();
        assert_eq!(volume.volume_id, rows[0].volume_id);
        assert_eq!(volume.status, ResourceStatus::Active);
    }

    #[tokio::test]
    async fn test_ensure_requires_instance() {
        let (reconciler, _, mut pod) = fixture().await;
        pod.instance_id = None;

        let err = reconciler.ensure_root_volume(&pod, 20).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_teardown_detaches_and_deletes() {
        let (reconciler, hypervisor, pod) = fixture().await;
        reconciler.ensure_root_volume(&pod, 20).await.unwrap();

        let removed = reconciler.teardown_for_pod(&pod).await.unwrap();
        assert_eq!(removed, 1);
        assert!(reconciler.list_for_pod(&pod.pod_id).unwrap().is_empty());
        let instance_id = pod.instance_id.clone().unwrap();
        assert!(hypervisor.attached_volumes(&instance_id).is_empty());
    }

    #[tokio::test]
    async fn test_teardown_tolerates_missing_instance() {
        let (reconciler, _, mut pod) = fixture().await;
        reconciler.ensure_root_volume(&pod, 20).await.unwrap();

        // Instance already destroyed by the time teardown runs
        pod.instance_id = Some(InstanceId::new("IN-000000000000"));
        let removed = reconciler.teardown_for_pod(&pod).await.unwrap();
        assert_eq!(removed, 1);
        assert!(reconciler.list_for_pod(&pod.pod_id).unwrap().is_empty());
    }
}
