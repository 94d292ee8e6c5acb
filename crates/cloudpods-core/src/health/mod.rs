//! Periodic pod health checks.
//!
//! Each sweep pings every Active pod and folds the result into its stored
//! `HealthStatus`. Failures accumulate on the row; the heal policy itself
//! (threshold, enable flag, in-flight dedup) lives in the lifecycle manager,
//! which this checker consults after every failed probe.

use crate::error::Result;
use crate::hypervisor::HypervisorClient;
use crate::lifecycle::LifecycleManager;
use cloudpods_commons::models::{Pod, PodStatus};
use cloudpods_system::{HealthProvider, PodsProvider};
use std::sync::Arc;

pub struct HealthChecker {
    pods: Arc<PodsProvider>,
    health: Arc<HealthProvider>,
    hypervisor: Arc<dyn HypervisorClient>,
    lifecycle: Arc<LifecycleManager>,
}

impl HealthChecker {
    pub fn new(
        pods: Arc<PodsProvider>,
        health: Arc<HealthProvider>,
        hypervisor: Arc<dyn HypervisorClient>,
        lifecycle: Arc<LifecycleManager>,
    ) -> Self {
        Self {
            pods,
            health,
            hypervisor,
            lifecycle,
        }
    }

    /// Ping every Active pod once. Returns the number of pods swept.
    pub async fn check_active_pods(&self, now: i64) -> Result<usize> {
        let active = self.pods.list_by_status(PodStatus::Active)?;
        let swept = active.len();
        for pod in active {
            self.check_pod(&pod, now).await?;
        }
        Ok(swept)
    }

    async fn check_pod(&self, pod: &Pod, now: i64) -> Result<()> {
        let Some(instance_id) = &pod.instance_id else {
            // No handle to probe; the pod stays Unknown until it gets one
            log::debug!("Pod {} has no instance; health unknown", pod.pod_id);
            return Ok(());
        };

        let healthy = match self.hypervisor.ping(instance_id).await {
            Ok(healthy) => healthy,
            Err(e) => {
                // The probe itself could not run; record nothing and let the
                // row keep its last state
                log::warn!("Health probe for pod {} could not run: {}", pod.pod_id, e);
                return Ok(());
            }
        };

        let message = if healthy {
            None
        } else {
            Some(format!("Instance {} did not answer ping", instance_id))
        };
        let status = self.health.observe(&pod.pod_id, healthy, message, now)?;

        if !healthy {
            log::warn!(
                "Pod {} unhealthy ({} consecutive failures)",
                pod.pod_id,
                status.consecutive_failures
            );
            if let Some(job) = self
                .lifecycle
                .maybe_trigger_heal(pod, status.consecutive_failures)
                .await?
            {
                // Clear the streak so the next sweep does not re-trigger
                // while the heal job runs
                self.health.reset_failures(&pod.pod_id, now)?;
                log::info!("Heal job {} enqueued for pod {}", job.job_id, pod.pod_id);
            }
        }
        Ok(())
    }
}
