//! Periodic usage sampling.

use crate::error::Result;
use crate::hypervisor::HypervisorClient;
use cloudpods_commons::models::{PodStatus, UsageSample};
use cloudpods_system::{PodsProvider, UsageSamplesProvider};
use std::sync::Arc;

/// Reads hypervisor counters for every Active pod and stores one sample
/// per pod per tick.
///
/// A pod whose read fails is logged and skipped; the next tick covers it.
/// Sampling never goes through the job queue, so there is no retry state
/// to manage.
pub struct UsageSampler {
    pods: Arc<PodsProvider>,
    samples: Arc<UsageSamplesProvider>,
    hypervisor: Arc<dyn HypervisorClient>,
}

impl UsageSampler {
    pub fn new(
        pods: Arc<PodsProvider>,
        samples: Arc<UsageSamplesProvider>,
        hypervisor: Arc<dyn HypervisorClient>,
    ) -> Self {
        Self {
            pods,
            samples,
            hypervisor,
        }
    }

    /// Record one sample per Active pod at `now`. Returns how many samples
    /// were written; the tick's readings go in as one atomic batch.
    pub async fn sample_active_pods(&self, now: i64) -> Result<usize> {
        let active = self.pods.list_by_status(PodStatus::Active)?;
        let mut batch = Vec::with_capacity(active.len());

        for pod in active {
            let Some(instance_id) = &pod.instance_id else {
                log::debug!(
                    "Pod {} is active without an instance; not sampled",
                    pod.pod_id
                );
                continue;
            };
            match self.hypervisor.sample(instance_id).await {
                Ok(usage) => batch.push(UsageSample {
                    tenant_id: pod.tenant_id.clone(),
                    pod_id: pod.pod_id.clone(),
                    sampled_at: now,
                    cpu_pct: usage.cpu_pct,
                    memory_mb: usage.memory_mb,
                    disk_gb: usage.disk_gb,
                    net_in_mb: usage.net_in_mb,
                    net_out_mb: usage.net_out_mb,
                }),
                Err(e) => {
                    log::warn!(
                        "Sampling pod {} (instance {}) failed: {}; skipping until next tick",
                        pod.pod_id,
                        instance_id,
                        e
                    );
                }
            }
        }

        let written = batch.len();
        if written > 0 {
            self.samples.insert_samples(batch)?;
            log::debug!("Sampler tick wrote {} samples", written);
        }
        Ok(written)
    }
}
