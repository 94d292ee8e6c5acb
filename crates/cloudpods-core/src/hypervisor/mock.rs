//! In-memory hypervisor used by tests and fleet-less deployments.

use super::{HypervisorClient, HypervisorError, InstanceSpec, InstanceUsage, SnapshotArtifact};
use async_trait::async_trait;
use cloudpods_commons::ids::prefixed_id;
use cloudpods_commons::InstanceId;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct MockInstance {
    plan_code: String,
    ip_address: String,
    running: bool,
    healthy: bool,
    volumes: Vec<String>,
    restored_from: Option<String>,
}

/// Scriptable in-memory hypervisor.
///
/// Behaves like a healthy fleet by default. Tests inject failures with
/// `fail_next` (the queued error is returned by the next call, whichever
/// operation that is) and flip instance health with `mark_unhealthy`.
/// A reboot restores health, which is what the heal path relies on.
pub struct MockHypervisor {
    instances: DashMap<InstanceId, MockInstance>,
    queued_failures: Mutex<VecDeque<HypervisorError>>,
    usage: Mutex<InstanceUsage>,
    allocations: AtomicU64,
    snapshots: AtomicU64,
    snapshot_size_mb: AtomicU64,
}

impl MockHypervisor {
    pub fn new() -> Self {
        Self {
            instances: DashMap::new(),
            queued_failures: Mutex::new(VecDeque::new()),
            usage: Mutex::new(InstanceUsage {
                cpu_pct: 10.0,
                memory_mb: 512.0,
                disk_gb: 8.0,
                net_in_mb: 1.0,
                net_out_mb: 1.0,
            }),
            allocations: AtomicU64::new(0),
            snapshots: AtomicU64::new(0),
            snapshot_size_mb: AtomicU64::new(2048),
        }
    }

    /// Queue an error for the next call, whichever operation it is.
    /// Multiple queued errors are consumed in order.
    pub fn fail_next(&self, error: HypervisorError) {
        if let Ok(mut queue) = self.queued_failures.lock() {
            queue.push_back(error);
        }
    }

    /// Make `ping` report the instance as down until the next reboot.
    pub fn mark_unhealthy(&self, instance_id: &InstanceId) {
        if let Some(mut instance) = self.instances.get_mut(instance_id) {
            instance.healthy = false;
        }
    }

    /// Fix the value every `sample` call reports.
    pub fn set_usage(&self, usage: InstanceUsage) {
        if let Ok(mut current) = self.usage.lock() {
            *current = usage;
        }
    }

    pub fn set_snapshot_size_mb(&self, size_mb: u64) {
        self.snapshot_size_mb.store(size_mb, Ordering::SeqCst);
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn has_instance(&self, instance_id: &InstanceId) -> bool {
        self.instances.contains_key(instance_id)
    }

    pub fn is_running(&self, instance_id: &InstanceId) -> bool {
        self.instances
            .get(instance_id)
            .map(|i| i.running)
            .unwrap_or(false)
    }

    pub fn attached_volumes(&self, instance_id: &InstanceId) -> Vec<String> {
        self.instances
            .get(instance_id)
            .map(|i| i.volumes.clone())
            .unwrap_or_default()
    }

    /// Artifact id the instance was last restored from, if any.
    pub fn restored_artifact(&self, instance_id: &InstanceId) -> Option<String> {
        self.instances
            .get(instance_id)
            .and_then(|i| i.restored_from.clone())
    }

    pub fn instance_ip(&self, instance_id: &InstanceId) -> Option<String> {
        self.instances
            .get(instance_id)
            .map(|i| i.ip_address.clone())
    }

    pub fn instance_plan(&self, instance_id: &InstanceId) -> Option<String> {
        self.instances
            .get(instance_id)
            .map(|i| i.plan_code.clone())
    }

    fn take_queued_failure(&self) -> Option<HypervisorError> {
        self.queued_failures
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
    }

    fn require(
        &self,
        instance_id: &InstanceId,
    ) -> Result<dashmap::mapref::one::RefMut<'_, InstanceId, MockInstance>, HypervisorError> {
        self.instances
            .get_mut(instance_id)
            .ok_or_else(|| HypervisorError::Rejected(format!("unknown instance {}", instance_id)))
    }
}

impl Default for MockHypervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockHypervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHypervisor")
            .field("instances", &self.instances.len())
            .finish()
    }
}

#[async_trait]
impl HypervisorClient for MockHypervisor {
    async fn allocate(&self, spec: &InstanceSpec) -> Result<(InstanceId, String), HypervisorError> {
        if let Some(err) = self.take_queued_failure() {
            return Err(err);
        }
        let n = self.allocations.fetch_add(1, Ordering::SeqCst);
        let instance_id = InstanceId::new(prefixed_id("IN"));
        let ip_address = format!("10.0.{}.{}", (n / 250) % 250, n % 250 + 1);
        self.instances.insert(
            instance_id.clone(),
            MockInstance {
                plan_code: spec.plan_code.clone(),
                ip_address: ip_address.clone(),
                running: true,
                healthy: true,
                volumes: Vec::new(),
                restored_from: None,
            },
        );
        Ok((instance_id, ip_address))
    }

    async fn start(&self, instance_id: &InstanceId) -> Result<(), HypervisorError> {
        if let Some(err) = self.take_queued_failure() {
            return Err(err);
        }
        let mut instance = self.require(instance_id)?;
        instance.running = true;
        Ok(())
    }

    async fn stop(&self, instance_id: &InstanceId) -> Result<(), HypervisorError> {
        if let Some(err) = self.take_queued_failure() {
            return Err(err);
        }
        let mut instance = self.require(instance_id)?;
        instance.running = false;
        Ok(())
    }

    async fn reboot(&self, instance_id: &InstanceId) -> Result<(), HypervisorError> {
        if let Some(err) = self.take_queued_failure() {
            return Err(err);
        }
        let mut instance = self.require(instance_id)?;
        instance.running = true;
        instance.healthy = true;
        Ok(())
    }

    async fn destroy(&self, instance_id: &InstanceId) -> Result<(), HypervisorError> {
        if let Some(err) = self.take_queued_failure() {
            return Err(err);
        }
        // Destroying an already-gone instance is a no-op, so teardown
        // retries stay idempotent.
        self.instances.remove(instance_id);
        Ok(())
    }

    async fn attach_volume(
        &self,
        instance_id: &InstanceId,
        volume_ref: &str,
    ) -> Result<(), HypervisorError> {
        if let Some(err) = self.take_queued_failure() {
            return Err(err);
        }
        let mut instance = self.require(instance_id)?;
        if !instance.volumes.iter().any(|v| v == volume_ref) {
            instance.volumes.push(volume_ref.to_string());
        }
        Ok(())
    }

    async fn detach_volume(
        &self,
        instance_id: &InstanceId,
        volume_ref: &str,
    ) -> Result<(), HypervisorError> {
        if let Some(err) = self.take_queued_failure() {
            return Err(err);
        }
        let mut instance = self.require(instance_id)?;
        instance.volumes.retain(|v| v != volume_ref);
        Ok(())
    }

    async fn ping(&self, instance_id: &InstanceId) -> Result<bool, HypervisorError> {
        if let Some(err) = self.take_queued_failure() {
            return Err(err);
        }
        let instance = self
            .instances
            .get(instance_id)
            .ok_or_else(|| HypervisorError::Rejected(format!("unknown instance {}", instance_id)))?;
        Ok(instance.running && instance.healthy)
    }

    async fn sample(&self, instance_id: &InstanceId) -> Result<InstanceUsage, HypervisorError> {
        if let Some(err) = self.take_queued_failure() {
            return Err(err);
        }
        if !self.instances.contains_key(instance_id) {
            return Err(HypervisorError::Rejected(format!(
                "unknown instance {}",
                instance_id
            )));
        }
        let usage = self
            .usage
            .lock()
            .map_err(|e| HypervisorError::Unavailable(format!("usage lock poisoned: {}", e)))?;
        Ok(*usage)
    }

    async fn snapshot(
        &self,
        instance_id: &InstanceId,
    ) -> Result<SnapshotArtifact, HypervisorError> {
        if let Some(err) = self.take_queued_failure() {
            return Err(err);
        }
        if !self.instances.contains_key(instance_id) {
            return Err(HypervisorError::Rejected(format!(
                "unknown instance {}",
                instance_id
            )));
        }
        let n = self.snapshots.fetch_add(1, Ordering::SeqCst);
        Ok(SnapshotArtifact {
            artifact_id: format!("snap-{}-{}", instance_id.as_str(), n),
            size_mb: self.snapshot_size_mb.load(Ordering::SeqCst),
        })
    }

    async fn restore(
        &self,
        instance_id: &InstanceId,
        artifact_id: &str,
    ) -> Result<(), HypervisorError> {
        if let Some(err) = self.take_queued_failure() {
            return Err(err);
        }
        let mut instance = self.require(instance_id)?;
        instance.restored_from = Some(artifact_id.to_string());
        Ok(())
    }
}
