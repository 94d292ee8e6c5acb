//! Hypervisor client abstraction.
//!
//! The orchestrator drives compute instances through `HypervisorClient`.
//! Production wiring plugs a real transport in behind the trait; this crate
//! ships `MockHypervisor` for tests and for deployments that run the control
//! plane without a fleet attached.
//!
//! Errors carry their retry class: `Unavailable` means the host or API could
//! not be reached and the operation is worth retrying; `Rejected` means the
//! request itself was refused and retrying the same call cannot succeed.

pub mod mock;

pub use mock::MockHypervisor;

use async_trait::async_trait;
use cloudpods_commons::{InstanceId, TenantId};
use thiserror::Error;

/// Failure classes for hypervisor calls.
#[derive(Error, Debug)]
pub enum HypervisorError {
    /// Host or API unreachable. Transient; retry later.
    #[error("hypervisor unavailable: {0}")]
    Unavailable(String),

    /// Request refused (bad plan, missing instance, quota). Permanent.
    #[error("hypervisor rejected request: {0}")]
    Rejected(String),
}

impl HypervisorError {
    pub fn is_transient(&self) -> bool {
        matches!(self, HypervisorError::Unavailable(_))
    }
}

/// Instance shape requested at allocation time.
#[derive(Debug, Clone)]
pub struct InstanceSpec {
    pub tenant_id: TenantId,
    pub plan_code: String,
    pub template: String,
}

/// Point-in-time resource usage reported for one instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceUsage {
    pub cpu_pct: f64,
    pub memory_mb: f64,
    /// Gauge, not a counter: current disk footprint.
    pub disk_gb: f64,
    pub net_in_mb: f64,
    pub net_out_mb: f64,
}

/// Result of a snapshot call: artifact handle plus its size in MB.
#[derive(Debug, Clone)]
pub struct SnapshotArtifact {
    pub artifact_id: String,
    pub size_mb: u64,
}

/// Compute fleet operations used by the lifecycle, health, metering and
/// backup paths.
#[async_trait]
pub trait HypervisorClient: Send + Sync {
    /// Allocate a new instance and return its id with the assigned address.
    async fn allocate(&self, spec: &InstanceSpec) -> Result<(InstanceId, String), HypervisorError>;

    async fn start(&self, instance_id: &InstanceId) -> Result<(), HypervisorError>;

    async fn stop(&self, instance_id: &InstanceId) -> Result<(), HypervisorError>;

    async fn reboot(&self, instance_id: &InstanceId) -> Result<(), HypervisorError>;

    async fn destroy(&self, instance_id: &InstanceId) -> Result<(), HypervisorError>;

    async fn attach_volume(
        &self,
        instance_id: &InstanceId,
        volume_ref: &str,
    ) -> Result<(), HypervisorError>;

    async fn detach_volume(
        &self,
        instance_id: &InstanceId,
        volume_ref: &str,
    ) -> Result<(), HypervisorError>;

    /// Liveness probe. `Ok(false)` means the instance exists but does not
    /// answer; `Err` means the probe itself could not run.
    async fn ping(&self, instance_id: &InstanceId) -> Result<bool, HypervisorError>;

    /// Read current resource usage for metering.
    async fn sample(&self, instance_id: &InstanceId) -> Result<InstanceUsage, HypervisorError>;

    /// Snapshot the instance's disk for a backup run.
    async fn snapshot(&self, instance_id: &InstanceId)
        -> Result<SnapshotArtifact, HypervisorError>;

    /// Restore the instance's disk from an earlier snapshot artifact.
    async fn restore(
        &self,
        instance_id: &InstanceId,
        artifact_id: &str,
    ) -> Result<(), HypervisorError>;
}
