//! Pod model and its lifecycle state machine.

use crate::ids::{InstanceId, PodId, TenantId};
use crate::serialization::Storable;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pod lifecycle status.
///
/// Legal transitions:
/// `pending → provisioning → active`; `active ⇄ suspended`;
/// `active|suspended|failed → deleting`; any non-terminal step `→ failed`;
/// `failed → provisioning` (operator retry / re-provision).
/// `deleting` ends with row removal. Anything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum PodStatus {
    Pending,
    Provisioning,
    Active,
    Suspended,
    Deleting,
    Failed,
}

impl PodStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PodStatus::Pending => "pending",
            PodStatus::Provisioning => "provisioning",
            PodStatus::Active => "active",
            PodStatus::Suspended => "suspended",
            PodStatus::Deleting => "deleting",
            PodStatus::Failed => "failed",
        }
    }

    /// Whether the edge `self → to` is legal in the lifecycle graph.
    pub fn can_transition_to(&self, to: PodStatus) -> bool {
        use PodStatus::*;
        match (self, to) {
            (Pending, Provisioning) => true,
            (Provisioning, Active) => true,
            (Active, Suspended) => true,
            (Suspended, Active) => true,
            (Active, Deleting) | (Suspended, Deleting) | (Failed, Deleting) => true,
            // Re-provision after operator intervention or auto-heal escalation
            (Failed, Provisioning) => true,
            // Any non-terminal step may fail with a recorded error
            (Pending, Failed) | (Provisioning, Failed) | (Active, Failed) | (Suspended, Failed) => {
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for PodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A provisioned virtualized compute instance: one tenant's purchased
/// compute unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Pod {
    pub pod_id: PodId,
    pub tenant_id: TenantId,
    /// Billing plan code, e.g. "small", "dedicated-8".
    pub plan_code: String,
    /// OS/image template the instance was created from.
    pub template: String,
    pub status: PodStatus,
    /// Hypervisor-side handle, set once allocation succeeds.
    pub instance_id: Option<InstanceId>,
    pub ip_address: Option<String>,
    /// Primary domain requested at provisioning, if any.
    pub primary_domain: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Pod {
    /// Apply a validated status transition, stamping `updated_at`.
    pub fn with_status(mut self, status: PodStatus, now: i64) -> Pod {
        self.status = status;
        self.updated_at = now;
        self
    }
}

// Storable implementations for EntityStore support
impl Storable for Pod {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisioning_path() {
        assert!(PodStatus::Pending.can_transition_to(PodStatus::Provisioning));
        assert!(PodStatus::Provisioning.can_transition_to(PodStatus::Active));
    }

    #[test]
    fn test_suspend_cycle() {
        assert!(PodStatus::Active.can_transition_to(PodStatus::Suspended));
        assert!(PodStatus::Suspended.can_transition_to(PodStatus::Active));
    }

    #[test]
    fn test_deletion_sources() {
        assert!(PodStatus::Active.can_transition_to(PodStatus::Deleting));
        assert!(PodStatus::Suspended.can_transition_to(PodStatus::Deleting));
        assert!(PodStatus::Failed.can_transition_to(PodStatus::Deleting));
        assert!(!PodStatus::Pending.can_transition_to(PodStatus::Deleting));
    }

    #[test]
    fn test_illegal_edges_rejected() {
        assert!(!PodStatus::Deleting.can_transition_to(PodStatus::Active));
        assert!(!PodStatus::Pending.can_transition_to(PodStatus::Active));
        assert!(!PodStatus::Suspended.can_transition_to(PodStatus::Provisioning));
        assert!(!PodStatus::Deleting.can_transition_to(PodStatus::Failed));
    }

    #[test]
    fn test_failed_retry_edge() {
        assert!(PodStatus::Failed.can_transition_to(PodStatus::Provisioning));
    }
}
