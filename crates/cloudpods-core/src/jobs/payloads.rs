//! Typed payloads, one per job kind.
//!
//! Stored as JSON text on the job row; decoded and validated once per
//! attempt by the registry before dispatch.

use super::executor_trait::JobPayload;
use crate::error::CoreError;
use cloudpods_commons::{BackupPolicyId, BackupRunId, DeliveryId, PodId};
use serde::{Deserialize, Serialize};

fn require_non_empty(value: &str, field: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::Payload(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Payload for `provision` jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionPayload {
    pub pod_id: PodId,
    pub plan_code: String,
    /// Optional FQDN to register for the pod once an address is assigned.
    pub primary_domain: Option<String>,
}

impl JobPayload for ProvisionPayload {
    fn validate(&self) -> Result<(), CoreError> {
        require_non_empty(self.pod_id.as_str(), "pod_id")?;
        require_non_empty(&self.plan_code, "plan_code")?;
        if let Some(domain) = &self.primary_domain {
            require_non_empty(domain, "primary_domain")?;
        }
        Ok(())
    }
}

/// Payload for `suspend` jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspendPayload {
    pub pod_id: PodId,
}

impl JobPayload for SuspendPayload {
    fn validate(&self) -> Result<(), CoreError> {
        require_non_empty(self.pod_id.as_str(), "pod_id")
    }
}

/// Payload for `resume` jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    pub pod_id: PodId,
}

impl JobPayload for ResumePayload {
    fn validate(&self) -> Result<(), CoreError> {
        require_non_empty(self.pod_id.as_str(), "pod_id")
    }
}

/// Payload for `delete` jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletePayload {
    pub pod_id: PodId,
}

impl JobPayload for DeletePayload {
    fn validate(&self) -> Result<(), CoreError> {
        require_non_empty(self.pod_id.as_str(), "pod_id")
    }
}

/// Payload for `heal` jobs, enqueued by the health checker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealPayload {
    pub pod_id: PodId,
    /// Human-readable trigger, e.g. "3 consecutive failed health checks".
    pub reason: String,
    pub consecutive_failures: u32,
}

impl JobPayload for HealPayload {
    fn validate(&self) -> Result<(), CoreError> {
        require_non_empty(self.pod_id.as_str(), "pod_id")?;
        require_non_empty(&self.reason, "reason")
    }
}

/// Payload for `backup.run` jobs. The run row is created before the job is
/// enqueued so the executor can settle it even when the pod is gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRunPayload {
    pub policy_id: BackupPolicyId,
    pub run_id: BackupRunId,
}

impl JobPayload for BackupRunPayload {
    fn validate(&self) -> Result<(), CoreError> {
        require_non_empty(self.policy_id.as_str(), "policy_id")?;
        require_non_empty(self.run_id.as_str(), "run_id")
    }
}

/// Payload for `backup.restore` jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRestorePayload {
    pub run_id: BackupRunId,
}

impl JobPayload for BackupRestorePayload {
    fn validate(&self) -> Result<(), CoreError> {
        require_non_empty(self.run_id.as_str(), "run_id")
    }
}

/// Payload for `webhook.deliver` jobs. Everything else (body, endpoint,
/// attempt count) lives on the delivery row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverPayload {
    pub delivery_id: DeliveryId,
}

impl JobPayload for DeliverPayload {
    fn validate(&self) -> Result<(), CoreError> {
        require_non_empty(self.delivery_id.as_str(), "delivery_id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provision_payload_valid() {
        let payload = ProvisionPayload {
            pod_id: PodId::new("pod-1"),
            plan_code: "small".to_string(),
            primary_domain: Some("app.example.com".to_string()),
        };
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_provision_payload_rejects_empty_plan() {
        let payload = ProvisionPayload {
            pod_id: PodId::new("pod-1"),
            plan_code: "  ".to_string(),
            primary_domain: None,
        };
        let err = payload.validate().unwrap_err();
        assert!(err.to_string().contains("plan_code"));
    }

    #[test]
    fn test_heal_payload_requires_reason() {
        let payload = HealPayload {
            pod_id: PodId::new("pod-1"),
            reason: String::new(),
            consecutive_failures: 3,
        };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_payload_round_trip() {
        let payload = BackupRunPayload {
            policy_id: BackupPolicyId::new("BP-1"),
            run_id: BackupRunId::new("BR-1"),
        };
        let json = serde_json::to_string(&payload).unwrap();
        let decoded: BackupRunPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.policy_id.as_str(), "BP-1");
        assert_eq!(decoded.run_id.as_str(), "BR-1");
    }

    #[test]
    fn test_deliver_payload_rejects_empty_id() {
        let payload = DeliverPayload {
            delivery_id: DeliveryId::new(""),
        };
        assert!(payload.validate().is_err());
    }
}
