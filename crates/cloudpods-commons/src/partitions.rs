//! Storage partition registry.
//!
//! Single source of truth for every column family the system opens. The
//! database initializer ensures all of these exist at startup, and providers
//! reference them through this enum so a typo cannot create a stray
//! partition at runtime.

use crate::storage::Partition;

/// All partitions used by the orchestration core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoragePartition {
    /// Durable job queue rows
    Jobs,
    /// Worker registrations and heartbeats
    Workers,
    /// Pod rows
    Pods,
    /// Block volumes
    Volumes,
    /// DNS records
    DnsRecords,
    /// Security groups with embedded rules
    SecurityGroups,
    /// Pod-to-group assignment rows (join table)
    SecurityGroupAssignments,
    /// Raw usage samples
    UsageSamples,
    /// Daily usage rollups
    UsageDaily,
    /// Tenant webhook endpoints
    Webhooks,
    /// Webhook delivery attempts
    WebhookDeliveries,
    /// Audit chain records
    AuditEvents,
    /// Latest link per audit chain
    AuditChainHeads,
    /// Per-pod health state
    HealthStatus,
    /// Backup schedules
    BackupPolicies,
    /// Backup executions
    BackupRuns,
    /// Runtime setting overrides
    Settings,

    /// Claim ordering index: queue, status, priority, scheduled_at
    JobsQueueClaimIdx,
    /// Status + updated_at index for the reaper and retention sweeps
    JobsStatusUpdatedIdx,
    /// Pod to active-job index for idempotent heal triggers
    JobsPodIdx,
    /// Unique idempotency-key index
    JobsIdempotencyIdx,
    /// Tenant to pod index
    PodsTenantIdx,
    /// Status to pod index
    PodsStatusIdx,
    /// Pod to volume index
    VolumesPodIdx,
    /// Pod to DNS record index
    DnsRecordsPodIdx,
    /// Tenant to security group index
    SecurityGroupsTenantIdx,
    /// Group to pod reverse index over assignments
    AssignmentsGroupIdx,
    /// Tenant to webhook index for event fanout
    WebhooksTenantIdx,
    /// Status + next_retry_at index for the delivery retry sweep
    DeliveriesStatusRetryIdx,
    /// Webhook to delivery index for per-endpoint history
    DeliveriesWebhookIdx,
}

impl StoragePartition {
    /// Returns the partition (column family) name.
    pub fn name(&self) -> &'static str {
        match self {
            StoragePartition::Jobs => "jobs",
            StoragePartition::Workers => "workers",
            StoragePartition::Pods => "pods",
            StoragePartition::Volumes => "volumes",
            StoragePartition::DnsRecords => "dns_records",
            StoragePartition::SecurityGroups => "security_groups",
            StoragePartition::SecurityGroupAssignments => "security_group_assignments",
            StoragePartition::UsageSamples => "usage_samples",
            StoragePartition::UsageDaily => "usage_daily",
            StoragePartition::Webhooks => "webhooks",
            StoragePartition::WebhookDeliveries => "webhook_deliveries",
            StoragePartition::AuditEvents => "audit_events",
            StoragePartition::AuditChainHeads => "audit_chain_heads",
            StoragePartition::HealthStatus => "health_status",
            StoragePartition::BackupPolicies => "backup_policies",
            StoragePartition::BackupRuns => "backup_runs",
            StoragePartition::Settings => "settings",
            StoragePartition::JobsQueueClaimIdx => "jobs_queue_claim_idx",
            StoragePartition::JobsStatusUpdatedIdx => "jobs_status_updated_idx",
            StoragePartition::JobsPodIdx => "jobs_pod_idx",
            StoragePartition::JobsIdempotencyIdx => "jobs_idempotency_idx",
            StoragePartition::PodsTenantIdx => "pods_tenant_idx",
            StoragePartition::PodsStatusIdx => "pods_status_idx",
            StoragePartition::VolumesPodIdx => "volumes_pod_idx",
            StoragePartition::DnsRecordsPodIdx => "dns_records_pod_idx",
            StoragePartition::SecurityGroupsTenantIdx => "security_groups_tenant_idx",
            StoragePartition::AssignmentsGroupIdx => "security_group_assignments_group_idx",
            StoragePartition::WebhooksTenantIdx => "webhooks_tenant_idx",
            StoragePartition::DeliveriesStatusRetryIdx => "webhook_deliveries_status_retry_idx",
            StoragePartition::DeliveriesWebhookIdx => "webhook_deliveries_webhook_idx",
        }
    }

    /// Returns a `Partition` for this column family.
    pub fn partition(&self) -> Partition {
        Partition::new(self.name())
    }

    /// All partitions, in a stable order. The database initializer opens
    /// every one of these at startup.
    pub fn all() -> &'static [StoragePartition] {
        &[
            StoragePartition::Jobs,
            StoragePartition::Workers,
            StoragePartition::Pods,
            StoragePartition::Volumes,
            StoragePartition::DnsRecords,
            StoragePartition::SecurityGroups,
            StoragePartition::SecurityGroupAssignments,
            StoragePartition::UsageSamples,
            StoragePartition::UsageDaily,
            StoragePartition::Webhooks,
            StoragePartition::WebhookDeliveries,
            StoragePartition::AuditEvents,
            StoragePartition::AuditChainHeads,
            StoragePartition::HealthStatus,
            StoragePartition::BackupPolicies,
            StoragePartition::BackupRuns,
            StoragePartition::Settings,
            StoragePartition::JobsQueueClaimIdx,
            StoragePartition::JobsStatusUpdatedIdx,
            StoragePartition::JobsPodIdx,
            StoragePartition::JobsIdempotencyIdx,
            StoragePartition::PodsTenantIdx,
            StoragePartition::PodsStatusIdx,
            StoragePartition::VolumesPodIdx,
            StoragePartition::DnsRecordsPodIdx,
            StoragePartition::SecurityGroupsTenantIdx,
            StoragePartition::AssignmentsGroupIdx,
            StoragePartition::WebhooksTenantIdx,
            StoragePartition::DeliveriesStatusRetryIdx,
            StoragePartition::DeliveriesWebhookIdx,
        ]
    }
}

impl std::fmt::Display for StoragePartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique() {
        let mut seen = HashSet::new();
        for p in StoragePartition::all() {
            assert!(seen.insert(p.name()), "duplicate partition name: {}", p.name());
        }
    }

    #[test]
    fn test_all_covers_every_partition() {
        assert_eq!(StoragePartition::all().len(), 30);
        assert!(StoragePartition::all().contains(&StoragePartition::Jobs));
        assert!(StoragePartition::all().contains(&StoragePartition::AuditChainHeads));
        assert!(StoragePartition::all().contains(&StoragePartition::DeliveriesStatusRetryIdx));
    }

    #[test]
    fn test_partition_matches_name() {
        assert_eq!(StoragePartition::Pods.partition().name(), "pods");
        assert_eq!(StoragePartition::Pods.to_string(), "pods");
    }
}
