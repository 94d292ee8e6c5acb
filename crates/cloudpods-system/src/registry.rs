//! System Tables Registry
//!
//! Centralized registry for all system table providers. The core layer holds
//! one of these instead of sixteen individual provider fields.

use crate::providers::{
    AssignmentsProvider, AuditProvider, BackupPoliciesProvider, BackupRunsProvider,
    DeliveriesProvider, DnsRecordsProvider, HealthProvider, JobsProvider, PodsProvider,
    SecurityGroupsProvider, SettingsProvider, UsageDailyProvider, UsageSamplesProvider,
    VolumesProvider, WebhooksProvider, WorkersProvider,
};
use cloudpods_store::StorageBackend;
use std::sync::Arc;

/// Registry of all system table providers
///
/// Provides centralized access to every persisted table. Constructed once at
/// startup from the storage backend and shared through the app context.
#[derive(Debug)]
pub struct SystemRegistry {
    // ===== Job queue and workers =====
    jobs: Arc<JobsProvider>,
    workers: Arc<WorkersProvider>,

    // ===== Pods and attached resources =====
    pods: Arc<PodsProvider>,
    volumes: Arc<VolumesProvider>,
    dns_records: Arc<DnsRecordsProvider>,
    security_groups: Arc<SecurityGroupsProvider>,
    assignments: Arc<AssignmentsProvider>,

    // ===== Usage metering =====
    usage_samples: Arc<UsageSamplesProvider>,
    usage_daily: Arc<UsageDailyProvider>,

    // ===== Webhooks =====
    webhooks: Arc<WebhooksProvider>,
    deliveries: Arc<DeliveriesProvider>,

    // ===== Audit, health, backups =====
    audit: Arc<AuditProvider>,
    health: Arc<HealthProvider>,
    backup_policies: Arc<BackupPoliciesProvider>,
    backup_runs: Arc<BackupRunsProvider>,

    // ===== Runtime settings =====
    settings: Arc<SettingsProvider>,
}

impl SystemRegistry {
    /// Create a new system registry
    ///
    /// Initializes all providers from the storage backend. Every provider
    /// shares the same backend; partitions keep their data apart.
    pub fn new(storage_backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            jobs: Arc::new(JobsProvider::new(storage_backend.clone())),
            workers: Arc::new(WorkersProvider::new(storage_backend.clone())),
            pods: Arc::new(PodsProvider::new(storage_backend.clone())),
            volumes: Arc::new(VolumesProvider::new(storage_backend.clone())),
            dns_records: Arc::new(DnsRecordsProvider::new(storage_backend.clone())),
            security_groups: Arc::new(SecurityGroupsProvider::new(storage_backend.clone())),
            assignments: Arc::new(AssignmentsProvider::new(storage_backend.clone())),
            usage_samples: Arc::new(UsageSamplesProvider::new(storage_backend.clone())),
            usage_daily: Arc::new(UsageDailyProvider::new(storage_backend.clone())),
            webhooks: Arc::new(WebhooksProvider::new(storage_backend.clone())),
            deliveries: Arc::new(DeliveriesProvider::new(storage_backend.clone())),
            audit: Arc::new(AuditProvider::new(storage_backend.clone())),
            health: Arc::new(HealthProvider::new(storage_backend.clone())),
            backup_policies: Arc::new(BackupPoliciesProvider::new(storage_backend.clone())),
            backup_runs: Arc::new(BackupRunsProvider::new(storage_backend.clone())),
            settings: Arc::new(SettingsProvider::new(storage_backend)),
        }
    }

    // ===== Getter Methods =====

    /// Get the jobs provider
    pub fn jobs(&self) -> Arc<JobsProvider> {
        self.jobs.clone()
    }

    /// Get the workers provider
    pub fn workers(&self) -> Arc<WorkersProvider> {
        self.workers.clone()
    }

    /// Get the pods provider
    pub fn pods(&self) -> Arc<PodsProvider> {
        self.pods.clone()
    }

    /// Get the volumes provider
    pub fn volumes(&self) -> Arc<VolumesProvider> {
        self.volumes.clone()
    }

    /// Get the dns_records provider
    pub fn dns_records(&self) -> Arc<DnsRecordsProvider> {
        self.dns_records.clone()
    }

    /// Get the security_groups provider
    pub fn security_groups(&self) -> Arc<SecurityGroupsProvider> {
        self.security_groups.clone()
    }

    /// Get the security group assignments provider
    pub fn assignments(&self) -> Arc<AssignmentsProvider> {
        self.assignments.clone()
    }

    /// Get the usage_samples provider
    pub fn usage_samples(&self) -> Arc<UsageSamplesProvider> {
        self.usage_samples.clone()
    }

    /// Get the usage_daily provider
    pub fn usage_daily(&self) -> Arc<UsageDailyProvider> {
        self.usage_daily.clone()
    }

    /// Get the webhooks provider
    pub fn webhooks(&self) -> Arc<WebhooksProvider> {
        self.webhooks.clone()
    }

    /// Get the webhook deliveries provider
    pub fn deliveries(&self) -> Arc<DeliveriesProvider> {
        self.deliveries.clone()
    }

    /// Get the audit provider
    pub fn audit(&self) -> Arc<AuditProvider> {
        self.audit.clone()
    }

    /// Get the health provider
    pub fn health(&self) -> Arc<HealthProvider> {
        self.health.clone()
    }

    /// Get the backup_policies provider
    pub fn backup_policies(&self) -> Arc<BackupPoliciesProvider> {
        self.backup_policies.clone()
    }

    /// Get the backup_runs provider
    pub fn backup_runs(&self) -> Arc<BackupRunsProvider> {
        self.backup_runs.clone()
    }

    /// Get the settings provider
    pub fn settings(&self) -> Arc<SettingsProvider> {
        self.settings.clone()
    }
}
