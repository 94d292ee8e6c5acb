//! AppContext: central registry of all shared orchestration resources.
//!
//! Built once at startup (or per test) and shared as `Arc<AppContext>`.
//! Services and executors fetch dependencies through the getters instead of
//! storing them, keeping a single source of truth for shared state. Job
//! executors reach back into the context through `JobContext::app_ctx`, and
//! the worker coordinator holds a `Weak` reference so the graph stays
//! acyclic.

use crate::audit::AuditRecorder;
use crate::backup::BackupManager;
use crate::dns::DnsProvider;
use crate::health::HealthChecker;
use crate::hypervisor::HypervisorClient;
use crate::jobs::executors::{
    BackupRestoreExecutor, BackupRunExecutor, DeleteExecutor, DeliverWebhookExecutor,
    HealExecutor, ProvisionExecutor, ResumeExecutor, SuspendExecutor,
};
use crate::jobs::{JobRegistry, WorkerCoordinator};
use crate::lifecycle::LifecycleManager;
use crate::metering::{UsageRollup, UsageSampler};
use crate::resources::{DnsReconciler, SecurityGroupService, VolumeReconciler};
use crate::settings::SettingsService;
use crate::transport::DeliveryTransport;
use crate::webhooks::WebhookPublisher;
use cloudpods_configs::OrchestratorConfig;
use cloudpods_store::StorageBackend;
use cloudpods_system::SystemRegistry;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Central registry of all shared resources.
pub struct AppContext {
    /// Orchestrator configuration loaded once at startup.
    config: Arc<OrchestratorConfig>,

    // ===== Core Infrastructure =====
    storage_backend: Arc<dyn StorageBackend>,
    system: Arc<SystemRegistry>,
    settings: Arc<SettingsService>,

    // ===== Infrastructure Clients =====
    hypervisor: Arc<dyn HypervisorClient>,
    dns: Arc<dyn DnsProvider>,
    transport: Arc<dyn DeliveryTransport>,

    // ===== Job Execution =====
    job_registry: Arc<JobRegistry>,
    coordinator: Arc<WorkerCoordinator>,

    // ===== Managers =====
    audit: Arc<AuditRecorder>,
    webhooks: Arc<WebhookPublisher>,
    lifecycle: Arc<LifecycleManager>,
    volumes: Arc<VolumeReconciler>,
    dns_records: Arc<DnsReconciler>,
    security_groups: Arc<SecurityGroupService>,
    sampler: Arc<UsageSampler>,
    rollup: Arc<UsageRollup>,
    health: Arc<HealthChecker>,
    backups: Arc<BackupManager>,

    // ===== Server Start Time (for uptime calculation) =====
    server_start_time: Instant,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &"Arc<OrchestratorConfig>")
            .field("storage_backend", &"Arc<dyn StorageBackend>")
            .field("system", &"Arc<SystemRegistry>")
            .field("settings", &"Arc<SettingsService>")
            .field("hypervisor", &"Arc<dyn HypervisorClient>")
            .field("dns", &"Arc<dyn DnsProvider>")
            .field("transport", &"Arc<dyn DeliveryTransport>")
            .field("job_registry", &"Arc<JobRegistry>")
            .field("coordinator", &"Arc<WorkerCoordinator>")
            .field("audit", &"Arc<AuditRecorder>")
            .field("webhooks", &"Arc<WebhookPublisher>")
            .field("lifecycle", &"Arc<LifecycleManager>")
            .field("sampler", &"Arc<UsageSampler>")
            .field("rollup", &"Arc<UsageRollup>")
            .field("health", &"Arc<HealthChecker>")
            .field("backups", &"Arc<BackupManager>")
            .finish()
    }
}

impl AppContext {
    /// Build the full context and wire every manager together.
    ///
    /// Infrastructure clients are injected so the server can pass real
    /// implementations while tests pass mocks. The returned `Arc` is the
    /// only strong handle graph root; the coordinator is attached with a
    /// `Weak` back-reference after construction.
    pub fn init(
        storage_backend: Arc<dyn StorageBackend>,
        config: OrchestratorConfig,
        hypervisor: Arc<dyn HypervisorClient>,
        dns: Arc<dyn DnsProvider>,
        transport: Arc<dyn DeliveryTransport>,
    ) -> Arc<AppContext> {
        let config = Arc::new(config);

        log::debug!("Initializing system providers...");
        let system = Arc::new(SystemRegistry::new(storage_backend.clone()));

        let settings = Arc::new(SettingsService::new(system.settings(), Arc::clone(&config)));
        let audit = Arc::new(AuditRecorder::new(system.audit()));

        // Register every executor before the coordinator can claim anything
        let job_registry = Arc::new(JobRegistry::new());
        job_registry.register(Arc::new(ProvisionExecutor::new()));
        job_registry.register(Arc::new(SuspendExecutor::new()));
        job_registry.register(Arc::new(ResumeExecutor::new()));
        job_registry.register(Arc::new(DeleteExecutor::new()));
        job_registry.register(Arc::new(HealExecutor::new()));
        job_registry.register(Arc::new(BackupRunExecutor::new()));
        job_registry.register(Arc::new(BackupRestoreExecutor::new()));
        job_registry.register(Arc::new(DeliverWebhookExecutor::new()));

        let coordinator = Arc::new(WorkerCoordinator::new(
            Arc::clone(&config),
            system.jobs(),
            system.workers(),
            Arc::clone(&job_registry),
            Arc::clone(&settings),
            Arc::clone(&audit),
        ));

        let webhooks = Arc::new(WebhookPublisher::new(
            system.webhooks(),
            system.deliveries(),
            Arc::clone(&coordinator),
        ));

        let volumes = Arc::new(VolumeReconciler::new(
            system.volumes(),
            hypervisor.clone(),
        ));
        let dns_records = Arc::new(DnsReconciler::new(system.dns_records(), dns.clone()));
        let security_groups = Arc::new(SecurityGroupService::new(
            system.security_groups(),
            system.assignments(),
            system.pods(),
            Arc::clone(&webhooks),
            Arc::clone(&audit),
        ));

        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::clone(&system),
            Arc::clone(&coordinator),
            Arc::clone(&webhooks),
            Arc::clone(&audit),
            hypervisor.clone(),
            Arc::clone(&volumes),
            Arc::clone(&dns_records),
            Arc::clone(&security_groups),
            Arc::clone(&settings),
        ));

        let sampler = Arc::new(UsageSampler::new(
            system.pods(),
            system.usage_samples(),
            hypervisor.clone(),
        ));
        let rollup = Arc::new(UsageRollup::new(
            system.pods(),
            system.usage_samples(),
            system.usage_daily(),
            Arc::clone(&webhooks),
        ));

        let health = Arc::new(HealthChecker::new(
            system.pods(),
            system.health(),
            hypervisor.clone(),
            Arc::clone(&lifecycle),
        ));

        let backups = Arc::new(BackupManager::new(
            Arc::clone(&system),
            Arc::clone(&coordinator),
            Arc::clone(&webhooks),
            Arc::clone(&audit),
            hypervisor.clone(),
            Arc::clone(&settings),
        ));

        let app_ctx = Arc::new(AppContext {
            config,
            storage_backend,
            system,
            settings,
            hypervisor,
            dns,
            transport,
            job_registry,
            coordinator,
            audit,
            webhooks,
            lifecycle,
            volumes,
            dns_records,
            security_groups,
            sampler,
            rollup,
            health,
            backups,
            server_start_time: Instant::now(),
        });

        // Attach after construction so executors can reach back through the
        // context while the coordinator itself only holds a Weak edge
        app_ctx.coordinator.attach_app_context(&app_ctx);
        log::debug!(
            "AppContext initialized with {} job executors",
            app_ctx.job_registry.len()
        );

        app_ctx
    }

    // ===== Getters =====

    /// Get the orchestrator configuration.
    ///
    /// Loaded once during `AppContext::init()` and shared across all
    /// components.
    pub fn config(&self) -> &Arc<OrchestratorConfig> {
        &self.config
    }

    pub fn storage_backend(&self) -> Arc<dyn StorageBackend> {
        self.storage_backend.clone()
    }

    pub fn system(&self) -> Arc<SystemRegistry> {
        self.system.clone()
    }

    /// Get the settings service (tenant overrides over config defaults).
    pub fn settings(&self) -> Arc<SettingsService> {
        self.settings.clone()
    }

    pub fn hypervisor(&self) -> Arc<dyn HypervisorClient> {
        self.hypervisor.clone()
    }

    pub fn dns(&self) -> Arc<dyn DnsProvider> {
        self.dns.clone()
    }

    pub fn transport(&self) -> Arc<dyn DeliveryTransport> {
        self.transport.clone()
    }

    pub fn job_registry(&self) -> Arc<JobRegistry> {
        self.job_registry.clone()
    }

    pub fn coordinator(&self) -> Arc<WorkerCoordinator> {
        self.coordinator.clone()
    }

    pub fn audit(&self) -> Arc<AuditRecorder> {
        self.audit.clone()
    }

    pub fn webhooks(&self) -> Arc<WebhookPublisher> {
        self.webhooks.clone()
    }

    pub fn lifecycle(&self) -> Arc<LifecycleManager> {
        self.lifecycle.clone()
    }

    pub fn volumes(&self) -> Arc<VolumeReconciler> {
        self.volumes.clone()
    }

    pub fn dns_records(&self) -> Arc<DnsReconciler> {
        self.dns_records.clone()
    }

    pub fn security_groups(&self) -> Arc<SecurityGroupService> {
        self.security_groups.clone()
    }

    pub fn sampler(&self) -> Arc<UsageSampler> {
        self.sampler.clone()
    }

    pub fn rollup(&self) -> Arc<UsageRollup> {
        self.rollup.clone()
    }

    pub fn health(&self) -> Arc<HealthChecker> {
        self.health.clone()
    }

    pub fn backups(&self) -> Arc<BackupManager> {
        self.backups.clone()
    }

    /// Time elapsed since this context was built.
    pub fn uptime(&self) -> Duration {
        self.server_start_time.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use crate::test_helpers::test_app_context;
    use cloudpods_commons::models::JobKind;

    #[tokio::test]
    async fn test_init_registers_all_executors() {
        let app_ctx = test_app_context();
        assert_eq!(app_ctx.job_registry().len(), 8);
        for kind in [
            JobKind::Provision,
            JobKind::Suspend,
            JobKind::Resume,
            JobKind::Delete,
            JobKind::Heal,
            JobKind::BackupRun,
            JobKind::BackupRestore,
            JobKind::WebhookDeliver,
        ] {
            assert!(
                app_ctx.job_registry().contains(&kind),
                "missing executor for {}",
                kind
            );
        }
    }

    #[tokio::test]
    async fn test_coordinator_is_attached() {
        let app_ctx = test_app_context();
        // the attached context must be the same allocation
        let through = app_ctx.coordinator().app_context();
        assert!(std::sync::Arc::ptr_eq(&app_ctx, &through));
    }
}
