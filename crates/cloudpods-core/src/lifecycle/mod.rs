//! Pod lifecycle management.
//!
//! Every pod state change flows through here. The request methods are the
//! API surface: they validate the requested edge against the pod's current
//! status, refuse to stack a second lifecycle job on a pod, and enqueue the
//! governing job. The `execute_*` methods are the job side: they run the
//! infrastructure steps and report a `JobOutcome` the coordinator settles
//! the job row with.
//!
//! Provisioning is a resumable pipeline: allocate the instance, attach the
//! root volume, register DNS, assign the default security group, activate.
//! Each step is idempotent against rows an earlier attempt wrote, so a
//! retried job continues where the last one stopped, and a failing step
//! names itself in the job error while the sub-resource row carries the
//! detail. The pod stays `provisioning` across retries; only exhaustion of
//! the job's retry budget moves it to `failed`, via `on_job_exhausted`.

use crate::audit::AuditRecorder;
use crate::error::{CoreError, Result};
use crate::hypervisor::{HypervisorClient, InstanceSpec};
use crate::jobs::executor_trait::{JobContext, JobOutcome};
use crate::jobs::payloads::{
    DeletePayload, HealPayload, ProvisionPayload, ResumePayload, SuspendPayload,
};
use crate::jobs::WorkerCoordinator;
use crate::resources::{DnsReconciler, SecurityGroupService, VolumeReconciler};
use crate::settings::SettingsService;
use crate::webhooks::WebhookPublisher;
use cloudpods_commons::ids::prefixed_id;
use cloudpods_commons::models::{EventType, Job, JobKind, JobOptions, Pod, PodStatus};
use cloudpods_commons::{now_millis, PodId, TenantId};
use cloudpods_system::{SystemError, SystemRegistry};
use serde_json::json;
use std::sync::Arc;

/// Root volume size attached to every pod during provisioning. Plans shape
/// the instance itself; storage beyond the root volume is attached later
/// through the volume API.
const ROOT_VOLUME_GB: u32 = 20;

/// Request to create a pod.
#[derive(Debug, Clone)]
pub struct NewPodRequest {
    pub tenant_id: TenantId,
    pub plan_code: String,
    pub template: String,
    /// FQDN to register once the pod has an address.
    pub primary_domain: Option<String>,
}

pub struct LifecycleManager {
    system: Arc<SystemRegistry>,
    coordinator: Arc<WorkerCoordinator>,
    webhooks: Arc<WebhookPublisher>,
    audit: Arc<AuditRecorder>,
    hypervisor: Arc<dyn HypervisorClient>,
    volumes: Arc<VolumeReconciler>,
    dns_records: Arc<DnsReconciler>,
    security_groups: Arc<SecurityGroupService>,
    settings: Arc<SettingsService>,
}

impl LifecycleManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        system: Arc<SystemRegistry>,
        coordinator: Arc<WorkerCoordinator>,
        webhooks: Arc<WebhookPublisher>,
        audit: Arc<AuditRecorder>,
        hypervisor: Arc<dyn HypervisorClient>,
        volumes: Arc<VolumeReconciler>,
        dns_records: Arc<DnsReconciler>,
        security_groups: Arc<SecurityGroupService>,
        settings: Arc<SettingsService>,
    ) -> Self {
        Self {
            system,
            coordinator,
            webhooks,
            audit,
            hypervisor,
            volumes,
            dns_records,
            security_groups,
            settings,
        }
    }

    // ===== Request surface =====

    /// Create the pod row and enqueue its provisioning job.
    ///
    /// The pod is durably `pending` before the job exists; provisioning
    /// starts when a worker claims the job.
    pub async fn create_pod(&self, request: NewPodRequest) -> Result<(Pod, Job)> {
        let now = now_millis();
        let pod = self.system.pods().create_pod(Pod {
            pod_id: PodId::new(prefixed_id("PD")),
            tenant_id: request.tenant_id,
            plan_code: request.plan_code,
            template: request.template,
            status: PodStatus::Pending,
            instance_id: None,
            ip_address: None,
            primary_domain: request.primary_domain,
            created_at: now,
            updated_at: now,
        })?;

        let payload = ProvisionPayload {
            pod_id: pod.pod_id.clone(),
            plan_code: pod.plan_code.clone(),
            primary_domain: pod.primary_domain.clone(),
        };
        let job = self
            .coordinator
            .enqueue_typed(
                JobKind::Provision,
                pod.tenant_id.clone(),
                Some(pod.pod_id.clone()),
                &payload,
                Some(lifecycle_options(JobKind::Provision, &pod.pod_id)),
            )
            .await?;

        self.audit.record_system(
            &pod.tenant_id,
            "pod.created",
            "pod",
            pod.pod_id.as_str(),
            Some(json!({
                "plan": pod.plan_code,
                "template": pod.template,
                "job_id": job.job_id.as_str(),
            })),
        )?;
        log::info!(
            "Pod {} created for tenant {} (provision job {})",
            pod.pod_id,
            pod.tenant_id,
            job.job_id
        );
        Ok((pod, job))
    }

    pub fn get_pod(&self, pod_id: &PodId) -> Result<Pod> {
        self.require_pod(pod_id)
    }

    pub fn list_pods(&self, tenant_id: &TenantId) -> Result<Vec<Pod>> {
        Ok(self.system.pods().list_by_tenant(tenant_id)?)
    }

    /// Enqueue a suspend job for an active pod.
    pub async fn request_suspend(&self, pod_id: &PodId) -> Result<Job> {
        let pod = self.require_pod(pod_id)?;
        if !pod.status.can_transition_to(PodStatus::Suspended) {
            return Err(self.reject_transition(&pod, PodStatus::Suspended));
        }
        self.ensure_no_inflight(pod_id).await?;

        let payload = SuspendPayload {
            pod_id: pod_id.clone(),
        };
        let job = self
            .coordinator
            .enqueue_typed(
                JobKind::Suspend,
                pod.tenant_id.clone(),
                Some(pod_id.clone()),
                &payload,
                Some(lifecycle_options(JobKind::Suspend, pod_id)),
            )
            .await?;
        self.audit.record_system(
            &pod.tenant_id,
            "pod.suspend_requested",
            "pod",
            pod_id.as_str(),
            Some(json!({"job_id": job.job_id.as_str()})),
        )?;
        Ok(job)
    }

    /// Enqueue a resume job for a suspended pod.
    pub async fn request_resume(&self, pod_id: &PodId) -> Result<Job> {
        let pod = self.require_pod(pod_id)?;
        if pod.status != PodStatus::Suspended {
            return Err(self.reject_transition(&pod, PodStatus::Active));
        }
        self.ensure_no_inflight(pod_id).await?;

        let payload = ResumePayload {
            pod_id: pod_id.clone(),
        };
        let job = self
            .coordinator
            .enqueue_typed(
                JobKind::Resume,
                pod.tenant_id.clone(),
                Some(pod_id.clone()),
                &payload,
                Some(lifecycle_options(JobKind::Resume, pod_id)),
            )
            .await?;
        self.audit.record_system(
            &pod.tenant_id,
            "pod.resume_requested",
            "pod",
            pod_id.as_str(),
            Some(json!({"job_id": job.job_id.as_str()})),
        )?;
        Ok(job)
    }

    /// Move the pod to `deleting` and enqueue the teardown job.
    ///
    /// Re-requesting deletion of a pod already `deleting` enqueues a fresh
    /// job (deduplicated against one still in flight), so a delete whose
    /// job exhausted its budget can be kicked again.
    pub async fn request_delete(&self, pod_id: &PodId) -> Result<Job> {
        let pod = self.require_pod(pod_id)?;

        if pod.status != PodStatus::Deleting {
            if !pod.status.can_transition_to(PodStatus::Deleting) {
                return Err(self.reject_transition(&pod, PodStatus::Deleting));
            }
            self.ensure_no_inflight(pod_id).await?;
            self.transition_pod(pod_id, PodStatus::Deleting)?;
        }

        let payload = DeletePayload {
            pod_id: pod_id.clone(),
        };
        let job = self
            .coordinator
            .enqueue_typed(
                JobKind::Delete,
                pod.tenant_id.clone(),
                Some(pod_id.clone()),
                &payload,
                Some(lifecycle_options(JobKind::Delete, pod_id)),
            )
            .await?;
        self.audit.record_system(
            &pod.tenant_id,
            "pod.delete_requested",
            "pod",
            pod_id.as_str(),
            Some(json!({"job_id": job.job_id.as_str()})),
        )?;
        Ok(job)
    }

    /// Enqueue a fresh provisioning run for a failed pod.
    pub async fn request_reprovision(&self, pod_id: &PodId) -> Result<Job> {
        let pod = self.require_pod(pod_id)?;
        if pod.status != PodStatus::Failed {
            return Err(self.reject_transition(&pod, PodStatus::Provisioning));
        }
        self.ensure_no_inflight(pod_id).await?;

        let payload = ProvisionPayload {
            pod_id: pod_id.clone(),
            plan_code: pod.plan_code.clone(),
            primary_domain: pod.primary_domain.clone(),
        };
        let job = self
            .coordinator
            .enqueue_typed(
                JobKind::Provision,
                pod.tenant_id.clone(),
                Some(pod_id.clone()),
                &payload,
                Some(lifecycle_options(JobKind::Provision, pod_id)),
            )
            .await?;
        self.audit.record_system(
            &pod.tenant_id,
            "pod.reprovision_requested",
            "pod",
            pod_id.as_str(),
            Some(json!({"job_id": job.job_id.as_str()})),
        )?;
        Ok(job)
    }

    /// Enqueue a heal job for a pod failing its health checks.
    ///
    /// Applies the tenant's auto-heal settings, requires the failure streak
    /// to reach the threshold, and refuses to stack on a pod that already
    /// has a lifecycle job in flight. Returns the job, or `None` when no
    /// action was taken.
    pub async fn maybe_trigger_heal(
        &self,
        pod: &Pod,
        consecutive_failures: u32,
    ) -> Result<Option<Job>> {
        let tenant = Some(&pod.tenant_id);
        if !self.settings.auto_heal_enabled(tenant) {
            return Ok(None);
        }
        if consecutive_failures < self.settings.auto_heal_failure_threshold(tenant) {
            return Ok(None);
        }
        if pod.status != PodStatus::Active {
            return Ok(None);
        }
        if self
            .coordinator
            .find_inflight_lifecycle_job(&pod.pod_id)
            .await?
            .is_some()
        {
            return Ok(None);
        }

        let reason = format!("{} consecutive failed health checks", consecutive_failures);
        let payload = HealPayload {
            pod_id: pod.pod_id.clone(),
            reason: reason.clone(),
            consecutive_failures,
        };
        let job = self
            .coordinator
            .enqueue_typed(
                JobKind::Heal,
                pod.tenant_id.clone(),
                Some(pod.pod_id.clone()),
                &payload,
                Some(lifecycle_options(JobKind::Heal, &pod.pod_id)),
            )
            .await?;
        self.audit.record_system(
            &pod.tenant_id,
            "pod.heal_triggered",
            "pod",
            pod.pod_id.as_str(),
            Some(json!({"reason": reason, "job_id": job.job_id.as_str()})),
        )?;
        log::warn!("Auto-heal triggered for pod {} ({})", pod.pod_id, reason);
        Ok(Some(job))
    }

    // ===== Executor surface =====

    /// Run one provisioning attempt.
    ///
    /// Steps an earlier attempt completed are skipped; the first failing
    /// step decides the outcome and names itself in the error.
    pub async fn execute_provision(
        &self,
        ctx: &JobContext<ProvisionPayload>,
    ) -> Result<JobOutcome> {
        let payload = ctx.payload();
        let Some(pod) = self.system.pods().get_pod(&payload.pod_id)? else {
            return Ok(JobOutcome::Fatal {
                error: format!("Pod {} no longer exists", payload.pod_id),
            });
        };

        let pod = match pod.status {
            PodStatus::Provisioning => pod,
            PodStatus::Pending | PodStatus::Failed => {
                match self.transition_pod(&pod.pod_id, PodStatus::Provisioning) {
                    Ok(pod) => pod,
                    Err(e) => return Ok(JobOutcome::from_step_error("enter_provisioning", e)),
                }
            }
            other => {
                return Ok(JobOutcome::Fatal {
                    error: format!("Pod {} is {}; cannot provision", pod.pod_id, other),
                })
            }
        };

        // Allocate the instance unless an earlier attempt already did
        let pod = if pod.instance_id.is_none() {
            let spec = InstanceSpec {
                tenant_id: pod.tenant_id.clone(),
                plan_code: payload.plan_code.clone(),
                template: pod.template.clone(),
            };
            match self.hypervisor.allocate(&spec).await {
                Ok((instance_id, ip_address)) => {
                    ctx.log_info(&format!(
                        "Allocated instance {} at {}",
                        instance_id, ip_address
                    ));
                    self.system
                        .pods()
                        .set_instance(&pod.pod_id, instance_id, ip_address, now_millis())?
                }
                Err(e) => return Ok(JobOutcome::from_step_error("allocate", e.into())),
            }
        } else {
            pod
        };

        if let Err(e) = self.volumes.ensure_root_volume(&pod, ROOT_VOLUME_GB).await {
            return Ok(JobOutcome::from_step_error("volumes", e));
        }

        let domain = pod
            .primary_domain
            .clone()
            .or_else(|| payload.primary_domain.clone());
        if let Some(domain) = domain {
            let Some(ip) = pod.ip_address.clone() else {
                return Ok(JobOutcome::Fatal {
                    error: format!("Pod {} has an instance but no address", pod.pod_id),
                });
            };
            if let Err(e) = self.dns_records.ensure_record(&pod, &domain, &ip).await {
                return Ok(JobOutcome::from_step_error("dns", e));
            }
        }

        if let Err(e) = self.security_groups.ensure_default_assigned(&pod).await {
            return Ok(JobOutcome::from_step_error("security_group", e));
        }

        let pod = match self.transition_pod(&pod.pod_id, PodStatus::Active) {
            Ok(pod) => pod,
            Err(e) => return Ok(JobOutcome::from_step_error("activate", e)),
        };

        self.webhooks
            .publish(
                &pod.tenant_id,
                EventType::PodProvisioned,
                json!({
                    "podId": pod.pod_id.as_str(),
                    "instanceId": pod.instance_id.as_ref().map(|i| i.as_str()),
                    "ipAddress": pod.ip_address,
                    "primaryDomain": pod.primary_domain,
                }),
            )
            .await?;
        self.audit.record_system(
            &pod.tenant_id,
            "pod.provisioned",
            "pod",
            pod.pod_id.as_str(),
            Some(json!({
                "instance_id": pod.instance_id.as_ref().map(|i| i.as_str()),
                "job_id": ctx.job_id.as_str(),
            })),
        )?;

        Ok(JobOutcome::Completed {
            message: Some(format!("Pod {} active", pod.pod_id)),
        })
    }

    /// Stop the pod's instance and move it to `suspended`.
    pub async fn execute_suspend(&self, ctx: &JobContext<SuspendPayload>) -> Result<JobOutcome> {
        let pod_id = &ctx.payload().pod_id;
        let Some(pod) = self.system.pods().get_pod(pod_id)? else {
            return Ok(JobOutcome::Fatal {
                error: format!("Pod {} no longer exists", pod_id),
            });
        };
        match pod.status {
            PodStatus::Active => {}
            PodStatus::Suspended => {
                // An earlier attempt finished before the job row settled
                return Ok(JobOutcome::Completed {
                    message: Some(format!("Pod {} already suspended", pod_id)),
                });
            }
            other => {
                return Ok(JobOutcome::Fatal {
                    error: format!("Pod {} is {}; only active pods suspend", pod_id, other),
                })
            }
        }
        let Some(instance_id) = pod.instance_id.clone() else {
            return Ok(JobOutcome::Fatal {
                error: format!("Pod {} has no instance", pod_id),
            });
        };

        if let Err(e) = self.hypervisor.stop(&instance_id).await {
            return Ok(JobOutcome::from_step_error("stop", e.into()));
        }
        let pod = match self.transition_pod(pod_id, PodStatus::Suspended) {
            Ok(pod) => pod,
            Err(e) => return Ok(JobOutcome::from_error(e)),
        };

        self.webhooks
            .publish(
                &pod.tenant_id,
                EventType::PodSuspended,
                json!({"podId": pod.pod_id.as_str()}),
            )
            .await?;
        self.audit.record_system(
            &pod.tenant_id,
            "pod.suspended",
            "pod",
            pod.pod_id.as_str(),
            None,
        )?;
        Ok(JobOutcome::Completed {
            message: Some(format!("Pod {} suspended", pod.pod_id)),
        })
    }

    /// Start the pod's instance and move it back to `active`.
    pub async fn execute_resume(&self, ctx: &JobContext<ResumePayload>) -> Result<JobOutcome> {
        let pod_id = &ctx.payload().pod_id;
        let Some(pod) = self.system.pods().get_pod(pod_id)? else {
            return Ok(JobOutcome::Fatal {
                error: format!("Pod {} no longer exists", pod_id),
            });
        };
        match pod.status {
            PodStatus::Suspended => {}
            PodStatus::Active => {
                return Ok(JobOutcome::Completed {
                    message: Some(format!("Pod {} already active", pod_id)),
                });
            }
            other => {
                return Ok(JobOutcome::Fatal {
                    error: format!("Pod {} is {}; only suspended pods resume", pod_id, other),
                })
            }
        }
        let Some(instance_id) = pod.instance_id.clone() else {
            return Ok(JobOutcome::Fatal {
                error: format!("Pod {} has no instance", pod_id),
            });
        };

        if let Err(e) = self.hypervisor.start(&instance_id).await {
            return Ok(JobOutcome::from_step_error("start", e.into()));
        }
        let pod = match self.transition_pod(pod_id, PodStatus::Active) {
            Ok(pod) => pod,
            Err(e) => return Ok(JobOutcome::from_error(e)),
        };

        self.webhooks
            .publish(
                &pod.tenant_id,
                EventType::PodResumed,
                json!({"podId": pod.pod_id.as_str()}),
            )
            .await?;
        self.audit.record_system(
            &pod.tenant_id,
            "pod.resumed",
            "pod",
            pod.pod_id.as_str(),
            None,
        )?;
        Ok(JobOutcome::Completed {
            message: Some(format!("Pod {} resumed", pod.pod_id)),
        })
    }

    /// Tear the pod down in reverse provisioning order and remove its row.
    pub async fn execute_delete(&self, ctx: &JobContext<DeletePayload>) -> Result<JobOutcome> {
        let pod_id = &ctx.payload().pod_id;
        let Some(pod) = self.system.pods().get_pod(pod_id)? else {
            // Crash after row removal leaves a retried job behind
            return Ok(JobOutcome::Completed {
                message: Some(format!("Pod {} already deleted", pod_id)),
            });
        };
        let pod = if pod.status == PodStatus::Deleting {
            pod
        } else {
            match self.transition_pod(pod_id, PodStatus::Deleting) {
                Ok(pod) => pod,
                Err(e) => return Ok(JobOutcome::from_error(e)),
            }
        };

        if let Err(e) = self.dns_records.remove_all_for_pod(&pod.pod_id).await {
            return Ok(JobOutcome::from_step_error("dns", e));
        }
        if let Err(e) = self.volumes.teardown_for_pod(&pod).await {
            return Ok(JobOutcome::from_step_error("volumes", e));
        }
        if let Err(e) = self.security_groups.clear_assignments_for_pod(&pod.pod_id) {
            return Ok(JobOutcome::from_step_error("security_group", e));
        }
        if let Some(instance_id) = pod.instance_id.clone() {
            // Destroying an already-gone instance is a no-op at the client
            if let Err(e) = self.hypervisor.destroy(&instance_id).await {
                return Ok(JobOutcome::from_step_error("destroy", e.into()));
            }
        }
        self.system.backup_policies().delete_all_for_pod(&pod.pod_id)?;
        self.system.backup_runs().delete_all_for_pod(&pod.pod_id)?;
        self.system.health().delete_status(&pod.pod_id)?;
        self.system.pods().delete_pod(&pod.pod_id)?;

        self.webhooks
            .publish(
                &pod.tenant_id,
                EventType::PodDeleted,
                json!({"podId": pod.pod_id.as_str()}),
            )
            .await?;
        self.audit.record_system(
            &pod.tenant_id,
            "pod.deleted",
            "pod",
            pod.pod_id.as_str(),
            None,
        )?;
        Ok(JobOutcome::Completed {
            message: Some(format!("Pod {} deleted", pod.pod_id)),
        })
    }

    /// Reboot an unhealthy instance and confirm it comes back.
    ///
    /// A pod that recovered on its own, changed status, or disappeared is a
    /// completed no-op; this job is enqueued from health sweeps and must
    /// tolerate the world moving under it.
    pub async fn execute_heal(&self, ctx: &JobContext<HealPayload>) -> Result<JobOutcome> {
        let payload = ctx.payload();
        let pod_id = &payload.pod_id;
        let Some(pod) = self.system.pods().get_pod(pod_id)? else {
            return Ok(JobOutcome::Completed {
                message: Some(format!("Pod {} no longer exists; nothing to heal", pod_id)),
            });
        };
        if pod.status != PodStatus::Active {
            return Ok(JobOutcome::Completed {
                message: Some(format!(
                    "Pod {} is {}; heal applies to active pods",
                    pod_id, pod.status
                )),
            });
        }
        let Some(instance_id) = pod.instance_id.clone() else {
            return Ok(JobOutcome::Fatal {
                error: format!("Pod {} has no instance", pod_id),
            });
        };

        match self.hypervisor.ping(&instance_id).await {
            Ok(true) => {
                return Ok(JobOutcome::Completed {
                    message: Some(format!(
                        "Instance {} is healthy; no reboot needed",
                        instance_id
                    )),
                });
            }
            Ok(false) => {}
            Err(e) => return Ok(JobOutcome::from_step_error("ping", e.into())),
        }

        ctx.log_warn(&format!(
            "Rebooting instance {} ({})",
            instance_id, payload.reason
        ));
        if let Err(e) = self.hypervisor.reboot(&instance_id).await {
            return Ok(JobOutcome::from_step_error("reboot", e.into()));
        }
        match self.hypervisor.ping(&instance_id).await {
            Ok(true) => {}
            Ok(false) => {
                return Ok(JobOutcome::Retry {
                    error: format!("Instance {} still unhealthy after reboot", instance_id),
                });
            }
            Err(e) => return Ok(JobOutcome::from_step_error("ping", e.into())),
        }

        self.system.health().observe(
            &pod.pod_id,
            true,
            Some("recovered by heal".to_string()),
            now_millis(),
        )?;
        self.webhooks
            .publish(
                &pod.tenant_id,
                EventType::PodHealed,
                json!({
                    "podId": pod.pod_id.as_str(),
                    "reason": payload.reason,
                }),
            )
            .await?;
        self.audit.record_system(
            &pod.tenant_id,
            "pod.healed",
            "pod",
            pod.pod_id.as_str(),
            Some(json!({"reason": payload.reason})),
        )?;
        Ok(JobOutcome::Completed {
            message: Some(format!("Instance {} rebooted and healthy", instance_id)),
        })
    }

    // ===== Exhaustion =====

    /// Settle a pod whose governing job ran out of retries.
    ///
    /// Lifecycle kinds promote the pod to `failed` when that edge is legal.
    /// A pod stuck `deleting` keeps its status; re-requesting deletion
    /// enqueues a fresh job. Other kinds settle their own rows and are
    /// ignored here.
    pub async fn on_job_exhausted(&self, job: &Job, error: &str) -> Result<()> {
        if !matches!(
            job.kind,
            JobKind::Provision
                | JobKind::Suspend
                | JobKind::Resume
                | JobKind::Delete
                | JobKind::Heal
        ) {
            return Ok(());
        }
        let Some(pod_id) = job.pod_id.clone() else {
            return Ok(());
        };
        let Some(pod) = self.system.pods().get_pod(&pod_id)? else {
            return Ok(());
        };
        if !pod.status.can_transition_to(PodStatus::Failed) {
            log::warn!(
                "Job {} exhausted but pod {} stays {}",
                job.job_id,
                pod_id,
                pod.status
            );
            return Ok(());
        }

        let pod = self.transition_pod(&pod_id, PodStatus::Failed)?;
        self.webhooks
            .publish(
                &pod.tenant_id,
                EventType::PodFailed,
                json!({
                    "podId": pod.pod_id.as_str(),
                    "jobId": job.job_id.as_str(),
                    "reason": error,
                }),
            )
            .await?;
        self.audit.record_system(
            &pod.tenant_id,
            "pod.failed",
            "pod",
            pod.pod_id.as_str(),
            Some(json!({
                "job_id": job.job_id.as_str(),
                "kind": job.kind.as_str(),
                "error": error,
            })),
        )?;
        log::error!(
            "Pod {} marked failed after job {} exhausted its retries",
            pod.pod_id,
            job.job_id
        );
        Ok(())
    }

    // ===== Helpers =====

    fn require_pod(&self, pod_id: &PodId) -> Result<Pod> {
        self.system
            .pods()
            .get_pod(pod_id)?
            .ok_or_else(|| CoreError::NotFound(format!("Pod not found: {}", pod_id)))
    }

    async fn ensure_no_inflight(&self, pod_id: &PodId) -> Result<()> {
        if let Some(job) = self.coordinator.find_inflight_lifecycle_job(pod_id).await? {
            return Err(CoreError::Conflict(format!(
                "Pod {} already has a {} job in flight ({})",
                pod_id, job.kind, job.job_id
            )));
        }
        Ok(())
    }

    /// Apply a transition through the provider, auditing a rejection.
    /// The provider validates the edge before any write, so a rejected
    /// transition leaves the row byte-identical.
    fn transition_pod(&self, pod_id: &PodId, to: PodStatus) -> Result<Pod> {
        match self.system.pods().transition(pod_id, to, now_millis()) {
            Ok(pod) => Ok(pod),
            Err(SystemError::InvalidTransition { .. }) => {
                let pod = self.require_pod(pod_id)?;
                Err(self.reject_transition(&pod, to))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Record a rejected transition on the tenant's audit chain and build
    /// the error for the caller. The pod row is never touched.
    fn reject_transition(&self, pod: &Pod, to: PodStatus) -> CoreError {
        let recorded = self.audit.record_system(
            &pod.tenant_id,
            "pod.transition_rejected",
            "pod",
            pod.pod_id.as_str(),
            Some(json!({"from": pod.status.as_str(), "to": to.as_str()})),
        );
        if let Err(e) = recorded {
            log::warn!(
                "Failed to audit rejected transition for {}: {}",
                pod.pod_id,
                e
            );
        }
        CoreError::InvalidTransition {
            resource: pod.pod_id.to_string(),
            from: pod.status.to_string(),
            to: to.to_string(),
        }
    }
}

fn lifecycle_options(kind: JobKind, pod_id: &PodId) -> JobOptions {
    JobOptions {
        idempotency_key: Some(format!("{}:{}", kind.as_str(), pod_id)),
        ..Default::default()
    }
}
