//! Backup policies, scheduled runs, and restores.
//!
//! A policy describes a recurring snapshot schedule for one pod. The
//! scheduler calls `fire_due`, which creates a `BackupRun` row and enqueues
//! a `backup.run` job; the executor snapshots the instance through the
//! hypervisor and settles the run. Restores go the same way: a `backup.restore`
//! job replays a completed run's artifact onto the pod's instance.
//!
//! Run rows and job rows settle together: a run stays `Running` across job
//! retries and is marked `Failed` exactly when the job spends its last
//! attempt.

use crate::audit::AuditRecorder;
use crate::error::{CoreError, Result};
use crate::hypervisor::HypervisorClient;
use crate::jobs::executor_trait::{JobContext, JobOutcome};
use crate::jobs::payloads::{BackupRestorePayload, BackupRunPayload};
use crate::jobs::WorkerCoordinator;
use crate::settings::SettingsService;
use crate::webhooks::WebhookPublisher;
use cloudpods_commons::ids::prefixed_id;
use cloudpods_commons::models::{
    BackupPolicy, BackupRun, BackupRunStatus, BackupType, EventType, Job, JobKind, JobOptions, Pod,
};
use cloudpods_commons::{now_millis, BackupPolicyId, BackupRunId, PodId};
use cloudpods_system::SystemRegistry;
use serde_json::json;
use std::sync::Arc;

pub struct BackupManager {
    system: Arc<SystemRegistry>,
    coordinator: Arc<WorkerCoordinator>,
    webhooks: Arc<WebhookPublisher>,
    audit: Arc<AuditRecorder>,
    hypervisor: Arc<dyn HypervisorClient>,
    settings: Arc<SettingsService>,
}

impl BackupManager {
    pub fn new(
        system: Arc<SystemRegistry>,
        coordinator: Arc<WorkerCoordinator>,
        webhooks: Arc<WebhookPublisher>,
        audit: Arc<AuditRecorder>,
        hypervisor: Arc<dyn HypervisorClient>,
        settings: Arc<SettingsService>,
    ) -> Self {
        Self {
            system,
            coordinator,
            webhooks,
            audit,
            hypervisor,
            settings,
        }
    }

    // ===== Management surface =====

    /// Create a recurring backup schedule for a pod.
    ///
    /// `retention_count` of zero means "use the tenant's configured
    /// default" at prune time.
    pub fn create_policy(
        &self,
        pod_id: &PodId,
        backup_type: BackupType,
        interval_hours: u32,
        retention_count: u32,
    ) -> Result<BackupPolicy> {
        let pod = self.require_pod(pod_id)?;
        if interval_hours == 0 {
            return Err(CoreError::InvalidOperation(
                "Backup interval must be at least one hour".to_string(),
            ));
        }

        let now = now_millis();
        let policy = self.system.backup_policies().create_policy(BackupPolicy {
            policy_id: BackupPolicyId::new(prefixed_id("BP")),
            pod_id: pod_id.clone(),
            backup_type,
            interval_hours,
            retention_count,
            is_active: true,
            last_fired_at: None,
            created_at: now,
            updated_at: now,
        })?;

        self.audit.record_system(
            &pod.tenant_id,
            "backup_policy.created",
            "backup_policy",
            policy.policy_id.as_str(),
            Some(json!({
                "pod_id": pod_id.as_str(),
                "type": backup_type.as_str(),
                "interval_hours": interval_hours,
            })),
        )?;
        Ok(policy)
    }

    /// Enqueue a restore of a completed run onto its pod.
    pub async fn request_restore(&self, run_id: &BackupRunId) -> Result<Job> {
        let run = self
            .system
            .backup_runs()
            .get_run(run_id)?
            .ok_or_else(|| CoreError::NotFound(format!("Backup run not found: {}", run_id)))?;
        if run.status != BackupRunStatus::Completed {
            return Err(CoreError::InvalidOperation(format!(
                "Backup run {} is {}; only completed runs can be restored",
                run.run_id, run.status
            )));
        }
        let pod = self.require_pod(&run.pod_id)?;

        let job = self
            .coordinator
            .enqueue_typed(
                JobKind::BackupRestore,
                pod.tenant_id.clone(),
                Some(pod.pod_id.clone()),
                &BackupRestorePayload {
                    run_id: run.run_id.clone(),
                },
                Some(JobOptions {
                    idempotency_key: Some(format!("backup.restore:{}", run.run_id)),
                    ..Default::default()
                }),
            )
            .await?;

        self.audit.record_system(
            &pod.tenant_id,
            "backup.restore_requested",
            "backup_run",
            run.run_id.as_str(),
            Some(json!({"pod_id": pod.pod_id.as_str(), "job_id": job.job_id.as_str()})),
        )?;
        Ok(job)
    }

    // ===== Scheduler surface =====

    /// Fire every due active policy: create a `Pending` run, enqueue its
    /// job, and stamp the policy. Returns the number fired.
    pub async fn fire_due(&self, now: i64) -> Result<usize> {
        let due = self.system.backup_policies().list_due(now)?;
        let mut fired = 0;

        for policy in due {
            let Some(pod) = self.system.pods().get_pod(&policy.pod_id)? else {
                log::warn!(
                    "Backup policy {} references missing pod {}; skipping",
                    policy.policy_id,
                    policy.pod_id
                );
                continue;
            };
            if pod.instance_id.is_none() {
                log::debug!(
                    "Pod {} has no instance yet; backup policy {} not fired",
                    pod.pod_id,
                    policy.policy_id
                );
                continue;
            }

            let run = self.system.backup_runs().create_run(BackupRun {
                run_id: BackupRunId::new(prefixed_id("BR")),
                policy_id: policy.policy_id.clone(),
                pod_id: pod.pod_id.clone(),
                backup_type: policy.backup_type,
                status: BackupRunStatus::Pending,
                size_mb: None,
                location: None,
                error: None,
                started_at: None,
                completed_at: None,
                created_at: now,
            })?;

            self.coordinator
                .enqueue_typed(
                    JobKind::BackupRun,
                    pod.tenant_id.clone(),
                    Some(pod.pod_id.clone()),
                    &BackupRunPayload {
                        policy_id: policy.policy_id.clone(),
                        run_id: run.run_id.clone(),
                    },
                    Some(JobOptions {
                        idempotency_key: Some(format!("backup:{}:{}", policy.policy_id, now)),
                        ..Default::default()
                    }),
                )
                .await?;
            self.system
                .backup_policies()
                .mark_fired(&policy.policy_id, now)?;
            fired += 1;
        }

        if fired > 0 {
            log::info!("Fired {} backup policies", fired);
        }
        Ok(fired)
    }

    // ===== Executor surface =====

    /// Snapshot the pod's instance and settle the run row.
    pub async fn execute_run(&self, ctx: &JobContext<BackupRunPayload>) -> Result<JobOutcome> {
        let payload = ctx.payload();
        let Some(mut run) = self.system.backup_runs().get_run(&payload.run_id)? else {
            // Pod deletion cascades run rows; nothing left to do
            return Ok(JobOutcome::Completed {
                message: Some(format!("Backup run {} no longer exists", payload.run_id)),
            });
        };
        if run.status.is_terminal() {
            return Ok(JobOutcome::Completed {
                message: Some(format!(
                    "Backup run {} already settled as {}",
                    run.run_id, run.status
                )),
            });
        }

        let Some(pod) = self.system.pods().get_pod(&run.pod_id)? else {
            return self
                .settle_failed(ctx, run, "Pod deleted before backup ran".to_string(), false)
                .await;
        };
        let Some(instance_id) = pod.instance_id.clone() else {
            return self
                .settle_failed(
                    ctx,
                    run,
                    format!("Pod {} has no instance to snapshot", pod.pod_id),
                    false,
                )
                .await;
        };

        run.start(now_millis());
        let mut run = self.system.backup_runs().update_run(run)?;

        match self.hypervisor.snapshot(&instance_id).await {
            Ok(artifact) => {
                run.complete(artifact.size_mb, artifact.artifact_id, now_millis());
                let run = self.system.backup_runs().update_run(run)?;
                self.prune_runs(&run, &pod)?;

                self.webhooks
                    .publish(
                        &pod.tenant_id,
                        EventType::BackupCompleted,
                        json!({
                            "runId": run.run_id.as_str(),
                            "policyId": run.policy_id.as_str(),
                            "podId": run.pod_id.as_str(),
                            "sizeMb": run.size_mb,
                        }),
                    )
                    .await?;

                ctx.log_info(&format!(
                    "Backup run {} completed ({} MB)",
                    run.run_id,
                    run.size_mb.unwrap_or(0)
                ));
                Ok(JobOutcome::Completed {
                    message: Some(format!("Backup run {} completed", run.run_id)),
                })
            }
            Err(e) if e.is_transient() && self.job_can_retry(ctx).await? => {
                // Leave the run open; the job's next attempt picks it up
                Ok(JobOutcome::Retry {
                    error: e.to_string(),
                })
            }
            Err(e) => {
                let transient = e.is_transient();
                self.settle_failed(ctx, run, e.to_string(), transient).await
            }
        }
    }

    /// Replay a completed run's artifact onto the pod's instance.
    pub async fn execute_restore(
        &self,
        ctx: &JobContext<BackupRestorePayload>,
    ) -> Result<JobOutcome> {
        let run_id = &ctx.payload().run_id;
        let Some(run) = self.system.backup_runs().get_run(run_id)? else {
            return Ok(JobOutcome::Fatal {
                error: format!("Backup run {} not found", run_id),
            });
        };
        if run.status != BackupRunStatus::Completed {
            return Ok(JobOutcome::Fatal {
                error: format!(
                    "Backup run {} is {}; only completed runs can be restored",
                    run.run_id, run.status
                ),
            });
        }
        let Some(location) = run.location.clone() else {
            return Ok(JobOutcome::Fatal {
                error: format!("Backup run {} has no artifact location", run.run_id),
            });
        };
        let Some(pod) = self.system.pods().get_pod(&run.pod_id)? else {
            return Ok(JobOutcome::Fatal {
                error: format!("Pod {} no longer exists", run.pod_id),
            });
        };
        let Some(instance_id) = pod.instance_id.clone() else {
            return Ok(JobOutcome::Fatal {
                error: format!("Pod {} has no instance to restore onto", pod.pod_id),
            });
        };

        if let Err(e) = self.hypervisor.restore(&instance_id, &location).await {
            return Ok(JobOutcome::from_error(e.into()));
        }

        self.audit.record_system(
            &pod.tenant_id,
            "backup.restored",
            "backup_run",
            run.run_id.as_str(),
            Some(json!({"pod_id": pod.pod_id.as_str(), "artifact": location})),
        )?;
        ctx.log_info(&format!(
            "Restored pod {} from backup run {}",
            pod.pod_id, run.run_id
        ));
        Ok(JobOutcome::Completed {
            message: Some(format!("Pod {} restored from run {}", pod.pod_id, run.run_id)),
        })
    }

    // ===== Internals =====

    fn require_pod(&self, pod_id: &PodId) -> Result<Pod> {
        self.system
            .pods()
            .get_pod(pod_id)?
            .ok_or_else(|| CoreError::NotFound(format!("Pod not found: {}", pod_id)))
    }

    /// Whether the job driving `ctx` still has retry budget after this
    /// attempt fails. A job we cannot find has none.
    async fn job_can_retry(&self, ctx: &JobContext<BackupRunPayload>) -> Result<bool> {
        let job = self.coordinator.get_job(&ctx.job_id).await?;
        Ok(job.map(|j| j.can_retry()).unwrap_or(false))
    }

    /// Mark the run `Failed`, tell subscribers, and fail the job. `transient`
    /// picks Retry (the runner exhausts the budget) over Fatal.
    async fn settle_failed(
        &self,
        ctx: &JobContext<BackupRunPayload>,
        mut run: BackupRun,
        error: String,
        transient: bool,
    ) -> Result<JobOutcome> {
        run.fail(error.clone(), now_millis());
        let run = self.system.backup_runs().update_run(run)?;

        if let Some(pod) = self.system.pods().get_pod(&run.pod_id)? {
            self.webhooks
                .publish(
                    &pod.tenant_id,
                    EventType::BackupFailed,
                    json!({
                        "runId": run.run_id.as_str(),
                        "policyId": run.policy_id.as_str(),
                        "podId": run.pod_id.as_str(),
                        "error": error,
                    }),
                )
                .await?;
        }

        ctx.log_error(&format!("Backup run {} failed: {}", run.run_id, error));
        if transient {
            Ok(JobOutcome::Retry { error })
        } else {
            Ok(JobOutcome::Fatal { error })
        }
    }

    /// Drop settled runs beyond the policy's retention. A policy retention
    /// of zero (or a vanished policy) falls back to the tenant setting.
    fn prune_runs(&self, run: &BackupRun, pod: &Pod) -> Result<()> {
        let policy_retention = self
            .system
            .backup_policies()
            .get_policy(&run.policy_id)?
            .map(|p| p.retention_count)
            .unwrap_or(0);
        let retention = if policy_retention > 0 {
            policy_retention
        } else {
            self.settings.backup_retention_count(Some(&pod.tenant_id))
        };
        self.system
            .backup_runs()
            .prune_old_runs(&run.policy_id, retention)?;
        Ok(())
    }
}
