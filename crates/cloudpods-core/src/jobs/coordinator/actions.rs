use super::types::WorkerCoordinator;
use crate::error::Result;
use crate::jobs::executor_trait::JobPayload;
use cloudpods_commons::models::{Job, JobKind, JobOptions, JobStatus};
use cloudpods_commons::{now_millis, JobId, PodId, TenantId};
use log::Level;

impl WorkerCoordinator {
    /// Enqueue a job with a raw JSON payload.
    ///
    /// When the options carry an idempotency key that an active job already
    /// holds, that job is returned instead of inserting a duplicate.
    ///
    /// # Errors
    /// Storage errors only; duplicate idempotency keys are not an error.
    pub async fn enqueue(
        &self,
        kind: JobKind,
        tenant_id: TenantId,
        pod_id: Option<PodId>,
        payload: serde_json::Value,
        options: Option<JobOptions>,
    ) -> Result<Job> {
        let opts = options.unwrap_or_default();
        let max_attempts = opts
            .max_attempts
            .unwrap_or_else(|| self.settings.job_max_attempts(Some(&tenant_id)));
        let job_id = self.generate_job_id(&kind);
        let now_ms = now_millis();

        let job = Job {
            job_id: job_id.clone(),
            kind,
            queue: self.queue.clone(),
            tenant_id,
            pod_id,
            status: JobStatus::Pending,
            payload: Some(payload.to_string()),
            priority: opts.priority.unwrap_or(0),
            attempts: 0,
            max_attempts,
            scheduled_at: opts.scheduled_at.unwrap_or(now_ms),
            started_at: None,
            completed_at: None,
            last_error: None,
            claimed_by: None,
            idempotency_key: opts.idempotency_key,
            created_at: now_ms,
            updated_at: now_ms,
        };

        let inserted = self.jobs.enqueue_async(job).await?;

        if inserted.job_id != job_id {
            // Deduplicated against an active job holding the same key
            self.log_job_event(
                &inserted.job_id,
                Level::Debug,
                &format!("Enqueue deduplicated; reusing active {} job", inserted.kind),
            );
            return Ok(inserted);
        }

        self.log_job_event(
            &inserted.job_id,
            Level::Info,
            &format!("Job enqueued: kind={}", inserted.kind),
        );
        self.awake(inserted.job_id.clone());
        Ok(inserted)
    }

    /// Enqueue a job with a typed, validated payload.
    pub async fn enqueue_typed<T: JobPayload>(
        &self,
        kind: JobKind,
        tenant_id: TenantId,
        pod_id: Option<PodId>,
        payload: &T,
        options: Option<JobOptions>,
    ) -> Result<Job> {
        payload.validate()?;
        let payload_json = serde_json::to_value(payload)?;
        self.enqueue(kind, tenant_id, pod_id, payload_json, options)
            .await
    }

    /// Cancel a job no worker has claimed yet.
    ///
    /// # Errors
    /// `NotFound` if the job does not exist, `InvalidOperation` if it is no
    /// longer pending.
    pub async fn cancel_job(&self, job_id: &JobId) -> Result<Job> {
        let cancelled = self.jobs.cancel(job_id, now_millis())?;
        self.log_job_event(job_id, Level::Warn, "Job cancelled");
        Ok(cancelled)
    }
}
