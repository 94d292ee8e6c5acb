use super::types::WorkerCoordinator;
use crate::error::{CoreError, Result};
use cloudpods_commons::models::{Job, JobFilter};
use cloudpods_commons::{JobId, PodId};

impl WorkerCoordinator {
    /// Get a job by ID.
    pub async fn get_job(&self, job_id: &JobId) -> Result<Option<Job>> {
        let job = self.jobs.get_job_async(job_id.clone()).await?;
        Ok(job)
    }

    /// List jobs matching a filter.
    pub async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>> {
        let jobs = self.jobs.list_jobs_filtered(&filter)?;
        Ok(jobs)
    }

    /// Check whether an active (pending or running) job holds the given
    /// idempotency key.
    pub async fn has_active_job_with_key(&self, key: &str) -> Result<bool> {
        Ok(self.jobs.find_active_by_idempotency_key(key)?.is_some())
    }

    /// The active lifecycle job for a pod, when one is in flight.
    ///
    /// At most one lifecycle job (provision, suspend, resume, delete, heal)
    /// may target a pod at a time; callers use this to reject overlapping
    /// requests and to keep auto-heal idempotent.
    pub async fn find_inflight_lifecycle_job(&self, pod_id: &PodId) -> Result<Option<Job>> {
        let job = self.jobs.find_active_lifecycle_job_for_pod(pod_id)?;
        Ok(job)
    }

    /// Fetch a job, failing with `NotFound` when it does not exist.
    pub(crate) async fn require_job(&self, job_id: &JobId) -> Result<Job> {
        self.get_job(job_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Job {} not found", job_id)))
    }
}
