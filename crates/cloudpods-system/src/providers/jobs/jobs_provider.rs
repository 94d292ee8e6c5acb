//! Durable job queue provider.
//!
//! Uses `IndexedEntityStore` for automatic secondary index management.
//!
//! ## Indexes
//!
//! The jobs table has four secondary indexes (managed automatically):
//!
//! 1. **JobQueueClaimIndex** - Pending jobs in claim order
//!    - Key: `(queue, inverted_priority, scheduled_at, job_id)`
//!    - Enables: one forward scan per claim, highest priority first
//!
//! 2. **JobStatusUpdatedIndex** - Queries by status + updated_at
//!    - Key: `[status_byte][updated_at_be][job_id]`
//!    - Enables: reaper sweeps over Running, retention sweeps over terminal
//!
//! 3. **JobPodActiveIndex** - In-flight lifecycle job per pod
//!    - Key: `(pod_id, job_id)`
//!    - Enables: idempotent auto-heal enqueues
//!
//! 4. **JobIdempotencyIndex** - Lookup by idempotency key
//!    - Key: `{idempotency_key}`
//!    - Enables: duplicate job prevention while a holder is active
//!
//! ## Claim semantics
//!
//! `claim_next` runs under a process-wide claim lock and flips the winning
//! job to Running in one atomic batch that also removes its claim-index
//! entry. A job is therefore handed to at most one worker.

use super::jobs_indexes::{
    claim_queue_prefix, create_jobs_indexes, pod_active_prefix, status_to_u8, CLAIM_INDEX,
    IDEMPOTENCY_INDEX, POD_ACTIVE_INDEX, STATUS_INDEX,
};
use crate::error::SystemError;
use cloudpods_commons::models::{Job, JobFilter, JobStatus};
use cloudpods_commons::{JobId, PodId, StorageKey, StoragePartition, WorkerId};
use cloudpods_store::entity_store::EntityStore;
use cloudpods_store::{IndexedEntityStore, StorageBackend};
use std::sync::{Arc, Mutex};

/// Type alias for the indexed jobs store
pub type JobsStore = IndexedEntityStore<JobId, Job>;

/// Jobs provider built on `IndexedEntityStore` for automatic index management.
///
/// All insert/update/delete operations automatically maintain secondary
/// indexes using the backend's atomic batch.
pub struct JobsProvider {
    store: JobsStore,
    /// Serializes idempotency check + insert.
    enqueue_lock: Mutex<()>,
    /// Serializes claim scans so a pending job is claimed exactly once.
    claim_lock: Mutex<()>,
}

impl std::fmt::Debug for JobsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobsProvider").finish()
    }
}

impl JobsProvider {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let store = IndexedEntityStore::new(
            backend,
            StoragePartition::Jobs.name(),
            create_jobs_indexes(),
        );
        Self {
            store,
            enqueue_lock: Mutex::new(()),
            claim_lock: Mutex::new(()),
        }
    }

    fn load_job(&self, job_id: &JobId) -> Result<Job, SystemError> {
        self.store
            .get(job_id)?
            .ok_or_else(|| SystemError::NotFound(format!("Job not found: {}", job_id)))
    }

    /// Enqueue a new job.
    ///
    /// When the job carries an idempotency key and an active job already
    /// holds that key, the existing job is returned instead of inserting a
    /// duplicate.
    pub fn enqueue(&self, job: Job) -> Result<Job, SystemError> {
        let _guard = self
            .enqueue_lock
            .lock()
            .map_err(|e| SystemError::Other(format!("enqueue lock poisoned: {}", e)))?;

        if let Some(key) = &job.idempotency_key {
            if let Some(existing) = self.find_active_by_idempotency_key(key)? {
                log::debug!(
                    "Enqueue deduplicated by idempotency key {}: existing job {}",
                    key,
                    existing.job_id
                );
                return Ok(existing);
            }
        }

        if self.store.get(&job.job_id)?.is_some() {
            return Err(SystemError::AlreadyExists(format!(
                "Job already exists: {}",
                job.job_id
            )));
        }

        self.store.insert(&job.job_id, &job)?;
        log::debug!(
            "Enqueued job {} kind={} queue={} priority={}",
            job.job_id,
            job.kind,
            job.queue,
            job.priority
        );
        Ok(job)
    }

    /// Get a job by ID
    pub fn get_job(&self, job_id: &JobId) -> Result<Option<Job>, SystemError> {
        Ok(self.store.get(job_id)?)
    }

    /// Claim the next eligible job from `queue` for `worker_id`.
    ///
    /// Eligible means Pending with `scheduled_at <= now`. Candidates come
    /// back in claim order (priority descending, then scheduled_at
    /// ascending); entries that are not yet due are skipped, not a stop
    /// condition, because a high-priority job scheduled for later sorts
    /// ahead of a lower-priority job that is due now.
    pub fn claim_next(
        &self,
        queue: &str,
        worker_id: &WorkerId,
        now: i64,
    ) -> Result<Option<Job>, SystemError> {
        let _guard = self
            .claim_lock
            .lock()
            .map_err(|e| SystemError::Other(format!("claim lock poisoned: {}", e)))?;

        let prefix = claim_queue_prefix(queue);
        let entries = self
            .store
            .scan_index_raw(CLAIM_INDEX, Some(&prefix), None, None)?;

        for (_index_key, job_id_bytes) in entries {
            let job_id =
                JobId::from_storage_key(&job_id_bytes).map_err(SystemError::SerializationError)?;

            let job = match self.store.get(&job_id)? {
                Some(job) => job,
                // Index entry raced with a delete; skip it
                None => continue,
            };

            if job.status != JobStatus::Pending || job.scheduled_at > now {
                continue;
            }

            let claimed = job.clone().claim(worker_id.clone(), now);
            self.store.update_with_old(&job_id, Some(&job), &claimed)?;
            log::debug!(
                "Worker {} claimed job {} (kind={}, attempt {}/{})",
                worker_id,
                claimed.job_id,
                claimed.kind,
                claimed.attempts + 1,
                claimed.max_attempts
            );
            return Ok(Some(claimed));
        }

        Ok(None)
    }

    /// Mark a running job completed.
    pub fn complete(&self, job_id: &JobId, now: i64) -> Result<Job, SystemError> {
        let job = self.load_job(job_id)?;
        if job.status != JobStatus::Running {
            return Err(SystemError::InvalidOperation(format!(
                "Cannot complete job {} with status '{}'",
                job_id, job.status
            )));
        }
        let updated = job.clone().complete(now);
        self.store.update_with_old(job_id, Some(&job), &updated)?;
        Ok(updated)
    }

    /// Record a failure on a running job and return it to Pending with a
    /// later `scheduled_at`. Increments `attempts`.
    pub fn reschedule(
        &self,
        job_id: &JobId,
        error: String,
        retry_at: i64,
        now: i64,
    ) -> Result<Job, SystemError> {
        let job = self.load_job(job_id)?;
        if job.status != JobStatus::Running {
            return Err(SystemError::InvalidOperation(format!(
                "Cannot reschedule job {} with status '{}'",
                job_id, job.status
            )));
        }
        let updated = job.clone().reschedule(error, retry_at, now);
        self.store.update_with_old(job_id, Some(&job), &updated)?;
        log::info!(
            "Job {} rescheduled for retry {}/{} at {}",
            job_id,
            updated.attempts + 1,
            updated.max_attempts,
            updated.scheduled_at
        );
        Ok(updated)
    }

    /// Terminally fail a running job. Increments `attempts`; no retry follows.
    pub fn fail_permanently(
        &self,
        job_id: &JobId,
        error: String,
        now: i64,
    ) -> Result<Job, SystemError> {
        let job = self.load_job(job_id)?;
        if job.status != JobStatus::Running {
            return Err(SystemError::InvalidOperation(format!(
                "Cannot fail job {} with status '{}'",
                job_id, job.status
            )));
        }
        let updated = job.clone().fail_permanently(error, now);
        self.store.update_with_old(job_id, Some(&job), &updated)?;
        log::warn!(
            "Job {} permanently failed after {} attempts: {}",
            job_id,
            updated.attempts,
            updated.last_error.as_deref().unwrap_or("unknown error")
        );
        Ok(updated)
    }

    /// Cancel a job that no worker has claimed yet.
    pub fn cancel(&self, job_id: &JobId, now: i64) -> Result<Job, SystemError> {
        let job = self.load_job(job_id)?;
        if job.status != JobStatus::Pending {
            return Err(SystemError::InvalidOperation(format!(
                "Cannot cancel job {} with status '{}'",
                job_id, job.status
            )));
        }
        let updated = job.clone().cancel(now);
        self.store.update_with_old(job_id, Some(&job), &updated)?;
        Ok(updated)
    }

    /// Find the active job holding `key`, if any.
    ///
    /// The index is prefix-scanned, so keys sharing a prefix can collide in
    /// the scan; only an exact index-key match counts.
    pub fn find_active_by_idempotency_key(&self, key: &str) -> Result<Option<Job>, SystemError> {
        let matches =
            self.store
                .scan_index_raw(IDEMPOTENCY_INDEX, Some(key.as_bytes()), None, None)?;

        for (index_key, job_id_bytes) in matches {
            if index_key != key.as_bytes() {
                continue;
            }
            let job_id =
                JobId::from_storage_key(&job_id_bytes).map_err(SystemError::SerializationError)?;
            if let Some(job) = self.store.get(&job_id)? {
                if job.status.is_active() {
                    return Ok(Some(job));
                }
            }
        }
        Ok(None)
    }

    /// Find the in-flight lifecycle job targeting `pod_id`, if any.
    pub fn find_active_lifecycle_job_for_pod(
        &self,
        pod_id: &PodId,
    ) -> Result<Option<Job>, SystemError> {
        let prefix = pod_active_prefix(pod_id);
        let jobs = self
            .store
            .scan_by_index(POD_ACTIVE_INDEX, Some(&prefix), Some(1))?;
        Ok(jobs.into_iter().map(|(_, job)| job).next())
    }

    /// All jobs currently marked Running, for the reaper's timeout sweep.
    pub fn list_running(&self) -> Result<Vec<Job>, SystemError> {
        let prefix = [status_to_u8(JobStatus::Running)];
        let jobs = self.store.scan_by_index(STATUS_INDEX, Some(&prefix), None)?;
        Ok(jobs.into_iter().map(|(_, job)| job).collect())
    }

    /// List jobs with filter.
    ///
    /// When filtering by status, uses the status index for an ordered prefix
    /// scan; remaining filter fields are applied in memory.
    pub fn list_jobs_filtered(&self, filter: &JobFilter) -> Result<Vec<Job>, SystemError> {
        let limit = filter.limit.unwrap_or(usize::MAX);

        if let Some(status) = filter.status {
            let prefix = [status_to_u8(status)];
            let entries = self.store.scan_by_index(STATUS_INDEX, Some(&prefix), None)?;

            let mut jobs = Vec::new();
            for (_job_id, job) in entries {
                if matches_filter(&job, filter) {
                    jobs.push(job);
                    if jobs.len() >= limit {
                        break;
                    }
                }
            }
            return Ok(jobs);
        }

        // Fallback to full scan
        let all_jobs = self.store.scan_all(None, None, None)?;
        let mut jobs: Vec<Job> = all_jobs.into_iter().map(|(_, job)| job).collect();
        jobs.retain(|job| matches_filter(job, filter));
        if jobs.len() > limit {
            jobs.truncate(limit);
        }
        Ok(jobs)
    }

    /// Delete terminal jobs older than the retention period (in days).
    ///
    /// Optimized to use the status index: entries are time-sorted, so each
    /// status scan stops at the first job newer than the cutoff.
    pub fn cleanup_old_jobs(&self, retention_days: u32, now: i64) -> Result<usize, SystemError> {
        let retention_ms = retention_days as i64 * 24 * 60 * 60 * 1000;
        let cutoff_time = now - retention_ms;

        let mut deleted = 0;

        let target_statuses = [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled];

        for status in target_statuses {
            let prefix = [status_to_u8(status)];
            let iter = self
                .store
                .scan_index_raw(STATUS_INDEX, Some(&prefix), None, None)?;

            for (key_bytes, job_id_bytes) in iter {
                // Key layout: [status_byte][updated_at_be][job_id]
                if key_bytes.len() < 9 {
                    continue;
                }
                let mut updated_at_bytes = [0u8; 8];
                updated_at_bytes.copy_from_slice(&key_bytes[1..9]);
                let updated_at = i64::from_be_bytes(updated_at_bytes);

                // Sorted by updated_at: everything after this is newer
                if updated_at > cutoff_time {
                    break;
                }

                let job_id = JobId::from_storage_key(&job_id_bytes)
                    .map_err(SystemError::SerializationError)?;

                if let Some(job) = self.store.get(&job_id)? {
                    let reference_time = job.completed_at.unwrap_or(job.updated_at);
                    if reference_time < cutoff_time {
                        self.store.delete(&job.job_id)?;
                        deleted += 1;
                    }
                }
            }
        }

        if deleted > 0 {
            log::info!("Job retention sweep deleted {} terminal jobs", deleted);
        }
        Ok(deleted)
    }

    // ========================================================================
    // Async wrappers
    // ========================================================================

    /// Async version of `enqueue()`.
    ///
    /// Uses `spawn_blocking` internally to avoid blocking the async runtime.
    pub async fn enqueue_async(self: &Arc<Self>, job: Job) -> Result<Job, SystemError> {
        let provider = Arc::clone(self);
        tokio::task::spawn_blocking(move || provider.enqueue(job))
            .await
            .map_err(|e| SystemError::Other(format!("spawn_blocking error: {}", e)))?
    }

    /// Async version of `claim_next()`.
    pub async fn claim_next_async(
        self: &Arc<Self>,
        queue: String,
        worker_id: WorkerId,
        now: i64,
    ) -> Result<Option<Job>, SystemError> {
        let provider = Arc::clone(self);
        tokio::task::spawn_blocking(move || provider.claim_next(&queue, &worker_id, now))
            .await
            .map_err(|e| SystemError::Other(format!("spawn_blocking error: {}", e)))?
    }

    /// Async version of `get_job()`.
    pub async fn get_job_async(self: &Arc<Self>, job_id: JobId) -> Result<Option<Job>, SystemError> {
        let provider = Arc::clone(self);
        tokio::task::spawn_blocking(move || provider.get_job(&job_id))
            .await
            .map_err(|e| SystemError::Other(format!("spawn_blocking error: {}", e)))?
    }

    /// Async version of `complete()`.
    pub async fn complete_async(
        self: &Arc<Self>,
        job_id: JobId,
        now: i64,
    ) -> Result<Job, SystemError> {
        let provider = Arc::clone(self);
        tokio::task::spawn_blocking(move || provider.complete(&job_id, now))
            .await
            .map_err(|e| SystemError::Other(format!("spawn_blocking error: {}", e)))?
    }

    /// Async version of `reschedule()`.
    pub async fn reschedule_async(
        self: &Arc<Self>,
        job_id: JobId,
        error: String,
        retry_at: i64,
        now: i64,
    ) -> Result<Job, SystemError> {
        let provider = Arc::clone(self);
        tokio::task::spawn_blocking(move || provider.reschedule(&job_id, error, retry_at, now))
            .await
            .map_err(|e| SystemError::Other(format!("spawn_blocking error: {}", e)))?
    }

    /// Async version of `fail_permanently()`.
    pub async fn fail_permanently_async(
        self: &Arc<Self>,
        job_id: JobId,
        error: String,
        now: i64,
    ) -> Result<Job, SystemError> {
        let provider = Arc::clone(self);
        tokio::task::spawn_blocking(move || provider.fail_permanently(&job_id, error, now))
            .await
            .map_err(|e| SystemError::Other(format!("spawn_blocking error: {}", e)))?
    }
}

/// Filter matching applied on top of index scans.
fn matches_filter(job: &Job, filter: &JobFilter) -> bool {
    if let Some(status) = filter.status {
        if status != job.status {
            return false;
        }
    }
    if let Some(kind) = filter.kind {
        if kind != job.kind {
            return false;
        }
    }
    if let Some(ref pod_id) = filter.pod_id {
        if job.pod_id.as_ref() != Some(pod_id) {
            return false;
        }
    }
    if let Some(ref tenant_id) = filter.tenant_id {
        if tenant_id != &job.tenant_id {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudpods_commons::models::{JobKind, JobOptions};
    use cloudpods_commons::{now_millis, TenantId};
    use cloudpods_store::test_utils::InMemoryBackend;

    fn create_test_provider() -> JobsProvider {
        let backend: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
        JobsProvider::new(backend)
    }

    fn build_job(id: &str, kind: JobKind, options: JobOptions) -> Job {
        let now = now_millis();
        Job {
            job_id: JobId::new(id),
            kind,
            queue: "default".to_string(),
            tenant_id: TenantId::new("t1"),
            pod_id: Some(PodId::new("pod-1")),
            status: JobStatus::Pending,
            payload: None,
            priority: options.priority.unwrap_or(0),
            attempts: 0,
            max_attempts: options.max_attempts.unwrap_or(5),
            scheduled_at: options.scheduled_at.unwrap_or(now),
            started_at: None,
            completed_at: None,
            last_error: None,
            claimed_by: None,
            idempotency_key: options.idempotency_key,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_enqueue_and_get() {
        let provider = create_test_provider();
        let job = build_job("PR-1", JobKind::Provision, JobOptions::default());

        provider.enqueue(job.clone()).unwrap();

        let retrieved = provider.get_job(&job.job_id).unwrap().unwrap();
        assert_eq!(retrieved.job_id, job.job_id);
        assert_eq!(retrieved.status, JobStatus::Pending);
    }

    #[test]
    fn test_claim_respects_priority_then_schedule() {
        let provider = create_test_provider();
        let now = now_millis();

        let normal = build_job(
            "PR-normal",
            JobKind::Provision,
            JobOptions {
                scheduled_at: Some(now - 2_000),
                ..Default::default()
            },
        );
        let urgent = build_job(
            "PR-urgent",
            JobKind::Provision,
            JobOptions {
                priority: Some(10),
                scheduled_at: Some(now - 1_000),
                ..Default::default()
            },
        );
        provider.enqueue(normal).unwrap();
        provider.enqueue(urgent).unwrap();

        let worker = WorkerId::new("w1");
        let first = provider.claim_next("default", &worker, now).unwrap().unwrap();
        assert_eq!(first.job_id.as_str(), "PR-urgent");
        assert_eq!(first.status, JobStatus::Running);
        assert_eq!(first.claimed_by, Some(worker.clone()));

        let second = provider.claim_next("default", &worker, now).unwrap().unwrap();
        assert_eq!(second.job_id.as_str(), "PR-normal");

        assert!(provider.claim_next("default", &worker, now).unwrap().is_none());
    }

    #[test]
    fn test_claim_skips_future_scheduled_jobs() {
        let provider = create_test_provider();
        let now = now_millis();

        // High priority but not yet due: must not block the due job behind it
        let future = build_job(
            "PR-future",
            JobKind::Provision,
            JobOptions {
                priority: Some(100),
                scheduled_at: Some(now + 60_000),
                ..Default::default()
            },
        );
        let due = build_job(
            "PR-due",
            JobKind::Provision,
            JobOptions {
                scheduled_at: Some(now - 1_000),
                ..Default::default()
            },
        );
        provider.enqueue(future).unwrap();
        provider.enqueue(due).unwrap();

        let worker = WorkerId::new("w1");
        let claimed = provider.claim_next("default", &worker, now).unwrap().unwrap();
        assert_eq!(claimed.job_id.as_str(), "PR-due");

        // The future job stays pending
        assert!(provider.claim_next("default", &worker, now).unwrap().is_none());
    }

    #[test]
    fn test_claim_scoped_to_queue() {
        let provider = create_test_provider();
        let now = now_millis();

        let mut job = build_job("PR-1", JobKind::Provision, JobOptions::default());
        job.queue = "maintenance".to_string();
        job.scheduled_at = now - 1_000;
        provider.enqueue(job).unwrap();

        let worker = WorkerId::new("w1");
        assert!(provider.claim_next("default", &worker, now).unwrap().is_none());
        assert!(provider
            .claim_next("maintenance", &worker, now)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_enqueue_dedup_by_idempotency_key() {
        let provider = create_test_provider();
        let now = now_millis();

        let first = build_job(
            "HL-1",
            JobKind::Heal,
            JobOptions {
                idempotency_key: Some("heal:pod-1".to_string()),
                ..Default::default()
            },
        );
        let duplicate = build_job(
            "HL-2",
            JobKind::Heal,
            JobOptions {
                idempotency_key: Some("heal:pod-1".to_string()),
                ..Default::default()
            },
        );

        provider.enqueue(first).unwrap();
        let result = provider.enqueue(duplicate).unwrap();
        // The original job wins; the duplicate is not inserted
        assert_eq!(result.job_id.as_str(), "HL-1");
        assert!(provider.get_job(&JobId::new("HL-2")).unwrap().is_none());

        // Once the holder reaches a terminal status the key frees up
        let worker = WorkerId::new("w1");
        provider.claim_next("default", &worker, now).unwrap().unwrap();
        provider.complete(&JobId::new("HL-1"), now).unwrap();

        let reenqueued = build_job(
            "HL-3",
            JobKind::Heal,
            JobOptions {
                idempotency_key: Some("heal:pod-1".to_string()),
                ..Default::default()
            },
        );
        let result = provider.enqueue(reenqueued).unwrap();
        assert_eq!(result.job_id.as_str(), "HL-3");
    }

    #[test]
    fn test_complete_requires_running() {
        let provider = create_test_provider();
        let job = build_job("PR-1", JobKind::Provision, JobOptions::default());
        provider.enqueue(job.clone()).unwrap();

        let err = provider.complete(&job.job_id, now_millis()).unwrap_err();
        assert!(matches!(err, SystemError::InvalidOperation(_)));
    }

    #[test]
    fn test_reschedule_returns_job_to_claimable_state() {
        let provider = create_test_provider();
        let now = now_millis();
        let job = build_job("PR-1", JobKind::Provision, JobOptions::default());
        provider.enqueue(job.clone()).unwrap();

        let worker = WorkerId::new("w1");
        provider.claim_next("default", &worker, now).unwrap().unwrap();

        let rescheduled = provider
            .reschedule(&job.job_id, "allocation timed out".to_string(), now + 30_000, now)
            .unwrap();
        assert_eq!(rescheduled.status, JobStatus::Pending);
        assert_eq!(rescheduled.attempts, 1);
        assert!(rescheduled.claimed_by.is_none());

        // Not yet due
        assert!(provider.claim_next("default", &worker, now).unwrap().is_none());
        // Due after the backoff elapses
        assert!(provider
            .claim_next("default", &worker, now + 31_000)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_fail_permanently_is_terminal() {
        let provider = create_test_provider();
        let now = now_millis();
        let job = build_job("PR-1", JobKind::Provision, JobOptions::default());
        provider.enqueue(job.clone()).unwrap();

        let worker = WorkerId::new("w1");
        provider.claim_next("default", &worker, now).unwrap().unwrap();
        let failed = provider
            .fail_permanently(&job.job_id, "no capacity".to_string(), now)
            .unwrap();

        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.attempts, 1);
        assert!(provider.claim_next("default", &worker, now).unwrap().is_none());
    }

    #[test]
    fn test_find_active_lifecycle_job_for_pod() {
        let provider = create_test_provider();
        let pod_id = PodId::new("pod-1");

        assert!(provider
            .find_active_lifecycle_job_for_pod(&pod_id)
            .unwrap()
            .is_none());

        let job = build_job("HL-1", JobKind::Heal, JobOptions::default());
        provider.enqueue(job.clone()).unwrap();

        let found = provider
            .find_active_lifecycle_job_for_pod(&pod_id)
            .unwrap()
            .unwrap();
        assert_eq!(found.job_id, job.job_id);

        // Non-lifecycle jobs for the same pod do not count
        let now = now_millis();
        let worker = WorkerId::new("w1");
        provider.claim_next("default", &worker, now).unwrap();
        provider.complete(&job.job_id, now).unwrap();

        let backup = build_job("BK-1", JobKind::BackupRun, JobOptions::default());
        provider.enqueue(backup).unwrap();
        assert!(provider
            .find_active_lifecycle_job_for_pod(&pod_id)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_list_running_for_reaper() {
        let provider = create_test_provider();
        let now = now_millis();

        for i in 0..3 {
            let job = build_job(&format!("PR-{}", i), JobKind::Provision, JobOptions::default());
            provider.enqueue(job).unwrap();
        }

        let worker = WorkerId::new("w1");
        provider.claim_next("default", &worker, now).unwrap();
        provider.claim_next("default", &worker, now).unwrap();

        let running = provider.list_running().unwrap();
        assert_eq!(running.len(), 2);
        assert!(running.iter().all(|j| j.status == JobStatus::Running));
    }

    #[test]
    fn test_cleanup_old_jobs_only_touches_expired_terminal() {
        let provider = create_test_provider();
        let now = now_millis();
        let worker = WorkerId::new("w1");

        let old_done = build_job("PR-old", JobKind::Provision, JobOptions::default());
        provider.enqueue(old_done.clone()).unwrap();
        let stale_time = now - 40 * 24 * 60 * 60 * 1000;
        provider.claim_next("default", &worker, now).unwrap();
        // Backdate the completion so the retention sweep sees it as expired
        let mut job = provider.get_job(&old_done.job_id).unwrap().unwrap();
        job.status = JobStatus::Completed;
        job.completed_at = Some(stale_time);
        job.updated_at = stale_time;
        let running = provider.get_job(&old_done.job_id).unwrap().unwrap();
        provider
            .store
            .update_with_old(&old_done.job_id, Some(&running), &job)
            .unwrap();

        let fresh = build_job("PR-fresh", JobKind::Provision, JobOptions::default());
        provider.enqueue(fresh.clone()).unwrap();
        provider.claim_next("default", &worker, now).unwrap();
        provider.complete(&fresh.job_id, now).unwrap();

        let deleted = provider.cleanup_old_jobs(30, now).unwrap();
        assert_eq!(deleted, 1);
        assert!(provider.get_job(&old_done.job_id).unwrap().is_none());
        assert!(provider.get_job(&fresh.job_id).unwrap().is_some());
    }

    #[test]
    fn test_list_jobs_filtered_by_status_and_kind() {
        let provider = create_test_provider();
        let now = now_millis();
        let worker = WorkerId::new("w1");

        provider
            .enqueue(build_job("PR-1", JobKind::Provision, JobOptions::default()))
            .unwrap();
        provider
            .enqueue(build_job("SU-1", JobKind::Suspend, JobOptions::default()))
            .unwrap();
        provider.claim_next("default", &worker, now).unwrap();

        let pending = provider
            .list_jobs_filtered(&JobFilter {
                status: Some(JobStatus::Pending),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(pending.len(), 1);

        let suspends = provider
            .list_jobs_filtered(&JobFilter {
                kind: Some(JobKind::Suspend),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(suspends.len(), 1);
        assert_eq!(suspends[0].kind, JobKind::Suspend);
    }

    #[tokio::test]
    async fn test_async_claim_round_trip() {
        let provider = Arc::new(create_test_provider());
        let now = now_millis();

        let job = build_job("PR-1", JobKind::Provision, JobOptions::default());
        provider.enqueue_async(job.clone()).await.unwrap();

        let claimed = provider
            .claim_next_async("default".to_string(), WorkerId::new("w1"), now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.job_id, job.job_id);

        provider.complete_async(job.job_id.clone(), now).await.unwrap();
        let done = provider.get_job_async(job.job_id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_concurrent_claimants_never_share_a_job() {
        let provider = Arc::new(create_test_provider());
        let now = now_millis();

        for i in 0..8 {
            let job = build_job(
                &format!("PR-storm-{}", i),
                JobKind::Provision,
                JobOptions {
                    scheduled_at: Some(now - 1_000),
                    ..Default::default()
                },
            );
            provider.enqueue(job).unwrap();
        }

        let mut tasks = tokio::task::JoinSet::new();
        for w in 0..16 {
            let provider = Arc::clone(&provider);
            tasks.spawn(async move {
                let worker = WorkerId::new(format!("w{}", w));
                let mut claimed = Vec::new();
                while let Some(job) = provider
                    .claim_next_async("default".to_string(), worker.clone(), now)
                    .await
                    .unwrap()
                {
                    assert_eq!(job.claimed_by, Some(worker.clone()));
                    claimed.push(job.job_id);
                }
                claimed
            });
        }

        let mut all = Vec::new();
        while let Some(result) = tasks.join_next().await {
            all.extend(result.unwrap());
        }

        assert_eq!(all.len(), 8, "all jobs claimed");
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 8, "no job claimed twice");
    }
}
