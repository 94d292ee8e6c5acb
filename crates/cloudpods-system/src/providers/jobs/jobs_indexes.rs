//! Jobs table index definitions
//!
//! This module defines the secondary indexes for the jobs table. All four are
//! maintained automatically by `IndexedEntityStore` in the same atomic batch
//! as the job row itself.

use cloudpods_commons::models::{Job, JobStatus};
use cloudpods_commons::storage_key::{encode_key, encode_prefix};
use cloudpods_commons::{JobId, PodId, StoragePartition};
use cloudpods_store::IndexDefinition;
use std::sync::Arc;

/// Position of `JobQueueClaimIndex` in the index list.
pub const CLAIM_INDEX: usize = 0;
/// Position of `JobStatusUpdatedIndex` in the index list.
pub const STATUS_INDEX: usize = 1;
/// Position of `JobPodActiveIndex` in the index list.
pub const POD_ACTIVE_INDEX: usize = 2;
/// Position of `JobIdempotencyIndex` in the index list.
pub const IDEMPOTENCY_INDEX: usize = 3;

/// Claim-ordering index over pending jobs.
///
/// Key format: `(queue, inverted_priority, scheduled_at, job_id)` via
/// order-preserving tuple encoding. The queue is variable length and sits
/// first, so the tuple encoding keeps one queue's prefix unambiguous.
///
/// Priority is inverted (`i32::MAX - priority`) so higher priorities produce
/// smaller keys: a forward scan of one queue's prefix yields jobs in exactly
/// the claim order, priority descending then scheduled_at ascending.
///
/// Only `Pending` jobs are indexed. Claiming a job removes its entry in the
/// same batch that flips it to `Running`, which is what makes a claim visible
/// to at most one scanner.
pub struct JobQueueClaimIndex;

impl IndexDefinition<JobId, Job> for JobQueueClaimIndex {
    fn partition(&self) -> &str {
        StoragePartition::JobsQueueClaimIdx.name()
    }

    fn indexed_columns(&self) -> Vec<&str> {
        vec!["queue", "priority", "scheduled_at"]
    }

    fn extract_key(&self, _primary_key: &JobId, job: &Job) -> Option<Vec<u8>> {
        if job.status != JobStatus::Pending {
            return None;
        }
        Some(encode_key(&(
            job.queue.as_str(),
            claim_priority(job.priority),
            job.scheduled_at,
            job.job_id.as_str(),
        )))
    }
}

/// Index for querying jobs by status + updated_at (sorted).
///
/// Key format: `[status_byte][updated_at_be][job_id_bytes]`
///
/// This index allows efficient queries like:
/// - "All Running jobs" (reaper timeout sweep)
/// - "Terminal jobs older than the retention cutoff" (cleanup, early-exit
///   once updated_at passes the cutoff because entries are time-sorted)
pub struct JobStatusUpdatedIndex;

impl IndexDefinition<JobId, Job> for JobStatusUpdatedIndex {
    fn partition(&self) -> &str {
        StoragePartition::JobsStatusUpdatedIdx.name()
    }

    fn indexed_columns(&self) -> Vec<&str> {
        vec!["status", "updated_at"]
    }

    fn extract_key(&self, _primary_key: &JobId, job: &Job) -> Option<Vec<u8>> {
        let mut key = Vec::with_capacity(1 + 8 + job.job_id.as_bytes().len());
        key.push(status_to_u8(job.status));
        key.extend_from_slice(&job.updated_at.to_be_bytes());
        key.extend_from_slice(job.job_id.as_bytes());
        Some(key)
    }
}

/// Index of in-flight lifecycle jobs per pod.
///
/// Key format: `(pod_id, job_id)` via tuple encoding.
///
/// Only jobs that (a) target a pod, (b) mutate its lifecycle, and (c) are
/// still Pending or Running appear here. A single prefix probe answers
/// "is any lifecycle work already in flight for this pod", which is what
/// keeps auto-heal enqueues idempotent.
pub struct JobPodActiveIndex;

impl IndexDefinition<JobId, Job> for JobPodActiveIndex {
    fn partition(&self) -> &str {
        StoragePartition::JobsPodIdx.name()
    }

    fn indexed_columns(&self) -> Vec<&str> {
        vec!["pod_id"]
    }

    fn extract_key(&self, _primary_key: &JobId, job: &Job) -> Option<Vec<u8>> {
        if !job.status.is_active() || !job.kind.is_lifecycle() {
            return None;
        }
        job.pod_id
            .as_ref()
            .map(|pod_id| encode_key(&(pod_id.as_str(), job.job_id.as_str())))
    }
}

/// Index for looking up active jobs by idempotency key.
///
/// Key format: `{idempotency_key}` -> `{job_id}`
///
/// Only active (Pending or Running) jobs are indexed; the entry disappears
/// when the job reaches a terminal status, so a finished job never blocks a
/// re-enqueue with the same key.
pub struct JobIdempotencyIndex;

impl IndexDefinition<JobId, Job> for JobIdempotencyIndex {
    fn partition(&self) -> &str {
        StoragePartition::JobsIdempotencyIdx.name()
    }

    fn indexed_columns(&self) -> Vec<&str> {
        vec!["idempotency_key"]
    }

    fn extract_key(&self, _primary_key: &JobId, job: &Job) -> Option<Vec<u8>> {
        if !job.status.is_active() {
            return None;
        }
        job.idempotency_key.as_ref().map(|k| k.as_bytes().to_vec())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert JobStatus to a u8 for index key ordering.
///
/// Order: Pending(0) < Running(1) < Completed(2) < Failed(3) < Cancelled(4)
pub fn status_to_u8(status: JobStatus) -> u8 {
    match status {
        JobStatus::Pending => 0,
        JobStatus::Running => 1,
        JobStatus::Completed => 2,
        JobStatus::Failed => 3,
        JobStatus::Cancelled => 4,
    }
}

/// Invert a job priority for the claim index so that higher priorities sort
/// first under a forward scan.
pub fn claim_priority(priority: i32) -> u64 {
    (i32::MAX as i64 - priority as i64) as u64
}

/// Prefix matching every claim-index entry of one queue.
pub fn claim_queue_prefix(queue: &str) -> Vec<u8> {
    encode_prefix(&(queue,))
}

/// Prefix matching every pod-active-index entry of one pod.
pub fn pod_active_prefix(pod_id: &PodId) -> Vec<u8> {
    encode_prefix(&(pod_id.as_str(),))
}

/// Create the default set of indexes for the jobs table.
pub fn create_jobs_indexes() -> Vec<Arc<dyn IndexDefinition<JobId, Job>>> {
    vec![
        Arc::new(JobQueueClaimIndex),
        Arc::new(JobStatusUpdatedIndex),
        Arc::new(JobPodActiveIndex),
        Arc::new(JobIdempotencyIndex),
    ]
}
