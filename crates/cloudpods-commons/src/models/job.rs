//! Job model: one unit of asynchronous, retryable work in the job store.

use crate::ids::{JobId, PodId, TenantId, WorkerId};
use crate::serialization::Storable;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of job kinds the core executes.
///
/// Each kind maps to exactly one handler with a stable payload schema.
/// Kind strings are the wire names used by collaborators when enqueueing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum JobKind {
    Provision,
    Suspend,
    Resume,
    Delete,
    Heal,
    BackupRun,
    BackupRestore,
    WebhookDeliver,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Provision => "provision",
            JobKind::Suspend => "suspend",
            JobKind::Resume => "resume",
            JobKind::Delete => "delete",
            JobKind::Heal => "heal",
            JobKind::BackupRun => "backup.run",
            JobKind::BackupRestore => "backup.restore",
            JobKind::WebhookDeliver => "webhook.deliver",
        }
    }

    /// Returns the 2-letter uppercase prefix for JobId generation.
    pub fn short_prefix(&self) -> &'static str {
        match self {
            JobKind::Provision => "PR",
            JobKind::Suspend => "SU",
            JobKind::Resume => "RE",
            JobKind::Delete => "DE",
            JobKind::Heal => "HL",
            JobKind::BackupRun => "BK",
            JobKind::BackupRestore => "BR",
            JobKind::WebhookDeliver => "WD",
        }
    }

    /// Maximum execution time before the reaper treats a running job of this
    /// kind as abandoned, in seconds.
    pub fn timeout_seconds(&self) -> i64 {
        match self {
            JobKind::Provision => 900,
            JobKind::Suspend | JobKind::Resume => 120,
            JobKind::Delete => 600,
            JobKind::Heal => 300,
            JobKind::BackupRun => 3600,
            JobKind::BackupRestore => 3600,
            JobKind::WebhookDeliver => 60,
        }
    }

    /// Kinds that mutate a pod's lifecycle state. At most one of these may be
    /// in flight per pod at a time.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            JobKind::Provision
                | JobKind::Suspend
                | JobKind::Resume
                | JobKind::Delete
                | JobKind::Heal
        )
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "provision" => Some(JobKind::Provision),
            "suspend" => Some(JobKind::Suspend),
            "resume" => Some(JobKind::Resume),
            "delete" => Some(JobKind::Delete),
            "heal" => Some(JobKind::Heal),
            "backup.run" => Some(JobKind::BackupRun),
            "backup.restore" => Some(JobKind::BackupRestore),
            "webhook.deliver" => Some(JobKind::WebhookDeliver),
            _ => None,
        }
    }
}

impl FromStr for JobKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::from_str_opt(s).ok_or_else(|| format!("Unknown job kind: {}", s))
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job lifecycle status.
///
/// `Completed`, `Failed`, and `Cancelled` are terminal: the row is retained
/// for audit and never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum JobStatus {
    /// Waiting for a worker. Eligible to claim once `scheduled_at` passes.
    Pending,
    /// Claimed by a worker and executing.
    Running,
    /// Handler finished successfully.
    Completed,
    /// Retry budget exhausted or a fatal error occurred.
    Failed,
    /// Cancelled before any worker claimed it.
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Pending or Running: counts as "in flight" for overlap checks.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One unit of asynchronous work persisted in the job store.
///
/// Mutated only through atomic claim/complete/fail transitions in the jobs
/// provider; all timestamps are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Job {
    pub job_id: JobId,
    pub kind: JobKind,
    /// Named queue the job belongs to. Workers claim from exactly one queue.
    pub queue: String,
    pub tenant_id: TenantId,
    /// Pod this job operates on, when it targets one. Drives per-pod
    /// lifecycle serialization and auto-heal idempotency checks.
    pub pod_id: Option<PodId>,
    pub status: JobStatus,
    /// Kind-specific payload as JSON text; decoded once at dispatch.
    pub payload: Option<String>,
    /// Higher runs first among eligible jobs.
    pub priority: i32,
    /// Failure count so far. Incremented on handler failure and on reap.
    pub attempts: u32,
    pub max_attempts: u32,
    /// Earliest claim time. Enqueue sets it to now unless delayed.
    pub scheduled_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub last_error: Option<String>,
    /// Worker currently holding the claim, while `Running`.
    pub claimed_by: Option<WorkerId>,
    /// Optional dedup key; at most one active job may hold a given key.
    pub idempotency_key: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Job {
    /// Transition to Running under a worker's claim.
    pub fn claim(mut self, worker: WorkerId, now: i64) -> Job {
        self.status = JobStatus::Running;
        self.claimed_by = Some(worker);
        self.started_at = Some(now);
        self.updated_at = now;
        self
    }

    /// Transition to Completed.
    pub fn complete(mut self, now: i64) -> Job {
        self.status = JobStatus::Completed;
        self.completed_at = Some(now);
        self.claimed_by = None;
        self.updated_at = now;
        self
    }

    /// Record a failure and reschedule for a later attempt.
    pub fn reschedule(mut self, error: String, retry_at: i64, now: i64) -> Job {
        self.status = JobStatus::Pending;
        self.attempts += 1;
        self.last_error = Some(error);
        self.scheduled_at = retry_at;
        self.started_at = None;
        self.claimed_by = None;
        self.updated_at = now;
        self
    }

    /// Record a permanent failure. No further retries.
    pub fn fail_permanently(mut self, error: String, now: i64) -> Job {
        self.status = JobStatus::Failed;
        self.attempts += 1;
        self.last_error = Some(error);
        self.completed_at = Some(now);
        self.claimed_by = None;
        self.updated_at = now;
        self
    }

    /// Cancel a job that has not been claimed yet.
    pub fn cancel(mut self, now: i64) -> Job {
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(now);
        self.updated_at = now;
        self
    }

    /// Whether another retry is allowed after one more failure.
    pub fn can_retry(&self) -> bool {
        self.attempts + 1 < self.max_attempts
    }
}

/// Options accepted at enqueue time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobOptions {
    pub priority: Option<i32>,
    /// Delay the first claim until this time (epoch ms).
    pub scheduled_at: Option<i64>,
    pub max_attempts: Option<u32>,
    pub idempotency_key: Option<String>,
}

/// Filter for job listing queries.
#[derive(Debug, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub kind: Option<JobKind>,
    pub pod_id: Option<PodId>,
    pub tenant_id: Option<TenantId>,
    pub limit: Option<usize>,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            status: None,
            kind: None,
            pod_id: None,
            tenant_id: None,
            limit: Some(100),
        }
    }
}

// Storable implementations for EntityStore support
impl Storable for Job {}
