//! Backup policy and run models.

use crate::ids::{BackupPolicyId, BackupRunId, PodId};
use crate::serialization::Storable;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum BackupType {
    Full,
    Incremental,
}

impl BackupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Full => "full",
            BackupType::Incremental => "incremental",
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recurring backup schedule for one pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct BackupPolicy {
    pub policy_id: BackupPolicyId,
    pub pod_id: PodId,
    pub backup_type: BackupType,
    pub interval_hours: u32,
    /// Completed runs kept per policy; older ones are pruned.
    pub retention_count: u32,
    pub is_active: bool,
    pub last_fired_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl BackupPolicy {
    /// Whether the schedule interval has elapsed since the last firing.
    pub fn is_due(&self, now: i64) -> bool {
        if !self.is_active {
            return false;
        }
        match self.last_fired_at {
            None => true,
            Some(last) => now - last >= self.interval_hours as i64 * 3_600_000,
        }
    }

    pub fn mark_fired(&mut self, now: i64) {
        self.last_fired_at = Some(now);
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum BackupRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl BackupRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupRunStatus::Pending => "pending",
            BackupRunStatus::Running => "running",
            BackupRunStatus::Completed => "completed",
            BackupRunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BackupRunStatus::Completed | BackupRunStatus::Failed)
    }
}

impl fmt::Display for BackupRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One execution of a backup policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct BackupRun {
    pub run_id: BackupRunId,
    pub policy_id: BackupPolicyId,
    pub pod_id: PodId,
    pub backup_type: BackupType,
    pub status: BackupRunStatus,
    pub size_mb: Option<u64>,
    /// Storage location of the finished artifact.
    pub location: Option<String>,
    pub error: Option<String>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub created_at: i64,
}

impl BackupRun {
    pub fn start(&mut self, now: i64) {
        self.status = BackupRunStatus::Running;
        self.started_at = Some(now);
    }

    pub fn complete(&mut self, size_mb: u64, location: String, now: i64) {
        self.status = BackupRunStatus::Completed;
        self.size_mb = Some(size_mb);
        self.location = Some(location);
        self.completed_at = Some(now);
    }

    pub fn fail(&mut self, error: String, now: i64) {
        self.status = BackupRunStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(now);
    }
}

// Storable implementations for EntityStore support
impl Storable for BackupPolicy {}
impl Storable for BackupRun {}
