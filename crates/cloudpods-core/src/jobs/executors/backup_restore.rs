//! Backup restore executor.

use crate::error::CoreError;
use crate::jobs::executor_trait::{JobContext, JobExecutor, JobOutcome};
use crate::jobs::payloads::BackupRestorePayload;
use async_trait::async_trait;
use cloudpods_commons::models::JobKind;

/// Restores a pod from a completed backup run's snapshot.
pub struct BackupRestoreExecutor;

impl BackupRestoreExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BackupRestoreExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobExecutor for BackupRestoreExecutor {
    type Payload = BackupRestorePayload;

    fn kind(&self) -> JobKind {
        JobKind::BackupRestore
    }

    fn name(&self) -> &'static str {
        "BackupRestoreExecutor"
    }

    async fn execute(&self, ctx: &JobContext<Self::Payload>) -> Result<JobOutcome, CoreError> {
        match ctx.app_ctx.backups().execute_restore(ctx).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Ok(JobOutcome::from_error(e)),
        }
    }
}
