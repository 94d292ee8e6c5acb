//! Backup run executor.
//!
//! The run row is created before the job is enqueued; the executor settles
//! it (Completed or Failed) through `BackupManager::execute_run` and prunes
//! old runs past the policy's retention count.

use crate::error::CoreError;
use crate::jobs::executor_trait::{JobContext, JobExecutor, JobOutcome};
use crate::jobs::payloads::BackupRunPayload;
use async_trait::async_trait;
use cloudpods_commons::models::JobKind;

pub struct BackupRunExecutor;

impl BackupRunExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BackupRunExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobExecutor for BackupRunExecutor {
    type Payload = BackupRunPayload;

    fn kind(&self) -> JobKind {
        JobKind::BackupRun
    }

    fn name(&self) -> &'static str {
        "BackupRunExecutor"
    }

    async fn execute(&self, ctx: &JobContext<Self::Payload>) -> Result<JobOutcome, CoreError> {
        match ctx.app_ctx.backups().execute_run(ctx).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Ok(JobOutcome::from_error(e)),
        }
    }
}
