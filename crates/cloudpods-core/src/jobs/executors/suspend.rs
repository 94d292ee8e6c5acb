//! Suspend job executor.

use crate::error::CoreError;
use crate::jobs::executor_trait::{JobContext, JobExecutor, JobOutcome};
use crate::jobs::payloads::SuspendPayload;
use async_trait::async_trait;
use cloudpods_commons::models::JobKind;

/// Stops a pod's instance and moves the row from `active` to `suspended`.
pub struct SuspendExecutor;

impl SuspendExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SuspendExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobExecutor for SuspendExecutor {
    type Payload = SuspendPayload;

    fn kind(&self) -> JobKind {
        JobKind::Suspend
    }

    fn name(&self) -> &'static str {
        "SuspendExecutor"
    }

    async fn execute(&self, ctx: &JobContext<Self::Payload>) -> Result<JobOutcome, CoreError> {
        match ctx.app_ctx.lifecycle().execute_suspend(ctx).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Ok(JobOutcome::from_error(e)),
        }
    }
}
