//! Resume job executor.

use crate::error::CoreError;
use crate::jobs::executor_trait::{JobContext, JobExecutor, JobOutcome};
use crate::jobs::payloads::ResumePayload;
use async_trait::async_trait;
use cloudpods_commons::models::JobKind;

/// Restarts a suspended pod's instance and moves the row back to `active`.
pub struct ResumeExecutor;

impl ResumeExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ResumeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobExecutor for ResumeExecutor {
    type Payload = ResumePayload;

    fn kind(&self) -> JobKind {
        JobKind::Resume
    }

    fn name(&self) -> &'static str {
        "ResumeExecutor"
    }

    async fn execute(&self, ctx: &JobContext<Self::Payload>) -> Result<JobOutcome, CoreError> {
        match ctx.app_ctx.lifecycle().execute_resume(ctx).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Ok(JobOutcome::from_error(e)),
        }
    }
}
