//! Delete job executor.
//!
//! Teardown is ordered so that repeated attempts converge: DNS records and
//! security group assignments go first, then volumes, then the instance,
//! then the pod row itself.

use crate::error::CoreError;
use crate::jobs::executor_trait::{JobContext, JobExecutor, JobOutcome};
use crate::jobs::payloads::DeletePayload;
use async_trait::async_trait;
use cloudpods_commons::models::JobKind;

pub struct DeleteExecutor;

impl DeleteExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DeleteExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobExecutor for DeleteExecutor {
    type Payload = DeletePayload;

    fn kind(&self) -> JobKind {
        JobKind::Delete
    }

    fn name(&self) -> &'static str {
        "DeleteExecutor"
    }

    async fn execute(&self, ctx: &JobContext<Self::Payload>) -> Result<JobOutcome, CoreError> {
        match ctx.app_ctx.lifecycle().execute_delete(ctx).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Ok(JobOutcome::from_error(e)),
        }
    }
}
