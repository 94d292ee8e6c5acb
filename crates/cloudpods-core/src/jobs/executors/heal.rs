//! Heal job executor.
//!
//! Enqueued by the health checker when a pod fails consecutive checks.
//! Healing restarts the instance through the hypervisor and re-verifies the
//! provisioned resources; it never changes the pod's lifecycle state.

use crate::error::CoreError;
use crate::jobs::executor_trait::{JobContext, JobExecutor, JobOutcome};
use crate::jobs::payloads::HealPayload;
use async_trait::async_trait;
use cloudpods_commons::models::JobKind;

pub struct HealExecutor;

impl HealExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HealExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobExecutor for HealExecutor {
    type Payload = HealPayload;

    fn kind(&self) -> JobKind {
        JobKind::Heal
    }

    fn name(&self) -> &'static str {
        "HealExecutor"
    }

    async fn execute(&self, ctx: &JobContext<Self::Payload>) -> Result<JobOutcome, CoreError> {
        match ctx.app_ctx.lifecycle().execute_heal(ctx).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Ok(JobOutcome::from_error(e)),
        }
    }
}
