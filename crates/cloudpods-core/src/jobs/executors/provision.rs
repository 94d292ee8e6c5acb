//! Provision job executor.
//!
//! Drives a pod from `pending` through `provisioning` to `active`:
//! allocate an instance, attach volumes, register DNS, apply the default
//! security group. The step sequence lives in
//! `LifecycleManager::execute_provision`; each step failure is attributed
//! to the step that raised it so retries resume meaningfully.

use crate::error::CoreError;
use crate::jobs::executor_trait::{JobContext, JobExecutor, JobOutcome};
use crate::jobs::payloads::ProvisionPayload;
use async_trait::async_trait;
use cloudpods_commons::models::JobKind;

pub struct ProvisionExecutor;

impl ProvisionExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProvisionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobExecutor for ProvisionExecutor {
    type Payload = ProvisionPayload;

    fn kind(&self) -> JobKind {
        JobKind::Provision
    }

    fn name(&self) -> &'static str {
        "ProvisionExecutor"
    }

    async fn execute(&self, ctx: &JobContext<Self::Payload>) -> Result<JobOutcome, CoreError> {
        match ctx.app_ctx.lifecycle().execute_provision(ctx).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Ok(JobOutcome::from_error(e)),
        }
    }
}
