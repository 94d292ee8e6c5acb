//! Job executor framework.
//!
//! Type-safe job execution:
//! - `JobPayload` trait for per-kind payload structs with validation
//! - `JobContext<T>` carrying the app context and the decoded payload
//! - `JobExecutor` trait with an associated payload type
//! - `JobOutcome` reported back to the coordinator, which owns scheduling
//!
//! Executors never touch the job row. They report `Completed`, `Retry` or
//! `Fatal`; the coordinator maps that onto the job store (complete,
//! reschedule with backoff, or permanent failure).

use crate::app_context::AppContext;
use crate::error::CoreError;
use cloudpods_commons::models::JobKind;
use cloudpods_commons::{JobId, TenantId};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between the coordinator and a
/// running executor.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// What an executor reports after one attempt.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// Attempt succeeded.
    Completed { message: Option<String> },
    /// Transient failure; the coordinator reschedules with backoff while
    /// the retry budget lasts.
    Retry { error: String },
    /// Permanent failure; no retry can succeed.
    Fatal { error: String },
}

impl JobOutcome {
    /// Classify a domain error: transient becomes `Retry`, permanent `Fatal`.
    pub fn from_error(error: CoreError) -> JobOutcome {
        if error.is_transient() {
            JobOutcome::Retry {
                error: error.to_string(),
            }
        } else {
            JobOutcome::Fatal {
                error: error.to_string(),
            }
        }
    }

    /// Same classification with the failing step named, so a multi-step
    /// handler's error is attributable to one step.
    pub fn from_step_error(step: &str, error: CoreError) -> JobOutcome {
        if error.is_transient() {
            JobOutcome::Retry {
                error: format!("{}: {}", step, error),
            }
        } else {
            JobOutcome::Fatal {
                error: format!("{}: {}", step, error),
            }
        }
    }
}

/// Trait for typed job payloads.
///
/// Payloads are stored as JSON text on the job row and decoded once per
/// attempt before dispatch.
pub trait JobPayload:
    Serialize + for<'de> Deserialize<'de> + Clone + Send + Sync + 'static
{
    /// Validate the payload before execution. Invalid payloads fail the
    /// job immediately; they never become valid by retrying.
    fn validate(&self) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Context passed to executors: app services, identity of the job, and the
/// decoded payload.
#[derive(Clone)]
pub struct JobContext<T: JobPayload> {
    pub app_ctx: Arc<AppContext>,
    pub cancellation_token: CancellationToken,
    pub job_id: JobId,
    pub tenant_id: TenantId,
    payload: T,
}

impl<T: JobPayload> JobContext<T> {
    pub fn new(app_ctx: Arc<AppContext>, job_id: JobId, tenant_id: TenantId, payload: T) -> Self {
        Self {
            app_ctx,
            cancellation_token: CancellationToken::new(),
            job_id,
            tenant_id,
            payload,
        }
    }

    pub fn with_cancellation(
        app_ctx: Arc<AppContext>,
        job_id: JobId,
        tenant_id: TenantId,
        payload: T,
        token: CancellationToken,
    ) -> Self {
        Self {
            app_ctx,
            cancellation_token: token,
            job_id,
            tenant_id,
            payload,
        }
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Log debug message with `[job_id]` prefix.
    pub fn log_debug(&self, message: &str) {
        debug!("[{}] {}", self.job_id, message);
    }

    /// Log info message with `[job_id]` prefix.
    pub fn log_info(&self, message: &str) {
        info!("[{}] {}", self.job_id, message);
    }

    /// Log warning message with `[job_id]` prefix.
    pub fn log_warn(&self, message: &str) {
        warn!("[{}] {}", self.job_id, message);
    }

    /// Log error message with `[job_id]` prefix.
    pub fn log_error(&self, message: &str) {
        error!("[{}] {}", self.job_id, message);
    }

    pub fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Trait for typed job executors.
///
/// One implementation per `JobKind`; the associated `Payload` type pins the
/// payload struct at compile time.
#[async_trait::async_trait]
pub trait JobExecutor: Send + Sync {
    type Payload: JobPayload;

    /// The job kind this executor handles.
    fn kind(&self) -> JobKind;

    /// Executor name for logging.
    fn name(&self) -> &'static str;

    /// Run one attempt. Domain failures are reported through the returned
    /// `JobOutcome`; an `Err` is reserved for unexpected infrastructure
    /// failures and fails the job.
    async fn execute(&self, ctx: &JobContext<Self::Payload>) -> Result<JobOutcome, CoreError>;

    /// Called when cancellation is requested for a running job.
    async fn cancel(&self, ctx: &JobContext<Self::Payload>) -> Result<(), CoreError> {
        ctx.log_warn("Cancel not implemented for this executor");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::test_app_context;

    #[derive(Clone, Serialize, Deserialize)]
    struct DummyPayload;
    impl JobPayload for DummyPayload {}

    #[test]
    fn test_cancellation_token() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());

        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_outcome_variants() {
        let outcome = JobOutcome::Retry {
            error: "host unreachable".to_string(),
        };
        match outcome {
            JobOutcome::Retry { error } => assert_eq!(error, "host unreachable"),
            _ => panic!("expected Retry"),
        }
    }

    #[test]
    fn test_outcome_classification() {
        use crate::hypervisor::HypervisorError;

        let outcome = JobOutcome::from_error(CoreError::Hypervisor(
            HypervisorError::Unavailable("host unreachable".to_string()),
        ));
        assert!(matches!(outcome, JobOutcome::Retry { .. }));

        let outcome = JobOutcome::from_error(CoreError::InvalidTransition {
            resource: "pod".to_string(),
            from: "deleting".to_string(),
            to: "active".to_string(),
        });
        assert!(matches!(outcome, JobOutcome::Fatal { .. }));
    }

    #[test]
    fn test_step_error_names_the_step() {
        use crate::dns::DnsError;

        let outcome = JobOutcome::from_step_error(
            "dns",
            CoreError::Dns(DnsError::Unavailable("zone api down".to_string())),
        );
        match outcome {
            JobOutcome::Retry { error } => {
                assert!(error.starts_with("dns: "));
                assert!(error.contains("zone api down"));
            }
            _ => panic!("expected Retry"),
        }
    }

    #[tokio::test]
    async fn test_job_context_logging() {
        let app_ctx = test_app_context();
        let ctx = JobContext::new(
            app_ctx,
            JobId::new("PR-abc123def456"),
            TenantId::new("tenant-1"),
            DummyPayload,
        );

        // Should not panic
        ctx.log_debug("debug message");
        ctx.log_info("info message");
        ctx.log_warn("warn message");
        ctx.log_error("error message");
    }

    #[test]
    fn test_now_millis() {
        assert!(JobContext::<DummyPayload>::now_millis() > 0);
    }
}
