//! Job registry.
//!
//! Central registry mapping `JobKind` to executor implementations.
//!
//! ## Type erasure
//!
//! Two layers:
//! 1. `JobExecutor<Payload = T>` - type-safe trait with associated types
//! 2. `DynJobExecutor` - type-erased trait stored in the DashMap
//!
//! Registration is type-safe; at dispatch time the erased layer decodes the
//! payload from the job row, validates it, and calls the typed executor.

use super::executor_trait::{JobContext, JobExecutor, JobOutcome, JobPayload};
use crate::app_context::AppContext;
use crate::error::CoreError;
use async_trait::async_trait;
use cloudpods_commons::models::{Job, JobKind};
use dashmap::DashMap;
use std::sync::Arc;

/// Type-erased job executor for heterogeneous storage.
#[async_trait]
pub(crate) trait DynJobExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decode the payload, validate it, build a typed context, dispatch.
    async fn execute_dyn(
        &self,
        app_ctx: Arc<AppContext>,
        job: &Job,
    ) -> Result<JobOutcome, CoreError>;

    async fn cancel_dyn(&self, app_ctx: Arc<AppContext>, job: &Job) -> Result<(), CoreError>;
}

fn decode_payload<T: JobPayload>(job: &Job) -> Result<T, CoreError> {
    let payload_json = job
        .payload
        .as_ref()
        .ok_or_else(|| CoreError::Payload(format!("job {} has no payload", job.job_id)))?;

    let payload: T = serde_json::from_str(payload_json)
        .map_err(|e| CoreError::Payload(format!("failed to decode payload: {}", e)))?;

    payload.validate()?;
    Ok(payload)
}

/// Bridge from the typed `JobExecutor<T>` to the erased `DynJobExecutor`.
#[async_trait]
impl<T, E> DynJobExecutor for E
where
    T: JobPayload,
    E: JobExecutor<Payload = T>,
{
    fn name(&self) -> &'static str {
        JobExecutor::name(self)
    }

    async fn execute_dyn(
        &self,
        app_ctx: Arc<AppContext>,
        job: &Job,
    ) -> Result<JobOutcome, CoreError> {
        let payload = decode_payload::<T>(job)?;
        let ctx = JobContext::new(
            app_ctx,
            job.job_id.clone(),
            job.tenant_id.clone(),
            payload,
        );
        self.execute(&ctx).await
    }

    async fn cancel_dyn(&self, app_ctx: Arc<AppContext>, job: &Job) -> Result<(), CoreError> {
        let payload = decode_payload::<T>(job)?;
        let ctx = JobContext::new(
            app_ctx,
            job.job_id.clone(),
            job.tenant_id.clone(),
            payload,
        );
        self.cancel(&ctx).await
    }
}

/// Registry of job executors keyed by kind.
///
/// DashMap gives lock-free concurrent lookups from worker tasks. Stores
/// type-erased `Arc<dyn DynJobExecutor>` but registration stays type-safe
/// through `register<E: JobExecutor>()`.
pub struct JobRegistry {
    executors: DashMap<JobKind, Arc<dyn DynJobExecutor>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            executors: DashMap::new(),
        }
    }

    /// Register a job executor.
    ///
    /// # Panics
    /// Panics if an executor for this kind is already registered. Wiring
    /// runs once at startup, so a duplicate is a programming error.
    pub fn register<E>(&self, executor: Arc<E>)
    where
        E: JobExecutor + 'static,
    {
        let kind = executor.kind();
        if self.executors.contains_key(&kind) {
            panic!("Executor for job kind '{}' is already registered", kind);
        }
        self.executors.insert(kind, executor);
    }

    /// Register an executor, replacing any existing one. Test-only.
    #[cfg(test)]
    pub(crate) fn register_or_replace<E>(&self, executor: Arc<E>) -> Option<Arc<dyn DynJobExecutor>>
    where
        E: JobExecutor + 'static,
    {
        let kind = executor.kind();
        self.executors.insert(kind, executor)
    }

    /// Execute a job through its registered executor.
    ///
    /// # Errors
    /// `NotFound` when no executor is registered for the job's kind; the
    /// coordinator fails such jobs immediately.
    pub async fn execute(
        &self,
        app_ctx: Arc<AppContext>,
        job: &Job,
    ) -> Result<JobOutcome, CoreError> {
        let executor = self.executors.get(&job.kind).ok_or_else(|| {
            CoreError::NotFound(format!("No executor registered for job kind '{}'", job.kind))
        })?;

        executor.execute_dyn(app_ctx, job).await
    }

    /// Cancel a running job through its registered executor.
    pub async fn cancel(&self, app_ctx: Arc<AppContext>, job: &Job) -> Result<(), CoreError> {
        let executor = self.executors.get(&job.kind).ok_or_else(|| {
            CoreError::NotFound(format!("No executor registered for job kind '{}'", job.kind))
        })?;

        executor.cancel_dyn(app_ctx, job).await
    }

    pub fn contains(&self, kind: &JobKind) -> bool {
        self.executors.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    pub fn kinds(&self) -> Vec<JobKind> {
        self.executors.iter().map(|entry| *entry.key()).collect()
    }

    pub fn executor_name(&self, kind: &JobKind) -> Option<&'static str> {
        self.executors.get(kind).map(|e| e.name())
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{test_app_context, test_job};
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Serialize, Deserialize)]
    struct MockPayload {
        value: i32,
    }

    impl JobPayload for MockPayload {
        fn validate(&self) -> Result<(), CoreError> {
            if self.value < 0 {
                return Err(CoreError::Payload("value must be >= 0".to_string()));
            }
            Ok(())
        }
    }

    struct MockExecutor {
        kind: JobKind,
    }

    #[async_trait]
    impl JobExecutor for MockExecutor {
        type Payload = MockPayload;

        fn kind(&self) -> JobKind {
            self.kind
        }

        fn name(&self) -> &'static str {
            "MockExecutor"
        }

        async fn execute(
            &self,
            ctx: &JobContext<Self::Payload>,
        ) -> Result<JobOutcome, CoreError> {
            Ok(JobOutcome::Completed {
                message: Some(format!("value={}", ctx.payload().value)),
            })
        }
    }

    #[test]
    fn test_register_and_contains() {
        let registry = JobRegistry::new();
        registry.register(Arc::new(MockExecutor {
            kind: JobKind::Provision,
        }));

        assert!(registry.contains(&JobKind::Provision));
        assert!(!registry.contains(&JobKind::Suspend));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.executor_name(&JobKind::Provision),
            Some("MockExecutor")
        );
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_duplicate_registration_panics() {
        let registry = JobRegistry::new();
        registry.register(Arc::new(MockExecutor {
            kind: JobKind::Provision,
        }));
        registry.register(Arc::new(MockExecutor {
            kind: JobKind::Provision,
        }));
    }

    #[test]
    fn test_register_or_replace() {
        let registry = JobRegistry::new();
        let old = registry.register_or_replace(Arc::new(MockExecutor {
            kind: JobKind::Provision,
        }));
        assert!(old.is_none());

        let old = registry.register_or_replace(Arc::new(MockExecutor {
            kind: JobKind::Provision,
        }));
        assert!(old.is_some());
    }

    #[tokio::test]
    async fn test_execute_dispatches_with_decoded_payload() {
        let app_ctx = test_app_context();
        let registry = JobRegistry::new();
        registry.register(Arc::new(MockExecutor {
            kind: JobKind::Provision,
        }));

        let job = test_job(JobKind::Provision, r#"{"value": 42}"#);
        let outcome = registry.execute(app_ctx, &job).await.unwrap();
        match outcome {
            JobOutcome::Completed { message } => {
                assert_eq!(message, Some("value=42".to_string()));
            }
            _ => panic!("expected Completed"),
        }
    }

    #[tokio::test]
    async fn test_execute_unknown_kind_is_not_found() {
        let app_ctx = test_app_context();
        let registry = JobRegistry::new();

        let job = test_job(JobKind::Provision, r#"{"value": 1}"#);
        let err = registry.execute(app_ctx, &job).await.unwrap_err();
        assert!(err.to_string().contains("No executor registered"));
    }

    #[tokio::test]
    async fn test_execute_invalid_payload_is_payload_error() {
        let app_ctx = test_app_context();
        let registry = JobRegistry::new();
        registry.register(Arc::new(MockExecutor {
            kind: JobKind::Provision,
        }));

        let job = test_job(JobKind::Provision, r#"{"value": -5}"#);
        let err = registry.execute(app_ctx, &job).await.unwrap_err();
        assert!(matches!(err, CoreError::Payload(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_kinds_listing() {
        let registry = JobRegistry::new();
        registry.register(Arc::new(MockExecutor {
            kind: JobKind::Provision,
        }));
        registry.register(Arc::new(MockExecutor {
            kind: JobKind::Heal,
        }));

        let kinds = registry.kinds();
        assert_eq!(kinds.len(), 2);
        assert!(kinds.contains(&JobKind::Provision));
        assert!(kinds.contains(&JobKind::Heal));
    }
}
