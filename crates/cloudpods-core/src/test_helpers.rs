//! Test fixtures for this crate's unit tests and for dependent crates'
//! integration tests.
//!
//! Everything builds on the in-memory storage backend and the mock
//! infrastructure clients, so tests run without a hypervisor fleet, a DNS
//! zone, or the network.

use crate::app_context::AppContext;
use crate::dns::MockDns;
use crate::hypervisor::MockHypervisor;
use crate::transport::MockTransport;
use cloudpods_commons::models::{Job, JobKind, JobStatus};
use cloudpods_commons::{now_millis, JobId, TenantId};
use cloudpods_configs::OrchestratorConfig;
use cloudpods_store::test_utils::InMemoryBackend;
use cloudpods_store::StorageBackend;
use std::sync::Arc;

/// Fully wired application context plus handles to the mock infrastructure
/// clients, so tests can script failures and inspect calls.
pub struct TestHarness {
    pub app_ctx: Arc<AppContext>,
    pub hypervisor: Arc<MockHypervisor>,
    pub dns: Arc<MockDns>,
    pub transport: Arc<MockTransport>,
}

/// Build a context over in-memory storage with default (healthy) mocks.
pub fn test_harness() -> TestHarness {
    test_harness_with_transport(Arc::new(MockTransport::new()))
}

/// Same, with a caller-scripted delivery transport.
pub fn test_harness_with_transport(transport: Arc<MockTransport>) -> TestHarness {
    let backend: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
    let hypervisor = Arc::new(MockHypervisor::new());
    let dns = Arc::new(MockDns::new());
    let app_ctx = AppContext::init(
        backend,
        OrchestratorConfig::default(),
        hypervisor.clone(),
        dns.clone(),
        transport.clone(),
    );
    TestHarness {
        app_ctx,
        hypervisor,
        dns,
        transport,
    }
}

/// Context only, for tests that never script the mocks.
pub fn test_app_context() -> Arc<AppContext> {
    test_harness().app_ctx
}

/// Context with a scripted delivery transport, for webhook tests.
pub fn test_app_context_with_transport(transport: Arc<MockTransport>) -> Arc<AppContext> {
    test_harness_with_transport(transport).app_ctx
}

/// Pending job row for registry and dispatch tests. The payload is stored
/// verbatim, so malformed JSON can be injected deliberately.
pub fn test_job(kind: JobKind, payload_json: &str) -> Job {
    let now = now_millis();
    Job {
        job_id: JobId::new(format!("{}-test00000001", kind.short_prefix())),
        kind,
        queue: "default".to_string(),
        tenant_id: TenantId::new("t1"),
        pod_id: None,
        status: JobStatus::Pending,
        payload: Some(payload_json.to_string()),
        priority: 0,
        attempts: 0,
        max_attempts: 3,
        scheduled_at: now,
        started_at: None,
        completed_at: None,
        last_error: None,
        claimed_by: None,
        idempotency_key: None,
        created_at: now,
        updated_at: now,
    }
}
