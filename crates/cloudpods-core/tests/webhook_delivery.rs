//! Webhook Delivery Integration Tests
//!
//! Retry behavior through the full publish-and-deliver stack against a
//! scripted transport:
//! - an endpoint answering 500, 500, 500, 200 ends Delivered after four
//!   attempts, each re-sending the body frozen at publish time with a
//!   valid signature, with exponentially growing gaps between attempts
//! - an endpoint that never recovers ends PermanentlyFailed once the
//!   attempt budget is spent, and no further job is scheduled
//! - a driver job lost to a crash is re-created by the retry sweep

use cloudpods_commons::ids::prefixed_id;
use cloudpods_commons::models::{
    DeliveryStatus, EventType, Job, JobFilter, JobKind, JobStatus, Webhook, WebhookDelivery,
};
use cloudpods_commons::{now_millis, DeliveryId, TenantId, WebhookId, WorkerId};
use cloudpods_core::app_context::AppContext;
use cloudpods_core::jobs::JobOutcome;
use cloudpods_core::test_helpers::{test_harness_with_transport, TestHarness};
use cloudpods_core::transport::MockTransport;
use cloudpods_core::webhooks::signature_header;
use serde_json::json;
use std::sync::Arc;

const SECRET: &str = "whsec_integration";

fn harness_with_statuses(statuses: &[u16]) -> TestHarness {
    test_harness_with_transport(Arc::new(MockTransport::with_statuses(statuses)))
}

fn seed_webhook(app_ctx: &Arc<AppContext>) -> Webhook {
    let now = now_millis();
    app_ctx
        .system()
        .webhooks()
        .create_webhook(Webhook {
            webhook_id: WebhookId::new(prefixed_id("WH")),
            tenant_id: TenantId::new("t1"),
            url: "https://hooks.example.test/cloudpods".to_string(),
            secret: SECRET.to_string(),
            events: vec!["*".to_string()],
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .unwrap()
}

async fn publish_event(app_ctx: &Arc<AppContext>) -> WebhookDelivery {
    let mut deliveries = app_ctx
        .webhooks()
        .publish(
            &TenantId::new("t1"),
            EventType::PodProvisioned,
            json!({"podId": "PD-123", "ipAddress": "10.0.0.7"}),
        )
        .await
        .unwrap();
    assert_eq!(deliveries.len(), 1);
    deliveries.remove(0)
}

fn get_delivery(app_ctx: &Arc<AppContext>, delivery_id: &DeliveryId) -> WebhookDelivery {
    app_ctx
        .system()
        .deliveries()
        .get_delivery(delivery_id)
        .unwrap()
        .unwrap()
}

/// Claim the next delivery job as of `at` and run one attempt.
///
/// Each attempt completes its own job even when the HTTP call fails; the
/// follow-up lives in a fresh job at the recorded retry time, so tests can
/// jump the clock forward instead of sleeping through backoff windows.
async fn run_attempt_at(app_ctx: &Arc<AppContext>, at: i64) -> Job {
    let job = app_ctx
        .system()
        .jobs()
        .claim_next("default", &WorkerId::new("WK-test-driver"), at)
        .unwrap()
        .expect("a delivery job should be claimable at this time");
    assert_eq!(job.kind, JobKind::WebhookDeliver);
    let outcome = app_ctx
        .job_registry()
        .execute(app_ctx.clone(), &job)
        .await
        .unwrap();
    assert!(matches!(outcome, JobOutcome::Completed { .. }));
    app_ctx.system().jobs().complete(&job.job_id, at).unwrap()
}

#[tokio::test]
async fn test_flaky_endpoint_delivers_after_exponential_retries() {
    let harness = harness_with_statuses(&[500, 500, 500, 200]);
    let app_ctx = &harness.app_ctx;
    seed_webhook(app_ctx);
    let published = publish_event(app_ctx).await;

    // Attempt 1 fails; backoff starts at the 60s base delay
    let before = now_millis();
    let coordinator = app_ctx.coordinator();
    assert!(coordinator.run_once_for_tests().await.unwrap());
    let after = now_millis();

    let mut delivery = get_delivery(app_ctx, &published.delivery_id);
    assert_eq!(delivery.status, DeliveryStatus::Failed);
    assert_eq!(delivery.attempts, 1);
    assert_eq!(delivery.http_status, Some(500));
    assert!(delivery.last_error.clone().unwrap().contains("HTTP 500"));
    let first_retry_at = delivery.next_retry_at.unwrap();
    assert!(first_retry_at >= before + 60_000 && first_retry_at <= after + 60_000);

    // Attempts 2 and 3 fail with doubled delays: 120s, then 240s
    let mut last_retry_at = first_retry_at;
    for expected_delay in [120_000, 240_000] {
        let before = now_millis();
        run_attempt_at(app_ctx, last_retry_at).await;
        let after = now_millis();

        delivery = get_delivery(app_ctx, &published.delivery_id);
        assert_eq!(delivery.status, DeliveryStatus::Failed);
        let retry_at = delivery.next_retry_at.unwrap();
        assert!(retry_at >= before + expected_delay && retry_at <= after + expected_delay);
        assert!(retry_at > last_retry_at);
        last_retry_at = retry_at;
    }

    // Attempt 4 succeeds and settles the row
    run_attempt_at(app_ctx, last_retry_at).await;
    delivery = get_delivery(app_ctx, &published.delivery_id);
    assert_eq!(delivery.status, DeliveryStatus::Delivered);
    assert_eq!(delivery.attempts, 4);
    assert_eq!(delivery.http_status, Some(200));

    // Every attempt re-sent the body frozen at publish, correctly signed
    let requests = harness.transport.requests();
    assert_eq!(requests.len(), 4);
    let expected_signature = signature_header(SECRET, &published.body);
    for request in &requests {
        assert_eq!(request.url, "https://hooks.example.test/cloudpods");
        assert_eq!(request.body, published.body);
        assert_eq!(request.header("X-Signature").unwrap(), expected_signature);
        assert_eq!(request.header("X-Event-Type").unwrap(), "pod.provisioned");
        assert_eq!(
            request.header("X-Delivery-Id").unwrap(),
            published.delivery_id.as_str()
        );
    }
    let body: serde_json::Value = serde_json::from_str(&published.body).unwrap();
    assert_eq!(body["eventType"], "pod.provisioned");
    assert_eq!(body["data"]["podId"], "PD-123");

    // Four driver jobs, one per attempt, all settled
    let jobs = coordinator
        .list_jobs(JobFilter {
            kind: Some(JobKind::WebhookDeliver),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(jobs.len(), 4);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Completed));
}

#[tokio::test]
async fn test_dead_endpoint_permanently_fails_after_budget() {
    let harness = harness_with_statuses(&[500, 500, 500, 500, 500]);
    let app_ctx = &harness.app_ctx;
    seed_webhook(app_ctx);
    let published = publish_event(app_ctx).await;

    assert!(app_ctx.coordinator().run_once_for_tests().await.unwrap());
    // Default budget is five attempts
    for _ in 0..4 {
        let delivery = get_delivery(app_ctx, &published.delivery_id);
        run_attempt_at(app_ctx, delivery.next_retry_at.unwrap()).await;
    }

    let delivery = get_delivery(app_ctx, &published.delivery_id);
    assert_eq!(delivery.status, DeliveryStatus::PermanentlyFailed);
    assert_eq!(delivery.attempts, 5);
    assert!(delivery.last_error.unwrap().contains("HTTP 500"));
    assert_eq!(harness.transport.request_count(), 5);

    // Nothing left in the queue, even arbitrarily far out
    let far_future = now_millis() + 365 * 24 * 3_600_000;
    assert!(app_ctx
        .system()
        .jobs()
        .claim_next("default", &WorkerId::new("WK-test-driver"), far_future)
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_lost_driver_job_is_recovered_by_retry_sweep() {
    let harness = harness_with_statuses(&[500, 200]);
    let app_ctx = &harness.app_ctx;
    seed_webhook(app_ctx);
    let published = publish_event(app_ctx).await;

    assert!(app_ctx.coordinator().run_once_for_tests().await.unwrap());
    let failed = get_delivery(app_ctx, &published.delivery_id);
    let retry_at = failed.next_retry_at.unwrap();

    // Simulate the follow-up job being lost to a crash
    let pending = app_ctx
        .coordinator()
        .list_jobs(JobFilter {
            kind: Some(JobKind::WebhookDeliver),
            status: Some(JobStatus::Pending),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    app_ctx
        .coordinator()
        .cancel_job(&pending[0].job_id)
        .await
        .unwrap();

    // The sweep at the retry time re-creates exactly one driver job
    let recovered = app_ctx.webhooks().enqueue_due_retries(retry_at).await.unwrap();
    assert_eq!(recovered, 1);
    let recovered = app_ctx.webhooks().enqueue_due_retries(retry_at).await.unwrap();
    assert_eq!(recovered, 0);

    run_attempt_at(app_ctx, retry_at).await;
    let delivery = get_delivery(app_ctx, &published.delivery_id);
    assert_eq!(delivery.status, DeliveryStatus::Delivered);
    assert_eq!(delivery.attempts, 2);
}
