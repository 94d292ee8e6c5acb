//! Webhook delivery executor.
//!
//! One job drives one attempt. An HTTP failure is recorded on the delivery
//! row and the next attempt gets its own job at the backoff time, so the
//! driving job still completes; `JobOutcome::Retry` is reserved for
//! infrastructure errors where nothing could be recorded. The scheduler's
//! reconcile sweep re-creates driver jobs lost to a crash.

use crate::error::CoreError;
use crate::jobs::executor_trait::{JobContext, JobExecutor, JobOutcome};
use crate::jobs::payloads::DeliverPayload;
use crate::jobs::retry::backoff_ms;
use crate::webhooks::signature_header;
use async_trait::async_trait;
use cloudpods_commons::models::{DeliveryStatus, JobKind, WebhookDelivery};
use cloudpods_commons::now_millis;

pub struct DeliverWebhookExecutor;

impl DeliverWebhookExecutor {
    pub fn new() -> Self {
        Self
    }

    async fn attempt(&self, ctx: &JobContext<DeliverPayload>) -> Result<JobOutcome, CoreError> {
        let delivery_id = &ctx.payload().delivery_id;
        let deliveries = ctx.app_ctx.system().deliveries();

        let delivery = match deliveries.get_delivery(delivery_id)? {
            Some(delivery) => delivery,
            None => {
                return Ok(JobOutcome::Fatal {
                    error: format!("Delivery {} not found", delivery_id),
                });
            }
        };
        if delivery.status.is_terminal() {
            ctx.log_debug(&format!(
                "Delivery {} already settled as '{}'",
                delivery_id, delivery.status
            ));
            return Ok(JobOutcome::Completed { message: None });
        }

        let webhook = ctx
            .app_ctx
            .system()
            .webhooks()
            .get_webhook(&delivery.webhook_id)?;
        let webhook = match webhook {
            Some(webhook) if webhook.is_active => webhook,
            Some(_) => return self.settle_unreachable(ctx, &delivery, "endpoint is disabled"),
            None => return self.settle_unreachable(ctx, &delivery, "endpoint no longer exists"),
        };

        let headers = [
            ("Content-Type".to_string(), "application/json".to_string()),
            (
                "X-Signature".to_string(),
                signature_header(&webhook.secret, &delivery.body),
            ),
            (
                "X-Event-Type".to_string(),
                delivery.event_type.as_str().to_string(),
            ),
            (
                "X-Delivery-Id".to_string(),
                delivery.delivery_id.to_string(),
            ),
        ];

        ctx.log_debug(&format!(
            "Posting delivery {} to {} (attempt {})",
            delivery_id,
            webhook.url,
            delivery.attempts + 1
        ));

        let response = ctx
            .app_ctx
            .transport()
            .post(&webhook.url, &headers, &delivery.body)
            .await;

        match response {
            Ok(result) if result.is_success() => {
                deliveries.record_attempt_success(delivery_id, result.status, now_millis())?;
                ctx.log_info(&format!(
                    "Delivery {} delivered on attempt {} (HTTP {})",
                    delivery_id,
                    delivery.attempts + 1,
                    result.status
                ));
                Ok(JobOutcome::Completed {
                    message: Some(format!("HTTP {}", result.status)),
                })
            }
            Ok(result) => {
                self.record_failure(
                    ctx,
                    &delivery,
                    Some(result.status),
                    format!("HTTP {}", result.status),
                )
                .await
            }
            Err(e) => self.record_failure(ctx, &delivery, None, e.to_string()).await,
        }
    }

    /// The endpoint row is gone or disabled; no attempt can ever succeed.
    fn settle_unreachable(
        &self,
        ctx: &JobContext<DeliverPayload>,
        delivery: &WebhookDelivery,
        reason: &str,
    ) -> Result<JobOutcome, CoreError> {
        // Zero budget settles the row as PermanentlyFailed.
        ctx.app_ctx.system().deliveries().record_attempt_failure(
            &delivery.delivery_id,
            None,
            format!("Webhook {} {}", delivery.webhook_id, reason),
            0,
            0,
            now_millis(),
        )?;
        ctx.log_warn(&format!(
            "Delivery {} permanently failed: webhook {} {}",
            delivery.delivery_id, delivery.webhook_id, reason
        ));
        Ok(JobOutcome::Completed { message: None })
    }

    async fn record_failure(
        &self,
        ctx: &JobContext<DeliverPayload>,
        delivery: &WebhookDelivery,
        http_status: Option<u16>,
        error: String,
    ) -> Result<JobOutcome, CoreError> {
        let app_ctx = &ctx.app_ctx;
        let tenant = Some(&delivery.tenant_id);
        let settings = app_ctx.settings();
        let max_attempts = settings.webhook_max_attempts(tenant);
        let base = settings.webhook_initial_retry_delay_seconds(tenant);
        let cap = settings.webhook_max_retry_delay_seconds(tenant);

        let now = now_millis();
        // First failure waits the base delay: the exponent is the attempt
        // count before this failure is recorded.
        let next_retry_at = now + backoff_ms(base, cap, delivery.attempts);

        let updated = app_ctx.system().deliveries().record_attempt_failure(
            &delivery.delivery_id,
            http_status,
            error.clone(),
            max_attempts,
            next_retry_at,
            now,
        )?;

        if updated.status == DeliveryStatus::PermanentlyFailed {
            ctx.log_error(&format!(
                "Delivery {} permanently failed after {} attempts: {}",
                delivery.delivery_id, updated.attempts, error
            ));
            return Ok(JobOutcome::Completed {
                message: Some(format!("delivery permanently failed: {}", error)),
            });
        }

        ctx.log_warn(&format!(
            "Delivery {} attempt {}/{} failed: {}; next attempt at {}",
            delivery.delivery_id, updated.attempts, max_attempts, error, next_retry_at
        ));
        app_ctx
            .webhooks()
            .enqueue_delivery_job(&updated, next_retry_at)
            .await?;
        Ok(JobOutcome::Completed {
            message: Some(format!("attempt {} failed; retry scheduled", updated.attempts)),
        })
    }
}

impl Default for DeliverWebhookExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobExecutor for DeliverWebhookExecutor {
    type Payload = DeliverPayload;

    fn kind(&self) -> JobKind {
        JobKind::WebhookDeliver
    }

    fn name(&self) -> &'static str {
        "DeliverWebhookExecutor"
    }

    async fn execute(&self, ctx: &JobContext<Self::Payload>) -> Result<JobOutcome, CoreError> {
        match self.attempt(ctx).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Ok(JobOutcome::from_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_context::AppContext;
    use crate::test_helpers::test_app_context_with_transport;
    use crate::transport::MockTransport;
    use cloudpods_commons::models::{DeliveryStatus, EventType, Webhook};
    use cloudpods_commons::{DeliveryId, EventId, JobId, TenantId, WebhookId};
    use std::sync::Arc;

    fn seed_webhook(app_ctx: &Arc<AppContext>, active: bool) -> Webhook {
        let now = now_millis();
        app_ctx
            .system()
            .webhooks()
            .create_webhook(Webhook {
                webhook_id: WebhookId::new("wh-1"),
                tenant_id: TenantId::new("t1"),
                url: "http://endpoint.test/hook".to_string(),
                secret: "s3cret".to_string(),
                events: vec!["*".to_string()],
                is_active: active,
                created_at: now,
                updated_at: now,
            })
            .unwrap()
    }

    fn seed_delivery(app_ctx: &Arc<AppContext>, status: DeliveryStatus) -> WebhookDelivery {
        let now = now_millis();
        app_ctx
            .system()
            .deliveries()
            .create_delivery(WebhookDelivery {
                delivery_id: DeliveryId::new("dl-1"),
                webhook_id: WebhookId::new("wh-1"),
                tenant_id: TenantId::new("t1"),
                event_id: EventId::new("EV-1"),
                event_type: EventType::PodProvisioned,
                body: r#"{"eventId":"EV-1","eventType":"pod.provisioned"}"#.to_string(),
                status,
                attempts: 0,
                http_status: None,
                next_retry_at: None,
                last_error: None,
                job_id: None,
                created_at: now,
                updated_at: now,
            })
            .unwrap()
    }

    async fn run_executor(app_ctx: &Arc<AppContext>, delivery_id: &str) -> JobOutcome {
        let ctx = JobContext::new(
            app_ctx.clone(),
            JobId::new("WD-test00000001"),
            TenantId::new("t1"),
            DeliverPayload {
                delivery_id: DeliveryId::new(delivery_id),
            },
        );
        DeliverWebhookExecutor::new()
            .execute(&ctx)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_success_settles_delivery_and_signs_request() {
        let transport = Arc::new(MockTransport::with_statuses(&[200]));
        let app_ctx = test_app_context_with_transport(transport.clone());
        seed_webhook(&app_ctx, true);
        seed_delivery(&app_ctx, DeliveryStatus::Pending);

        let outcome = run_executor(&app_ctx, "dl-1").await;
        assert!(matches!(outcome, JobOutcome::Completed { .. }));

        let delivery = app_ctx
            .system()
            .deliveries()
            .get_delivery(&DeliveryId::new("dl-1"))
            .unwrap()
            .unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Delivered);
        assert_eq!(delivery.attempts, 1);
        assert_eq!(delivery.http_status, Some(200));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "http://endpoint.test/hook");
        assert_eq!(requests[0].body, delivery.body);
        let signature = requests[0].header("X-Signature").unwrap();
        assert_eq!(signature, signature_header("s3cret", &delivery.body));
        assert!(signature.starts_with("sha256="));
    }

    #[tokio::test]
    async fn test_http_failure_schedules_followup_job() {
        let transport = Arc::new(MockTransport::with_statuses(&[500]));
        let app_ctx = test_app_context_with_transport(transport);
        seed_webhook(&app_ctx, true);
        seed_delivery(&app_ctx, DeliveryStatus::Pending);

        let before = now_millis();
        let outcome = run_executor(&app_ctx, "dl-1").await;
        assert!(matches!(outcome, JobOutcome::Completed { .. }));

        let delivery = app_ctx
            .system()
            .deliveries()
            .get_delivery(&DeliveryId::new("dl-1"))
            .unwrap()
            .unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Failed);
        assert_eq!(delivery.attempts, 1);
        assert_eq!(delivery.http_status, Some(500));
        let retry_at = delivery.next_retry_at.unwrap();
        assert!(retry_at >= before);

        // The next attempt is driven by its own job
        assert!(app_ctx
            .coordinator()
            .has_active_job_with_key("wd:dl-1:2")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_connection_error_counts_as_attempt() {
        let transport = Arc::new(MockTransport::new());
        transport.push_error("connection refused");
        let app_ctx = test_app_context_with_transport(transport);
        seed_webhook(&app_ctx, true);
        seed_delivery(&app_ctx, DeliveryStatus::Pending);

        run_executor(&app_ctx, "dl-1").await;

        let delivery = app_ctx
            .system()
            .deliveries()
            .get_delivery(&DeliveryId::new("dl-1"))
            .unwrap()
            .unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Failed);
        assert_eq!(delivery.attempts, 1);
        assert_eq!(delivery.http_status, None);
        assert!(delivery.last_error.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_terminal_delivery_short_circuits() {
        let transport = Arc::new(MockTransport::new());
        let app_ctx = test_app_context_with_transport(transport.clone());
        seed_webhook(&app_ctx, true);
        seed_delivery(&app_ctx, DeliveryStatus::Delivered);

        let outcome = run_executor(&app_ctx, "dl-1").await;
        assert!(matches!(outcome, JobOutcome::Completed { .. }));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_webhook_settles_permanently() {
        let transport = Arc::new(MockTransport::new());
        let app_ctx = test_app_context_with_transport(transport.clone());
        // No webhook row created
        seed_delivery(&app_ctx, DeliveryStatus::Pending);

        run_executor(&app_ctx, "dl-1").await;

        let delivery = app_ctx
            .system()
            .deliveries()
            .get_delivery(&DeliveryId::new("dl-1"))
            .unwrap()
            .unwrap();
        assert_eq!(delivery.status, DeliveryStatus::PermanentlyFailed);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_disabled_webhook_settles_permanently() {
        let transport = Arc::new(MockTransport::new());
        let app_ctx = test_app_context_with_transport(transport.clone());
        seed_webhook(&app_ctx, false);
        seed_delivery(&app_ctx, DeliveryStatus::Pending);

        run_executor(&app_ctx, "dl-1").await;

        let delivery = app_ctx
            .system()
            .deliveries()
            .get_delivery(&DeliveryId::new("dl-1"))
            .unwrap()
            .unwrap();
        assert_eq!(delivery.status, DeliveryStatus::PermanentlyFailed);
        assert!(delivery.last_error.unwrap().contains("disabled"));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_delivery_is_fatal() {
        let transport = Arc::new(MockTransport::new());
        let app_ctx = test_app_context_with_transport(transport);

        let outcome = run_executor(&app_ctx, "dl-missing").await;
        assert!(matches!(outcome, JobOutcome::Fatal { .. }));
    }
}
