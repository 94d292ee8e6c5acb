//! Event publishing and delivery fanout.
//!
//! `publish` freezes the request body once per event, then creates one
//! delivery row per subscribed endpoint, each driven by its own
//! `webhook.deliver` job. Retries re-send the frozen body unchanged even if
//! the underlying resource has moved on.

use crate::error::Result;
use crate::jobs::coordinator::WorkerCoordinator;
use crate::jobs::payloads::DeliverPayload;
use cloudpods_commons::ids::prefixed_id;
use cloudpods_commons::models::{
    DeliveryStatus, EventType, Job, JobKind, JobOptions, WebhookDelivery,
};
use cloudpods_commons::{now_millis, DeliveryId, EventId, TenantId};
use cloudpods_system::{DeliveriesProvider, WebhooksProvider};
use serde_json::json;
use std::sync::Arc;

/// Upper bound per reconcile sweep so one pass cannot monopolize the
/// scheduler tick.
const RETRY_SWEEP_BATCH: usize = 256;

pub struct WebhookPublisher {
    webhooks: Arc<WebhooksProvider>,
    deliveries: Arc<DeliveriesProvider>,
    coordinator: Arc<WorkerCoordinator>,
}

impl WebhookPublisher {
    pub fn new(
        webhooks: Arc<WebhooksProvider>,
        deliveries: Arc<DeliveriesProvider>,
        coordinator: Arc<WorkerCoordinator>,
    ) -> Self {
        Self {
            webhooks,
            deliveries,
            coordinator,
        }
    }

    /// Publish an event to every active subscriber in the tenant.
    ///
    /// Returns the created deliveries; an empty vec means no endpoint was
    /// subscribed. Publishing is fire-and-forget for callers: delivery
    /// failures surface on the delivery rows, never here.
    pub async fn publish(
        &self,
        tenant_id: &TenantId,
        event_type: EventType,
        data: serde_json::Value,
    ) -> Result<Vec<WebhookDelivery>> {
        let subscribers = self.webhooks.list_active_for_event(tenant_id, event_type)?;
        if subscribers.is_empty() {
            log::debug!(
                "No active subscriber for {} in tenant {}",
                event_type,
                tenant_id
            );
            return Ok(Vec::new());
        }

        let occurred = chrono::Utc::now();
        let now = occurred.timestamp_millis();
        let event_id = EventId::new(prefixed_id("EV"));
        // Frozen at publish time; every attempt re-sends these exact bytes
        let body = serde_json::to_string(&json!({
            "eventId": event_id.as_str(),
            "eventType": event_type.as_str(),
            "tenantId": tenant_id.as_str(),
            "occurredAt": occurred.to_rfc3339(),
            "data": data,
        }))?;

        let mut deliveries = Vec::with_capacity(subscribers.len());
        for webhook in subscribers {
            let delivery = self.deliveries.create_delivery(WebhookDelivery {
                delivery_id: DeliveryId::new(prefixed_id("DL")),
                webhook_id: webhook.webhook_id.clone(),
                tenant_id: tenant_id.clone(),
                event_id: event_id.clone(),
                event_type,
                body: body.clone(),
                status: DeliveryStatus::Pending,
                attempts: 0,
                http_status: None,
                next_retry_at: None,
                last_error: None,
                job_id: None,
                created_at: now,
                updated_at: now,
            })?;
            self.enqueue_delivery_job(&delivery, now).await?;
            deliveries.push(delivery);
        }

        log::info!(
            "Published {} ({}) to {} endpoint(s)",
            event_type,
            event_id,
            deliveries.len()
        );
        Ok(deliveries)
    }

    /// Enqueue the job that drives this delivery's next attempt.
    ///
    /// The idempotency key names the attempt, so a crash between recording
    /// a failure and enqueueing the follow-up heals through the reconcile
    /// sweep without double-driving.
    pub(crate) async fn enqueue_delivery_job(
        &self,
        delivery: &WebhookDelivery,
        scheduled_at: i64,
    ) -> Result<Job> {
        let payload = DeliverPayload {
            delivery_id: delivery.delivery_id.clone(),
        };
        let options = JobOptions {
            priority: None,
            scheduled_at: Some(scheduled_at),
            max_attempts: None,
            idempotency_key: Some(attempt_key(delivery)),
        };
        let job = self
            .coordinator
            .enqueue_typed(
                JobKind::WebhookDeliver,
                delivery.tenant_id.clone(),
                None,
                &payload,
                Some(options),
            )
            .await?;
        self.deliveries
            .attach_job(&delivery.delivery_id, job.job_id.clone(), now_millis())?;
        Ok(job)
    }

    /// Re-create driver jobs for failed deliveries whose retry time has
    /// passed. Normally a no-op; it exists for driver jobs lost to a crash.
    pub async fn enqueue_due_retries(&self, now: i64) -> Result<usize> {
        let due = self.deliveries.list_due_retries(now, Some(RETRY_SWEEP_BATCH))?;
        let mut recovered = 0;
        for delivery in due {
            if self
                .coordinator
                .has_active_job_with_key(&attempt_key(&delivery))
                .await?
            {
                continue;
            }
            self.enqueue_delivery_job(&delivery, now).await?;
            recovered += 1;
        }
        if recovered > 0 {
            log::warn!(
                "Webhook retry sweep recovered {} delivery job(s)",
                recovered
            );
        }
        Ok(recovered)
    }
}

/// Idempotency key for the delivery's next attempt.
fn attempt_key(delivery: &WebhookDelivery) -> String {
    format!("wd:{}:{}", delivery.delivery_id, delivery.attempts + 1)
}
