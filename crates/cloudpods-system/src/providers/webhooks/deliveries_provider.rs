//! Webhook deliveries provider.
//!
//! One row per (event, subscriber) pair, carrying the frozen request body
//! and the attempt counter. Attempt accounting lives here; the HTTP call and
//! backoff policy live in the delivery executor.

use crate::error::SystemError;
use cloudpods_commons::models::{DeliveryStatus, WebhookDelivery};
use cloudpods_commons::{
    encode_key, encode_prefix, DeliveryId, JobId, StorageKey, StoragePartition, WebhookId,
};
use cloudpods_store::entity_store::EntityStore;
use cloudpods_store::{IndexDefinition, IndexedEntityStore, StorageBackend};
use std::sync::Arc;

/// Index position for `DeliveryStatusRetryIndex`.
pub const STATUS_RETRY_INDEX: usize = 0;
/// Index position for `DeliveryWebhookIndex`.
pub const WEBHOOK_INDEX: usize = 1;

/// Maps DeliveryStatus to a stable byte for index key encoding.
pub fn delivery_status_to_u8(status: DeliveryStatus) -> u8 {
    match status {
        DeliveryStatus::Pending => 0,
        DeliveryStatus::Delivered => 1,
        DeliveryStatus::Failed => 2,
        DeliveryStatus::PermanentlyFailed => 3,
    }
}

/// Index: deliveries by status and time.
///
/// Key: `[status_byte][ts_be][delivery_id]` where `ts` is `next_retry_at`
/// for rows awaiting a retry and `updated_at` otherwise. A prefix scan over
/// the Failed byte yields due retries oldest first; terminal prefixes drive
/// the retention sweep.
pub struct DeliveryStatusRetryIndex;

impl IndexDefinition<DeliveryId, WebhookDelivery> for DeliveryStatusRetryIndex {
    fn partition(&self) -> &str {
        StoragePartition::WebhookDeliveriesStatusRetryIdx.name()
    }

    fn indexed_columns(&self) -> Vec<&str> {
        vec!["status", "next_retry_at", "delivery_id"]
    }

    fn extract_key(&self, _pk: &DeliveryId, delivery: &WebhookDelivery) -> Option<Vec<u8>> {
        let ts = delivery.next_retry_at.unwrap_or(delivery.updated_at);
        let id_bytes = delivery.delivery_id.as_bytes();
        let mut key = Vec::with_capacity(1 + 8 + id_bytes.len());
        key.push(delivery_status_to_u8(delivery.status));
        key.extend_from_slice(&ts.to_be_bytes());
        key.extend_from_slice(id_bytes);
        Some(key)
    }
}

/// Index: deliveries by webhook. Key: `(webhook_id, delivery_id)`.
pub struct DeliveryWebhookIndex;

impl IndexDefinition<DeliveryId, WebhookDelivery> for DeliveryWebhookIndex {
    fn partition(&self) -> &str {
        StoragePartition::WebhookDeliveriesWebhookIdx.name()
    }

    fn indexed_columns(&self) -> Vec<&str> {
        vec!["webhook_id", "delivery_id"]
    }

    fn extract_key(&self, _pk: &DeliveryId, delivery: &WebhookDelivery) -> Option<Vec<u8>> {
        Some(encode_key(&(
            delivery.webhook_id.as_str(),
            delivery.delivery_id.as_str(),
        )))
    }
}

/// Creates all index definitions for the deliveries table.
pub fn create_deliveries_indexes() -> Vec<Arc<dyn IndexDefinition<DeliveryId, WebhookDelivery>>> {
    vec![
        Arc::new(DeliveryStatusRetryIndex),
        Arc::new(DeliveryWebhookIndex),
    ]
}

/// Type alias for the indexed deliveries store
pub type DeliveriesStore = IndexedEntityStore<DeliveryId, WebhookDelivery>;

pub struct DeliveriesProvider {
    store: DeliveriesStore,
}

impl std::fmt::Debug for DeliveriesProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveriesProvider").finish()
    }
}

impl DeliveriesProvider {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let store = IndexedEntityStore::new(
            backend,
            StoragePartition::WebhookDeliveries.name(),
            create_deliveries_indexes(),
        );
        Self { store }
    }

    fn load_delivery(&self, delivery_id: &DeliveryId) -> Result<WebhookDelivery, SystemError> {
        self.store
            .get(delivery_id)?
            .ok_or_else(|| SystemError::NotFound(format!("Delivery not found: {}", delivery_id)))
    }

    pub fn create_delivery(&self, delivery: WebhookDelivery) -> Result<WebhookDelivery, SystemError> {
        if self.store.get(&delivery.delivery_id)?.is_some() {
            return Err(SystemError::AlreadyExists(format!(
                "Delivery already exists: {}",
                delivery.delivery_id
            )));
        }
        self.store.insert(&delivery.delivery_id, &delivery)?;
        Ok(delivery)
    }

    pub fn get_delivery(
        &self,
        delivery_id: &DeliveryId,
    ) -> Result<Option<WebhookDelivery>, SystemError> {
        Ok(self.store.get(delivery_id)?)
    }

    /// Point the delivery at the job currently driving it.
    pub fn attach_job(
        &self,
        delivery_id: &DeliveryId,
        job_id: JobId,
        now: i64,
    ) -> Result<WebhookDelivery, SystemError> {
        let delivery = self.load_delivery(delivery_id)?;
        let mut updated = delivery.clone();
        updated.job_id = Some(job_id);
        updated.updated_at = now;
        self.store
            .update_with_old(delivery_id, Some(&delivery), &updated)?;
        Ok(updated)
    }

    /// Record a successful attempt: counts it and settles the row as
    /// Delivered.
    pub fn record_attempt_success(
        &self,
        delivery_id: &DeliveryId,
        http_status: u16,
        now: i64,
    ) -> Result<WebhookDelivery, SystemError> {
        let delivery = self.load_delivery(delivery_id)?;
        if delivery.status.is_terminal() {
            return Err(SystemError::InvalidOperation(format!(
                "Delivery {} already settled as '{}'",
                delivery_id, delivery.status
            )));
        }
        let mut updated = delivery.clone();
        updated.attempts += 1;
        updated.status = DeliveryStatus::Delivered;
        updated.http_status = Some(http_status);
        updated.next_retry_at = None;
        updated.last_error = None;
        updated.updated_at = now;
        self.store
            .update_with_old(delivery_id, Some(&delivery), &updated)?;
        log::debug!(
            "Delivery {} delivered on attempt {} (HTTP {})",
            delivery_id,
            updated.attempts,
            http_status
        );
        Ok(updated)
    }

    /// Record a failed attempt.
    ///
    /// Counts the attempt, then either schedules a retry at `next_retry_at`
    /// or, when the budget of `max_attempts` is spent, settles the row as
    /// PermanentlyFailed.
    pub fn record_attempt_failure(
        &self,
        delivery_id: &DeliveryId,
        http_status: Option<u16>,
        error: String,
        max_attempts: u32,
        next_retry_at: i64,
        now: i64,
    ) -> Result<WebhookDelivery, SystemError> {
        let delivery = self.load_delivery(delivery_id)?;
        if delivery.status.is_terminal() {
            return Err(SystemError::InvalidOperation(format!(
                "Delivery {} already settled as '{}'",
                delivery_id, delivery.status
            )));
        }
        let mut updated = delivery.clone();
        updated.attempts += 1;
        updated.http_status = http_status;
        updated.last_error = Some(error);
        updated.updated_at = now;

        if updated.attempts >= max_attempts {
            updated.status = DeliveryStatus::PermanentlyFailed;
            updated.next_retry_at = None;
            log::warn!(
                "Delivery {} permanently failed after {} attempts",
                delivery_id,
                updated.attempts
            );
        } else {
            updated.status = DeliveryStatus::Failed;
            updated.next_retry_at = Some(next_retry_at);
        }

        self.store
            .update_with_old(delivery_id, Some(&delivery), &updated)?;
        Ok(updated)
    }

    /// Failed deliveries whose retry time has passed, oldest first.
    ///
    /// The driving job normally lands each retry on time; this scan exists
    /// for the scheduler's reconcile sweep after a crash loses a job.
    pub fn list_due_retries(
        &self,
        now: i64,
        limit: Option<usize>,
    ) -> Result<Vec<WebhookDelivery>, SystemError> {
        let prefix = [delivery_status_to_u8(DeliveryStatus::Failed)];
        let entries = self
            .store
            .scan_index_raw(STATUS_RETRY_INDEX, Some(&prefix), None, None)?;

        let mut due = Vec::new();
        for (key_bytes, delivery_id_bytes) in entries {
            // Key layout: [status_byte][ts_be][delivery_id]
            if key_bytes.len() < 9 {
                continue;
            }
            let mut ts_bytes = [0u8; 8];
            ts_bytes.copy_from_slice(&key_bytes[1..9]);
            let ts = i64::from_be_bytes(ts_bytes);
            // Time-sorted: everything after this is later
            if ts > now {
                break;
            }

            let delivery_id = DeliveryId::from_storage_key(&delivery_id_bytes)
                .map_err(SystemError::SerializationError)?;
            if let Some(delivery) = self.store.get(&delivery_id)? {
                due.push(delivery);
                if let Some(max) = limit {
                    if due.len() >= max {
                        break;
                    }
                }
            }
        }
        Ok(due)
    }

    /// Delivery history for one webhook endpoint.
    pub fn list_for_webhook(
        &self,
        webhook_id: &WebhookId,
        limit: Option<usize>,
    ) -> Result<Vec<WebhookDelivery>, SystemError> {
        let prefix = encode_prefix(&(webhook_id.as_str(),));
        let entries = self.store.scan_by_index(WEBHOOK_INDEX, Some(&prefix), limit)?;
        Ok(entries.into_iter().map(|(_, d)| d).collect())
    }

    /// Delete settled deliveries older than the retention period.
    pub fn cleanup_old_deliveries(
        &self,
        retention_days: u32,
        now: i64,
    ) -> Result<usize, SystemError> {
        let retention_ms = retention_days as i64 * 24 * 60 * 60 * 1000;
        let cutoff_time = now - retention_ms;
        let mut deleted = 0;

        for status in [DeliveryStatus::Delivered, DeliveryStatus::PermanentlyFailed] {
            let prefix = [delivery_status_to_u8(status)];
            let entries = self
                .store
                .scan_index_raw(STATUS_RETRY_INDEX, Some(&prefix), None, None)?;

            for (key_bytes, delivery_id_bytes) in entries {
                if key_bytes.len() < 9 {
                    continue;
                }
                let mut ts_bytes = [0u8; 8];
                ts_bytes.copy_from_slice(&key_bytes[1..9]);
                let ts = i64::from_be_bytes(ts_bytes);
                if ts > cutoff_time {
                    break;
                }

                let delivery_id = DeliveryId::from_storage_key(&delivery_id_bytes)
                    .map_err(SystemError::SerializationError)?;
                self.store.delete(&delivery_id)?;
                deleted += 1;
            }
        }

        if deleted > 0 {
            log::info!("Delivery retention sweep deleted {} settled rows", deleted);
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudpods_commons::models::EventType;
    use cloudpods_commons::{now_millis, EventId, JobId, TenantId};
    use cloudpods_store::test_utils::InMemoryBackend;

    fn create_test_provider() -> DeliveriesProvider {
        let backend: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
        DeliveriesProvider::new(backend)
    }

    fn test_delivery(id: &str, webhook: &str) -> WebhookDelivery {
        let now = now_millis();
        WebhookDelivery {
            delivery_id: DeliveryId::new(id),
            webhook_id: WebhookId::new(webhook),
            tenant_id: TenantId::new("t1"),
            event_id: EventId::new("EV-1"),
            event_type: EventType::PodProvisioned,
            body: r#"{"eventId":"EV-1"}"#.to_string(),
            status: DeliveryStatus::Pending,
            attempts: 0,
            http_status: None,
            next_retry_at: None,
            last_error: None,
            job_id: Some(JobId::new("WD-1")),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_three_failures_then_success_counts_four_attempts() {
        let provider = create_test_provider();
        let id = DeliveryId::new("dl-1");
        provider.create_delivery(test_delivery("dl-1", "wh-1")).unwrap();
        let now = now_millis();

        for attempt in 1..=3u32 {
            let failed = provider
                .record_attempt_failure(
                    &id,
                    Some(500),
                    "HTTP 500".to_string(),
                    5,
                    now + attempt as i64 * 60_000,
                    now,
                )
                .unwrap();
            assert_eq!(failed.status, DeliveryStatus::Failed);
            assert_eq!(failed.attempts, attempt);
        }

        let delivered = provider.record_attempt_success(&id, 200, now).unwrap();
        assert_eq!(delivered.status, DeliveryStatus::Delivered);
        assert_eq!(delivered.attempts, 4);
        assert!(delivered.next_retry_at.is_none());
        assert!(delivered.last_error.is_none());
    }

    #[test]
    fn test_attach_job_updates_driver() {
        let provider = create_test_provider();
        let id = DeliveryId::new("dl-1");
        provider.create_delivery(test_delivery("dl-1", "wh-1")).unwrap();

        let updated = provider
            .attach_job(&id, JobId::new("WD-2"), now_millis())
            .unwrap();
        assert_eq!(updated.job_id, Some(JobId::new("WD-2")));
    }

    #[test]
    fn test_budget_exhaustion_settles_permanently() {
        let provider = create_test_provider();
        let id = DeliveryId::new("dl-1");
        provider.create_delivery(test_delivery("dl-1", "wh-1")).unwrap();
        let now = now_millis();

        for _ in 0..2 {
            provider
                .record_attempt_failure(&id, Some(503), "HTTP 503".to_string(), 3, now + 60_000, now)
                .unwrap();
        }
        let last = provider
            .record_attempt_failure(&id, Some(503), "HTTP 503".to_string(), 3, now + 60_000, now)
            .unwrap();

        assert_eq!(last.status, DeliveryStatus::PermanentlyFailed);
        assert_eq!(last.attempts, 3);
        assert!(last.next_retry_at.is_none());

        // Settled rows reject further attempts
        let err = provider.record_attempt_success(&id, 200, now).unwrap_err();
        assert!(matches!(err, SystemError::InvalidOperation(_)));
    }

    #[test]
    fn test_list_due_retries_orders_and_filters() {
        let provider = create_test_provider();
        let now = now_millis();

        provider.create_delivery(test_delivery("dl-late", "wh-1")).unwrap();
        provider.create_delivery(test_delivery("dl-soon", "wh-1")).unwrap();
        provider.create_delivery(test_delivery("dl-future", "wh-1")).unwrap();

        provider
            .record_attempt_failure(
                &DeliveryId::new("dl-late"),
                Some(500),
                "e".to_string(),
                5,
                now - 120_000,
                now,
            )
            .unwrap();
        provider
            .record_attempt_failure(
                &DeliveryId::new("dl-soon"),
                Some(500),
                "e".to_string(),
                5,
                now - 60_000,
                now,
            )
            .unwrap();
        provider
            .record_attempt_failure(
                &DeliveryId::new("dl-future"),
                Some(500),
                "e".to_string(),
                5,
                now + 600_000,
                now,
            )
            .unwrap();

        let due = provider.list_due_retries(now, None).unwrap();
        let ids: Vec<&str> = due.iter().map(|d| d.delivery_id.as_str()).collect();
        assert_eq!(ids, vec!["dl-late", "dl-soon"]);
    }

    #[test]
    fn test_list_for_webhook() {
        let provider = create_test_provider();
        provider.create_delivery(test_delivery("dl-1", "wh-1")).unwrap();
        provider.create_delivery(test_delivery("dl-2", "wh-1")).unwrap();
        provider.create_delivery(test_delivery("dl-3", "wh-2")).unwrap();

        let history = provider.list_for_webhook(&WebhookId::new("wh-1"), None).unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_cleanup_spares_recent_and_unsettled() {
        let provider = create_test_provider();
        let now = now_millis();
        let old = now - 40 * 24 * 60 * 60 * 1000;

        provider.create_delivery(test_delivery("dl-old", "wh-1")).unwrap();
        provider
            .record_attempt_success(&DeliveryId::new("dl-old"), 200, old)
            .unwrap();

        provider.create_delivery(test_delivery("dl-new", "wh-1")).unwrap();
        provider
            .record_attempt_success(&DeliveryId::new("dl-new"), 200, now)
            .unwrap();

        provider.create_delivery(test_delivery("dl-open", "wh-1")).unwrap();

        let deleted = provider.cleanup_old_deliveries(30, now).unwrap();
        assert_eq!(deleted, 1);
        assert!(provider.get_delivery(&DeliveryId::new("dl-old")).unwrap().is_none());
        assert!(provider.get_delivery(&DeliveryId::new("dl-new")).unwrap().is_some());
        assert!(provider.get_delivery(&DeliveryId::new("dl-open")).unwrap().is_some());
    }
}
