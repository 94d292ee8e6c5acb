//! Webhook subscriptions provider.

use crate::error::SystemError;
use cloudpods_commons::models::{EventType, Webhook};
use cloudpods_commons::{encode_key, encode_prefix, StoragePartition, TenantId, WebhookId};
use cloudpods_store::entity_store::EntityStore;
use cloudpods_store::{IndexDefinition, IndexedEntityStore, StorageBackend};
use std::sync::Arc;

/// Index position for `WebhookTenantIndex`.
pub const TENANT_INDEX: usize = 0;

/// Index: webhooks by owning tenant. Key: `(tenant_id, webhook_id)`.
pub struct WebhookTenantIndex;

impl IndexDefinition<WebhookId, Webhook> for WebhookTenantIndex {
    fn partition(&self) -> &str {
        StoragePartition::WebhooksTenantIdx.name()
    }

    fn indexed_columns(&self) -> Vec<&str> {
        vec!["tenant_id", "webhook_id"]
    }

    fn extract_key(&self, _pk: &WebhookId, webhook: &Webhook) -> Option<Vec<u8>> {
        Some(encode_key(&(
            webhook.tenant_id.as_str(),
            webhook.webhook_id.as_str(),
        )))
    }
}

/// Type alias for the indexed webhooks store
pub type WebhooksStore = IndexedEntityStore<WebhookId, Webhook>;

pub struct WebhooksProvider {
    store: WebhooksStore,
}

impl std::fmt::Debug for WebhooksProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhooksProvider").finish()
    }
}

impl WebhooksProvider {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let store = IndexedEntityStore::new(
            backend,
            StoragePartition::Webhooks.name(),
            vec![Arc::new(WebhookTenantIndex) as Arc<dyn IndexDefinition<WebhookId, Webhook>>],
        );
        Self { store }
    }

    pub fn create_webhook(&self, webhook: Webhook) -> Result<Webhook, SystemError> {
        if self.store.get(&webhook.webhook_id)?.is_some() {
            return Err(SystemError::AlreadyExists(format!(
                "Webhook already exists: {}",
                webhook.webhook_id
            )));
        }
        self.store.insert(&webhook.webhook_id, &webhook)?;
        log::info!(
            "Created webhook {} for tenant {} ({} event subscriptions)",
            webhook.webhook_id,
            webhook.tenant_id,
            webhook.events.len()
        );
        Ok(webhook)
    }

    pub fn get_webhook(&self, webhook_id: &WebhookId) -> Result<Option<Webhook>, SystemError> {
        Ok(self.store.get(webhook_id)?)
    }

    /// Replace a webhook row (url, events, active flag, secret rotation).
    pub fn update_webhook(&self, webhook: Webhook) -> Result<Webhook, SystemError> {
        let existing = self.store.get(&webhook.webhook_id)?.ok_or_else(|| {
            SystemError::NotFound(format!("Webhook not found: {}", webhook.webhook_id))
        })?;
        self.store
            .update_with_old(&webhook.webhook_id, Some(&existing), &webhook)?;
        Ok(webhook)
    }

    pub fn list_by_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Webhook>, SystemError> {
        let prefix = encode_prefix(&(tenant_id.as_str(),));
        let entries = self.store.scan_by_index(TENANT_INDEX, Some(&prefix), None)?;
        Ok(entries.into_iter().map(|(_, w)| w).collect())
    }

    /// Fanout target set: the tenant's active webhooks subscribed to
    /// `event_type`, directly or via `"*"`.
    pub fn list_active_for_event(
        &self,
        tenant_id: &TenantId,
        event_type: EventType,
    ) -> Result<Vec<Webhook>, SystemError> {
        let webhooks = self.list_by_tenant(tenant_id)?;
        Ok(webhooks
            .into_iter()
            .filter(|w| w.subscribes_to(event_type))
            .collect())
    }

    pub fn delete_webhook(&self, webhook_id: &WebhookId) -> Result<(), SystemError> {
        self.store.delete(webhook_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudpods_commons::now_millis;
    use cloudpods_store::test_utils::InMemoryBackend;

    fn create_test_provider() -> WebhooksProvider {
        let backend: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
        WebhooksProvider::new(backend)
    }

    fn test_webhook(id: &str, tenant: &str, events: &[&str]) -> Webhook {
        let now = now_millis();
        Webhook {
            webhook_id: WebhookId::new(id),
            tenant_id: TenantId::new(tenant),
            url: format!("https://hooks.example.test/{}", id),
            secret: "whsec_test".to_string(),
            events: events.iter().map(|s| s.to_string()).collect(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_fanout_target_selection() {
        let provider = create_test_provider();
        provider
            .create_webhook(test_webhook("wh-1", "t1", &["pod.provisioned"]))
            .unwrap();
        provider
            .create_webhook(test_webhook("wh-2", "t1", &["*"]))
            .unwrap();
        provider
            .create_webhook(test_webhook("wh-3", "t1", &["backup.completed"]))
            .unwrap();
        provider
            .create_webhook(test_webhook("wh-4", "t2", &["pod.provisioned"]))
            .unwrap();

        let targets = provider
            .list_active_for_event(&TenantId::new("t1"), EventType::PodProvisioned)
            .unwrap();
        let ids: Vec<&str> = targets.iter().map(|w| w.webhook_id.as_str()).collect();
        assert_eq!(ids, vec!["wh-1", "wh-2"]);
    }

    #[test]
    fn test_disabled_webhook_excluded_from_fanout() {
        let provider = create_test_provider();
        let mut hook = test_webhook("wh-1", "t1", &["*"]);
        provider.create_webhook(hook.clone()).unwrap();

        hook.is_active = false;
        hook.updated_at = now_millis();
        provider.update_webhook(hook).unwrap();

        let targets = provider
            .list_active_for_event(&TenantId::new("t1"), EventType::PodProvisioned)
            .unwrap();
        assert!(targets.is_empty());
    }

    #[test]
    fn test_update_missing_webhook_errors() {
        let provider = create_test_provider();
        let err = provider
            .update_webhook(test_webhook("wh-missing", "t1", &["*"]))
            .unwrap_err();
        assert!(matches!(err, SystemError::NotFound(_)));
    }
}
