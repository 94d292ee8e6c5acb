//! Webhooks module (webhooks + webhook_deliveries in RocksDB)
//!
//! Subscriptions and their per-event delivery rows. Signing and transport
//! live in the core's webhook engine.

pub mod deliveries_provider;
pub mod webhooks_provider;

pub use deliveries_provider::{
    create_deliveries_indexes, delivery_status_to_u8, DeliveriesProvider, DeliveriesStore,
    DeliveryStatusRetryIndex, DeliveryWebhookIndex,
};
pub use webhooks_provider::{WebhookTenantIndex, WebhooksProvider, WebhooksStore};
