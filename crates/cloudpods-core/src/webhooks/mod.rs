//! Webhook engine: publish, fanout, signed delivery.

pub mod publisher;
pub mod signer;

pub use publisher::WebhookPublisher;
pub use signer::signature_header;
