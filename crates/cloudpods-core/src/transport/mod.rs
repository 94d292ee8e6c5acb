//! Outbound HTTP seam for webhook delivery.
//!
//! `DeliveryTransport` is the only place the crate talks to the network.
//! `HttpTransport` wraps `reqwest`; `MockTransport` scripts response status
//! sequences so retry behavior is testable without a listener.

pub mod http;
pub mod mock;

pub use http::HttpTransport;
pub use mock::MockTransport;

use async_trait::async_trait;
use thiserror::Error;

/// A request that reached the endpoint and got an HTTP response.
#[derive(Debug, Clone, Copy)]
pub struct TransportResult {
    pub status: u16,
}

impl TransportResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A request that never produced an HTTP response (DNS, connect, timeout).
/// Always retryable from the delivery engine's point of view.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    /// POST `body` to `url` with the given headers, returning the response
    /// status. An `Err` means no response arrived at all.
    async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &str,
    ) -> Result<TransportResult, TransportError>;
}
