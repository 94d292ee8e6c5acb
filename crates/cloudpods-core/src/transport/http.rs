//! `reqwest`-backed delivery transport.

use super::{DeliveryTransport, TransportError, TransportResult};
use async_trait::async_trait;
use std::time::Duration;

/// Shared-client HTTP transport. One instance serves every delivery; the
/// underlying `reqwest::Client` pools connections internally.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Failed(format!("failed to build http client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DeliveryTransport for HttpTransport {
    async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &str,
    ) -> Result<TransportResult, TransportError> {
        let mut request = self.client.post(url).body(body.to_string());
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))?;

        Ok(TransportResult {
            status: response.status().as_u16(),
        })
    }
}
