//! DNS provider abstraction.
//!
//! Same seam shape as the hypervisor client: an async trait the reconcilers
//! call, with an in-memory mock standing in for a real DNS API.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DnsError {
    /// API unreachable. Transient; retry later.
    #[error("dns provider unavailable: {0}")]
    Unavailable(String),

    /// Record refused (invalid name, zone missing). Permanent.
    #[error("dns provider rejected request: {0}")]
    Rejected(String),
}

impl DnsError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DnsError::Unavailable(_))
    }
}

/// Forward-record registration used by the DNS reconciler.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Point `fqdn` at `ip`. Re-registering an existing name overwrites it.
    async fn register(&self, fqdn: &str, ip: &str) -> Result<(), DnsError>;

    /// Remove `fqdn`. Removing an unknown name is a no-op.
    async fn remove(&self, fqdn: &str) -> Result<(), DnsError>;
}

/// In-memory DNS provider for tests and fleet-less deployments.
pub struct MockDns {
    records: DashMap<String, String>,
    queued_failures: Mutex<VecDeque<DnsError>>,
}

impl MockDns {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            queued_failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue an error for the next call.
    pub fn fail_next(&self, error: DnsError) {
        if let Ok(mut queue) = self.queued_failures.lock() {
            queue.push_back(error);
        }
    }

    pub fn lookup(&self, fqdn: &str) -> Option<String> {
        self.records.get(fqdn).map(|ip| ip.clone())
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    fn take_queued_failure(&self) -> Option<DnsError> {
        self.queued_failures
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
    }
}

impl Default for MockDns {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockDns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDns")
            .field("records", &self.records.len())
            .finish()
    }
}

#[async_trait]
impl DnsProvider for MockDns {
    async fn register(&self, fqdn: &str, ip: &str) -> Result<(), DnsError> {
        if let Some(err) = self.take_queued_failure() {
            return Err(err);
        }
        self.records.insert(fqdn.to_string(), ip.to_string());
        Ok(())
    }

    async fn remove(&self, fqdn: &str) -> Result<(), DnsError> {
        if let Some(err) = self.take_queued_failure() {
            return Err(err);
        }
        self.records.remove(fqdn);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_overwrites_and_remove_is_idempotent() {
        let dns = MockDns::new();
        dns.register("app.example.com", "10.0.0.1").await.unwrap();
        dns.register("app.example.com", "10.0.0.2").await.unwrap();
        assert_eq!(dns.lookup("app.example.com"), Some("10.0.0.2".to_string()));
        assert_eq!(dns.record_count(), 1);

        dns.remove("app.example.com").await.unwrap();
        dns.remove("app.example.com").await.unwrap();
        assert_eq!(dns.record_count(), 0);
    }

    #[tokio::test]
    async fn test_fail_next() {
        let dns = MockDns::new();
        dns.fail_next(DnsError::Unavailable("zone transfer".to_string()));

        let err = dns.register("a.example.com", "10.0.0.1").await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(dns.record_count(), 0);

        dns.register("a.example.com", "10.0.0.1").await.unwrap();
        assert_eq!(dns.record_count(), 1);
    }
}
