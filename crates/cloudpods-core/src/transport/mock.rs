//! Scriptable delivery transport for retry tests.

use super::{DeliveryTransport, TransportError, TransportResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One step of a scripted response sequence.
#[derive(Debug, Clone)]
enum ScriptedResponse {
    Status(u16),
    /// Connection-level failure: no HTTP response at all.
    Error(String),
}

/// A request the mock received, kept for assertions.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Transport that replays a scripted status sequence.
///
/// Each `post` consumes the next scripted step; once the script runs out,
/// every further request returns 200. All requests are recorded.
pub struct MockTransport {
    script: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Script a run of HTTP statuses, e.g. `[500, 500, 500, 200]`.
    pub fn with_statuses(statuses: &[u16]) -> Self {
        let transport = Self::new();
        for status in statuses {
            transport.push_status(*status);
        }
        transport
    }

    pub fn push_status(&self, status: u16) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(ScriptedResponse::Status(status));
        }
    }

    /// Script a connection-level failure (no HTTP response).
    pub fn push_error(&self, message: &str) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(ScriptedResponse::Error(message.to_string()));
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("requests", &self.request_count())
            .finish()
    }
}

#[async_trait]
impl DeliveryTransport for MockTransport {
    async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &str,
    ) -> Result<TransportResult, TransportError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                url: url.to_string(),
                headers: headers.to_vec(),
                body: body.to_string(),
            });
        }

        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front());

        match next {
            Some(ScriptedResponse::Status(status)) => Ok(TransportResult { status }),
            Some(ScriptedResponse::Error(message)) => Err(TransportError::Failed(message)),
            None => Ok(TransportResult { status: 200 }),
        }
    }
}
