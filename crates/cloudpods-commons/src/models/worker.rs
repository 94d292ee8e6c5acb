//! Worker registration model.

use crate::ids::WorkerId;
use crate::serialization::Storable;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum WorkerStatus {
    Online,
    Offline,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Online => "online",
            WorkerStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ephemeral registration of one coordinator instance.
///
/// A worker whose heartbeat goes stale is presumed dead; the reaper marks it
/// offline and requeues its claimed jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Worker {
    pub worker_id: WorkerId,
    /// Human-readable name, e.g. hostname plus a suffix.
    pub name: String,
    /// Queue this worker claims from.
    pub queue: String,
    pub status: WorkerStatus,
    pub last_heartbeat_at: i64,
    pub registered_at: i64,
}

impl Worker {
    pub fn beat(mut self, now: i64) -> Worker {
        self.last_heartbeat_at = now;
        self.status = WorkerStatus::Online;
        self
    }

    pub fn offline(mut self) -> Worker {
        self.status = WorkerStatus::Offline;
        self
    }

    /// Whether the heartbeat is older than `threshold_ms` relative to `now`.
    pub fn is_stale(&self, threshold_ms: i64, now: i64) -> bool {
        now - self.last_heartbeat_at > threshold_ms
    }
}

// Storable implementations for EntityStore support
impl Storable for Worker {}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_worker() -> Worker {
        Worker {
            worker_id: WorkerId::new("w1"),
            name: "host-a/0".to_string(),
            queue: "default".to_string(),
            status: WorkerStatus::Online,
            last_heartbeat_at: 10_000,
            registered_at: 10_000,
        }
    }

    #[test]
    fn test_staleness() {
        let worker = test_worker();
        assert!(!worker.is_stale(30_000, 20_000));
        assert!(worker.is_stale(30_000, 50_000));
    }

    #[test]
    fn test_beat_refreshes() {
        let worker = test_worker().offline().beat(60_000);
        assert_eq!(worker.status, WorkerStatus::Online);
        assert_eq!(worker.last_heartbeat_at, 60_000);
    }
}
