//! Per-pod health check state.

use crate::ids::PodId;
use crate::serialization::Storable;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum HealthState {
    Healthy,
    Unhealthy,
    /// No check has completed yet, or the last check could not run.
    Unknown,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
            HealthState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Latest health observation for one pod.
///
/// `consecutive_failures` resets on any healthy observation; the auto-heal
/// path triggers once it crosses the configured threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct HealthStatus {
    pub pod_id: PodId,
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub last_checked_at: i64,
    pub last_healthy_at: Option<i64>,
    pub message: Option<String>,
}

impl HealthStatus {
    pub fn unknown(pod_id: PodId) -> Self {
        Self {
            pod_id,
            state: HealthState::Unknown,
            consecutive_failures: 0,
            last_checked_at: 0,
            last_healthy_at: None,
            message: None,
        }
    }

    /// Fold one check result into the running state.
    pub fn observe(&mut self, healthy: bool, message: Option<String>, now: i64) {
        self.last_checked_at = now;
        self.message = message;
        if healthy {
            self.state = HealthState::Healthy;
            self.consecutive_failures = 0;
            self.last_healthy_at = Some(now);
        } else {
            self.state = HealthState::Unhealthy;
            self.consecutive_failures += 1;
        }
    }
}

// Storable implementations for EntityStore support
impl Storable for HealthStatus {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_accumulate_until_healthy() {
        let mut status = HealthStatus::unknown(PodId::new("pod-1"));
        assert_eq!(status.state, HealthState::Unknown);

        status.observe(false, Some("connect refused".to_string()), 100);
        status.observe(false, Some("connect refused".to_string()), 200);
        assert_eq!(status.state, HealthState::Unhealthy);
        assert_eq!(status.consecutive_failures, 2);
        assert_eq!(status.last_healthy_at, None);

        status.observe(true, None, 300);
        assert_eq!(status.state, HealthState::Healthy);
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.last_healthy_at, Some(300));
    }
}
