//! Webhook subscription and delivery models, plus the closed event-type set.

use crate::ids::{DeliveryId, EventId, JobId, TenantId, WebhookId};
use crate::serialization::Storable;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Platform events the webhook engine publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum EventType {
    PodProvisioned,
    PodSuspended,
    PodResumed,
    PodDeleted,
    PodFailed,
    PodHealed,
    SecurityGroupAttached,
    SecurityGroupDetached,
    BackupCompleted,
    BackupFailed,
    UsageDailyRollup,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PodProvisioned => "pod.provisioned",
            EventType::PodSuspended => "pod.suspended",
            EventType::PodResumed => "pod.resumed",
            EventType::PodDeleted => "pod.deleted",
            EventType::PodFailed => "pod.failed",
            EventType::PodHealed => "pod.healed",
            EventType::SecurityGroupAttached => "security_group.attached",
            EventType::SecurityGroupDetached => "security_group.detached",
            EventType::BackupCompleted => "backup.completed",
            EventType::BackupFailed => "backup.failed",
            EventType::UsageDailyRollup => "usage.daily_rollup",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "pod.provisioned" => Some(EventType::PodProvisioned),
            "pod.suspended" => Some(EventType::PodSuspended),
            "pod.resumed" => Some(EventType::PodResumed),
            "pod.deleted" => Some(EventType::PodDeleted),
            "pod.failed" => Some(EventType::PodFailed),
            "pod.healed" => Some(EventType::PodHealed),
            "security_group.attached" => Some(EventType::SecurityGroupAttached),
            "security_group.detached" => Some(EventType::SecurityGroupDetached),
            "backup.completed" => Some(EventType::BackupCompleted),
            "backup.failed" => Some(EventType::BackupFailed),
            "usage.daily_rollup" => Some(EventType::UsageDailyRollup),
            _ => None,
        }
    }
}

impl FromStr for EventType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::from_str_opt(s).ok_or_else(|| format!("Unknown event type: {}", s))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tenant-registered webhook endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Webhook {
    pub webhook_id: WebhookId,
    pub tenant_id: TenantId,
    pub url: String,
    /// HMAC-SHA256 signing secret for this endpoint.
    pub secret: String,
    /// Subscribed event names; `"*"` subscribes to everything.
    pub events: Vec<String>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Webhook {
    /// Whether this endpoint should receive `event_type`.
    pub fn subscribes_to(&self, event_type: EventType) -> bool {
        self.is_active
            && self
                .events
                .iter()
                .any(|e| e == "*" || e == event_type.as_str())
    }
}

/// Delivery attempt state.
///
/// `Delivered` and `PermanentlyFailed` are terminal: no mutation, no retry,
/// ever, once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    /// At least one attempt failed; a retry is scheduled.
    Failed,
    PermanentlyFailed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::PermanentlyFailed => "permanently_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered | DeliveryStatus::PermanentlyFailed
        )
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One event-to-endpoint delivery with its attempt history.
///
/// The signed request body is frozen at publish time so that every retry
/// signs byte-identical content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct WebhookDelivery {
    pub delivery_id: DeliveryId,
    pub webhook_id: WebhookId,
    pub tenant_id: TenantId,
    pub event_id: EventId,
    pub event_type: EventType,
    /// Serialized request body: `{eventId, eventType, tenantId, occurredAt, data}`.
    pub body: String,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub http_status: Option<u16>,
    pub next_retry_at: Option<i64>,
    pub last_error: Option<String>,
    /// Job currently driving this delivery, while one is active.
    pub job_id: Option<JobId>,
    pub created_at: i64,
    pub updated_at: i64,
}

// Storable implementations for EntityStore support
impl Storable for Webhook {}
impl Storable for WebhookDelivery {}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_webhook(events: &[&str], active: bool) -> Webhook {
        Webhook {
            webhook_id: WebhookId::new("wh-1"),
            tenant_id: TenantId::new("t1"),
            url: "https://example.com/hooks".to_string(),
            secret: "s3cret".to_string(),
            events: events.iter().map(|s| s.to_string()).collect(),
            is_active: active,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_event_type_round_trip() {
        for event in [
            EventType::PodProvisioned,
            EventType::PodSuspended,
            EventType::PodResumed,
            EventType::PodDeleted,
            EventType::PodFailed,
            EventType::PodHealed,
            EventType::SecurityGroupAttached,
            EventType::SecurityGroupDetached,
            EventType::BackupCompleted,
            EventType::BackupFailed,
            EventType::UsageDailyRollup,
        ] {
            assert_eq!(EventType::from_str_opt(event.as_str()), Some(event));
        }
    }

    #[test]
    fn test_subscription_matching() {
        let hook = test_webhook(&["pod.provisioned", "backup.completed"], true);
        assert!(hook.subscribes_to(EventType::PodProvisioned));
        assert!(!hook.subscribes_to(EventType::PodDeleted));
    }

    #[test]
    fn test_wildcard_subscription() {
        let hook = test_webhook(&["*"], true);
        assert!(hook.subscribes_to(EventType::UsageDailyRollup));
    }

    #[test]
    fn test_inactive_webhook_matches_nothing() {
        let hook = test_webhook(&["*"], false);
        assert!(!hook.subscribes_to(EventType::PodProvisioned));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(DeliveryStatus::Delivered.is_terminal());
        assert!(DeliveryStatus::PermanentlyFailed.is_terminal());
        assert!(!DeliveryStatus::Failed.is_terminal());
        assert!(!DeliveryStatus::Pending.is_terminal());
    }
}
