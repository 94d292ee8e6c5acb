//! Type-safe identifier newtypes.
//!
//! Every persisted entity is keyed by its own string newtype so that an id
//! of one kind can never be passed where another is expected. All ids share
//! the same surface: `new`, `as_str`, `into_string`, `Display`, `From`,
//! `AsRef`, and `StorageKey` for direct use as a primary key.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::StorageKey;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Encode, Decode)]
        pub struct $name(String);

        impl $name {
            /// Creates a new id from any string-like input.
            #[inline]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the identifier and returns the owned String.
            #[inline]
            pub fn into_string(self) -> String {
                self.0
            }

            /// Returns the identifier as bytes for storage keys.
            #[inline]
            pub fn as_bytes(&self) -> &[u8] {
                self.0.as_bytes()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                self.0.as_bytes()
            }
        }

        impl StorageKey for $name {
            fn storage_key(&self) -> Vec<u8> {
                self.0.as_bytes().to_vec()
            }

            fn from_storage_key(bytes: &[u8]) -> Result<Self, String> {
                String::from_utf8(bytes.to_vec()).map($name).map_err(|e| e.to_string())
            }
        }
    };
}

define_id!(
    /// Identifier of a tenant (billing account owning pods and webhooks).
    TenantId
);
define_id!(
    /// Identifier of a provisioned compute instance ("Pod").
    PodId
);
define_id!(
    /// Identifier of a job in the job store. Carries a kind prefix, e.g. `PR-a1b2c3`.
    JobId
);
define_id!(
    /// Identifier of a worker registration.
    WorkerId
);
define_id!(
    /// Identifier of a block volume attached to a pod.
    VolumeId
);
define_id!(
    /// Identifier of a DNS record owned by a pod.
    DnsRecordId
);
define_id!(
    /// Identifier of a security group.
    SecurityGroupId
);
define_id!(
    /// Identifier of a tenant-registered webhook endpoint.
    WebhookId
);
define_id!(
    /// Identifier of one webhook delivery (one subscriber, one event).
    DeliveryId
);
define_id!(
    /// Identifier of a published platform event. Shared by every delivery
    /// fanned out from that event, so receivers can deduplicate.
    EventId
);
define_id!(
    /// Identifier of a backup policy.
    BackupPolicyId
);
define_id!(
    /// Identifier of a single backup run.
    BackupRunId
);
define_id!(
    /// Hypervisor-side handle of an allocated instance. Opaque to the core.
    InstanceId
);

/// Generate a short prefixed id: `{PREFIX}-{12 hex chars}`.
///
/// Matches the job-id convention used across the system (`PR-…`, `WH-…`).
pub fn prefixed_id(prefix: &str) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &uuid[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_accessors() {
        let id = PodId::new("pod-123");
        assert_eq!(id.as_str(), "pod-123");
        assert_eq!(id.as_bytes(), b"pod-123");
    }

    #[test]
    fn test_into_string() {
        let id = JobId::new("PR-abc");
        assert_eq!(id.into_string(), "PR-abc");
    }

    #[test]
    fn test_from_str() {
        let id: TenantId = "tenant-9".into();
        assert_eq!(id.as_str(), "tenant-9");
    }

    #[test]
    fn test_display() {
        let id = WorkerId::new("worker-1");
        assert_eq!(format!("{}", id), "worker-1");
    }

    #[test]
    fn test_storage_key_round_trip() {
        let id = DeliveryId::new("DL-0011aabb");
        let bytes = id.storage_key();
        let back = DeliveryId::from_storage_key(&bytes).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn test_prefixed_id_shape() {
        let id = prefixed_id("PR");
        assert!(id.starts_with("PR-"));
        assert_eq!(id.len(), 3 + 12);
    }
}
