//! Shared types for the CloudPods orchestration core.
//!
//! This crate holds the identifier newtypes, persisted data models, and the
//! storage-key encoding contract used by every other crate. It deliberately
//! carries no async or storage-engine dependencies so that the model layer
//! can be reused from tooling and tests without pulling in the runtime.

pub mod errors;
pub mod ids;
pub mod models;
pub mod partitions;
pub mod serialization;
pub mod storage;
pub mod storage_key;

pub use errors::{CommonError, Result};
pub use ids::{
    BackupPolicyId, BackupRunId, DeliveryId, DnsRecordId, EventId, InstanceId, JobId, PodId,
    SecurityGroupId, TenantId, VolumeId, WebhookId, WorkerId,
};
pub use partitions::StoragePartition;
pub use serialization::Storable;
pub use storage::{KvIterator, Partition, StorageError};
pub use storage_key::{decode_key, encode_key, encode_prefix, StorageKey};

/// Current time in epoch milliseconds. All persisted timestamps use this unit.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
