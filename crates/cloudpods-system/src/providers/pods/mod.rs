//! Pods table module (pods in RocksDB)
//!
//! Lifecycle transitions are validated here; sub-resources (volumes, DNS
//! records, security group assignments) live in their own modules.

pub mod pods_indexes;
pub mod pods_provider;

pub use pods_indexes::{create_pods_indexes, pod_status_to_u8, PodStatusIndex, PodTenantIndex};
pub use pods_provider::{PodsProvider, PodsStore};
