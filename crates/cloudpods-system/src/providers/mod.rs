//! System table providers
//!
//! This module contains all system table provider implementations.
//! Each provider owns one entity store (plus its index partitions) and
//! exposes the typed operations the core layer builds on.
//!
//! **Architecture**:
//! - `*Store` aliases: `IndexedEntityStore` bound to a partition and key type
//! - `*Provider` structs: Typed operations, invariant checks, index scans
//! - Async wrappers (`*_async`) run blocking RocksDB calls off the runtime

pub mod audit;
pub mod backups;
pub mod dns_records;
pub mod health;
pub mod jobs;
pub mod pods;
pub mod security_groups;
pub mod settings;
pub mod usage;
pub mod volumes;
pub mod webhooks;
pub mod workers;

// Re-export all providers
pub use audit::AuditProvider;
pub use backups::{BackupPoliciesProvider, BackupRunsProvider};
pub use dns_records::DnsRecordsProvider;
pub use health::HealthProvider;
pub use jobs::JobsProvider;
pub use pods::PodsProvider;
pub use security_groups::{AssignmentsProvider, SecurityGroupsProvider};
pub use settings::SettingsProvider;
pub use usage::{UsageDailyProvider, UsageSamplesProvider};
pub use volumes::VolumesProvider;
pub use webhooks::{DeliveriesProvider, WebhooksProvider};
pub use workers::WorkersProvider;
