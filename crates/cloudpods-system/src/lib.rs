//! # cloudpods-system
//!
//! System table providers and metadata management for CloudPods.
//!
//! This crate contains all persisted table implementations:
//! - JobsProvider: Durable job queue with claim/retry semantics
//! - WorkersProvider: Worker registrations and heartbeats
//! - PodsProvider: Pod rows and lifecycle transitions
//! - VolumesProvider / DnsRecordsProvider: Resources attached to pods
//! - SecurityGroupsProvider / AssignmentsProvider: Groups and the join table
//! - UsageSamplesProvider / UsageDailyProvider: Metering samples and rollups
//! - WebhooksProvider / DeliveriesProvider: Endpoints and delivery attempts
//! - AuditProvider: Hash-chained audit records per scope
//! - HealthProvider: Per-pod health state
//! - BackupPoliciesProvider / BackupRunsProvider: Backup schedules and runs
//! - SettingsProvider: Runtime setting overrides
//!
//! ## Architecture
//!
//! Providers are thin typed layers over `IndexedEntityStore`. Multi-row
//! invariants (claim exclusivity, idempotency keys, audit chain heads) are
//! enforced here with per-provider locks; policy decisions stay in
//! `cloudpods-core`.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use cloudpods_system::SystemRegistry;
//!
//! let registry = SystemRegistry::new(backend);
//! let job = registry.jobs().claim_next("lifecycle", &worker_id, now)?;
//! ```

pub mod error;
pub mod providers;
pub mod registry;

// Re-export main types
pub use error::{Result, SystemError};
pub use registry::SystemRegistry;

// Re-export all providers
pub use providers::{
    AssignmentsProvider, AuditProvider, BackupPoliciesProvider, BackupRunsProvider,
    DeliveriesProvider, DnsRecordsProvider, HealthProvider, JobsProvider, PodsProvider,
    SecurityGroupsProvider, SettingsProvider, UsageDailyProvider, UsageSamplesProvider,
    VolumesProvider, WebhooksProvider, WorkersProvider,
};

// Re-export commonly used commons types for convenience
pub use cloudpods_commons::{StoragePartition, models};
