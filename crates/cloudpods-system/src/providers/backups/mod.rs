//! Backups module (backup_policies + backup_runs in RocksDB)

pub mod backup_policies_provider;
pub mod backup_runs_provider;

pub use backup_policies_provider::{BackupPoliciesProvider, BackupPoliciesStore};
pub use backup_runs_provider::{BackupRunsProvider, BackupRunsStore};
