//! Job executors, one per `JobKind`.
//!
//! Lifecycle executors delegate the step sequences to `LifecycleManager`
//! and backup executors to `BackupManager`; the executor layer only maps
//! domain errors onto retry decisions. `DeliverWebhookExecutor` carries its
//! own logic because delivery attempts are tracked on the delivery row
//! rather than the job row.

pub mod backup_restore;
pub mod backup_run;
pub mod delete;
pub mod deliver_webhook;
pub mod heal;
pub mod provision;
pub mod resume;
pub mod suspend;

pub use backup_restore::BackupRestoreExecutor;
pub use backup_run::BackupRunExecutor;
pub use delete::DeleteExecutor;
pub use deliver_webhook::DeliverWebhookExecutor;
pub use heal::HealExecutor;
pub use provision::ProvisionExecutor;
pub use resume::ResumeExecutor;
pub use suspend::SuspendExecutor;
