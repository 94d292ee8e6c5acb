//! # Job Execution
//!
//! The durable job queue consumer. A single [`WorkerCoordinator`] per
//! process claims pending jobs, dispatches them to typed executors through
//! the [`JobRegistry`], and settles each row from the executor's
//! [`JobOutcome`]: complete, retry with exponential backoff, or permanent
//! failure.

pub mod coordinator;
pub mod executor_trait;
pub mod executors;
pub mod payloads;
pub mod registry;
pub mod retry;

pub use coordinator::WorkerCoordinator;
pub use executor_trait::{CancellationToken, JobContext, JobExecutor, JobOutcome, JobPayload};
pub use payloads::{
    BackupRestorePayload, BackupRunPayload, DeletePayload, DeliverPayload, HealPayload,
    ProvisionPayload, ResumePayload, SuspendPayload,
};
pub use registry::JobRegistry;
