// CloudPods Core Library
//
// Orchestration layer for the compute fleet: pod lifecycle management, the
// durable job queue and its worker coordinator, resource reconcilers
// (volumes, DNS, security groups), usage metering, webhooks, backups, the
// audit trail, and the background scheduler that drives all periodic work.

pub mod app_context;
pub mod audit;
pub mod backup;
pub mod dns;
pub mod error;
pub mod health;
pub mod hypervisor;
pub mod jobs;
pub mod lifecycle;
pub mod metering;
pub mod resources;
pub mod scheduler;
pub mod settings;
pub mod test_helpers;
pub mod transport;
pub mod webhooks;

pub use app_context::AppContext;
pub use error::{CoreError, Result};
pub use scheduler::Scheduler;
