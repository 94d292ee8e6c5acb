use super::types::WorkerCoordinator;
use cloudpods_commons::ids::prefixed_id;
use cloudpods_commons::models::JobKind;
use cloudpods_commons::JobId;
use log::Level;

impl WorkerCoordinator {
    /// Generate a typed JobId with a kind-specific prefix, e.g. `PR-` for
    /// provision jobs and `WD-` for webhook deliveries.
    pub(crate) fn generate_job_id(&self, kind: &JobKind) -> JobId {
        JobId::new(prefixed_id(kind.short_prefix()))
    }

    /// Log a job event with a `[JobId]` prefix for easy filtering.
    pub(crate) fn log_job_event(&self, job_id: &JobId, level: Level, message: &str) {
        match level {
            Level::Error => log::error!("[{}] {}", job_id.as_str(), message),
            Level::Warn => log::warn!("[{}] {}", job_id.as_str(), message),
            Level::Info => log::info!("[{}] {}", job_id.as_str(), message),
            Level::Debug => log::debug!("[{}] {}", job_id.as_str(), message),
            Level::Trace => log::trace!("[{}] {}", job_id.as_str(), message),
        }
    }
}
