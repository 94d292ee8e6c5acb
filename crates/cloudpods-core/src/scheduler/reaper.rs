//! Reclaims jobs orphaned by dead workers or wedged executors.
//!
//! A worker that stops heartbeating keeps its claims forever unless someone
//! takes them back. The reaper marks stale workers offline and requeues
//! their `Running` jobs, and does the same for jobs that have been running
//! longer than their kind's timeout regardless of worker health. Requeued
//! jobs go through the normal retry path; the reaper never touches pod rows
//! directly.

use crate::audit::AuditRecorder;
use crate::error::Result;
use crate::lifecycle::LifecycleManager;
use cloudpods_commons::models::{Job, WorkerStatus};
use cloudpods_commons::WorkerId;
use cloudpods_configs::OrchestratorConfig;
use cloudpods_system::{JobsProvider, WorkersProvider};
use std::collections::HashSet;
use std::sync::Arc;

/// Outcome of one reaper pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReapSummary {
    /// Stale workers marked offline.
    pub workers_offlined: usize,
    /// Jobs returned to the queue for another attempt.
    pub jobs_requeued: usize,
    /// Jobs whose retry budget was already spent.
    pub jobs_failed: usize,
}

pub struct Reaper {
    jobs: Arc<JobsProvider>,
    workers: Arc<WorkersProvider>,
    audit: Arc<AuditRecorder>,
    lifecycle: Arc<LifecycleManager>,
    config: Arc<OrchestratorConfig>,
}

impl Reaper {
    pub fn new(
        jobs: Arc<JobsProvider>,
        workers: Arc<WorkersProvider>,
        audit: Arc<AuditRecorder>,
        lifecycle: Arc<LifecycleManager>,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        Self {
            jobs,
            workers,
            audit,
            lifecycle,
            config,
        }
    }

    /// Heartbeat age beyond which a worker counts as dead.
    fn stale_threshold_ms(&self) -> i64 {
        let interval = self.config.jobs.heartbeat_interval_seconds.max(1);
        interval as i64 * self.config.jobs.stale_after_intervals.max(1) as i64 * 1000
    }

    /// Run one reaper pass.
    ///
    /// Stale workers are marked offline first, then every `Running` job is
    /// checked: jobs whose claimant is no longer a live worker, and jobs
    /// past `started_at + kind timeout`, are requeued for an immediate
    /// retry or failed permanently when their budget is spent. Individual
    /// job errors are logged and skipped so one contested row cannot stall
    /// the pass; a worker settling its own job concurrently loses or wins
    /// the row race cleanly either way.
    pub async fn run_once(&self, now: i64) -> Result<ReapSummary> {
        let threshold = self.stale_threshold_ms();
        let mut summary = ReapSummary::default();

        let all_workers = self.workers.list_all()?;
        let live: HashSet<WorkerId> = all_workers
            .iter()
            .filter(|w| w.status == WorkerStatus::Online && !w.is_stale(threshold, now))
            .map(|w| w.worker_id.clone())
            .collect();

        for worker in &all_workers {
            if worker.status != WorkerStatus::Online || live.contains(&worker.worker_id) {
                continue;
            }
            log::warn!(
                "Worker {} missed {} heartbeat intervals, marking offline",
                worker.worker_id,
                self.config.jobs.stale_after_intervals
            );
            match self.workers.mark_offline(&worker.worker_id) {
                Ok(_) => summary.workers_offlined += 1,
                Err(e) => log::warn!(
                    "Failed to mark worker {} offline: {}",
                    worker.worker_id,
                    e
                ),
            }
        }

        for job in self.jobs.list_running()? {
            let reason = match reap_reason(&job, &live, now) {
                Some(reason) => reason,
                None => continue,
            };
            match self.reap_job(&job, reason, now).await {
                Ok(true) => summary.jobs_requeued += 1,
                Ok(false) => summary.jobs_failed += 1,
                Err(e) => log::warn!("[{}] Reap skipped: {}", job.job_id, e),
            }
        }

        if summary.jobs_requeued > 0 || summary.jobs_failed > 0 {
            log::info!(
                "Reaper pass: {} workers offlined, {} jobs requeued, {} jobs failed",
                summary.workers_offlined,
                summary.jobs_requeued,
                summary.jobs_failed
            );
        }
        Ok(summary)
    }

    /// Requeue one orphaned job, or fail it permanently when its retry
    /// budget is spent. Returns whether the job was requeued.
    async fn reap_job(&self, job: &Job, reason: String, now: i64) -> Result<bool> {
        if job.can_retry() {
            self.jobs.reschedule(&job.job_id, reason.clone(), now, now)?;
            log::warn!("[{}] Job requeued by reaper: {}", job.job_id, reason);
            return Ok(true);
        }

        let error = format!("Retry budget exhausted: {}", reason);
        let failed = self
            .jobs
            .fail_permanently(&job.job_id, error.clone(), now)?;
        log::error!(
            "[{}] Job permanently failed after {} attempts: {}",
            job.job_id,
            failed.attempts,
            error
        );

        let metadata = serde_json::json!({
            "kind": job.kind.as_str(),
            "attempts": failed.attempts,
            "error": error,
        });
        if let Err(e) = self.audit.record_system(
            &job.tenant_id,
            "job.exhausted",
            "job",
            job.job_id.as_str(),
            Some(metadata),
        ) {
            log::warn!("[{}] Failed to record audit event: {}", job.job_id, e);
        }

        if let Err(e) = self.lifecycle.on_job_exhausted(job, &error).await {
            log::error!("[{}] Post-failure pod handling failed: {}", job.job_id, e);
        }

        Ok(false)
    }
}

/// Why a running job should be taken back, or `None` to leave it alone.
fn reap_reason(job: &Job, live: &HashSet<WorkerId>, now: i64) -> Option<String> {
    let timeout_ms = job.kind.timeout_seconds() * 1000;
    if let Some(started_at) = job.started_at {
        if now - started_at > timeout_ms {
            return Some(format!(
                "Job exceeded its {}s timeout",
                job.kind.timeout_seconds()
            ));
        }
    }
    match &job.claimed_by {
        Some(worker_id) if live.contains(worker_id) => None,
        Some(worker_id) => Some(format!("Claimed by dead worker {}", worker_id)),
        // A Running job with no claimant is corrupt state; requeue it.
        None => Some("Running job has no claimant".to_string()),
    }
}
