use super::types::WorkerCoordinator;
use crate::error::Result;
use crate::jobs::executor_trait::JobOutcome;
use crate::jobs::retry::backoff_ms;
use cloudpods_commons::models::{AuditScope, Job, JobFilter, JobStatus, Worker, WorkerStatus};
use cloudpods_commons::{now_millis, JobId};
use log::Level;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{sleep, Duration, Instant};

impl WorkerCoordinator {
    /// Register this worker in the worker table and mark it online.
    pub async fn register_worker(&self) -> Result<()> {
        let now = now_millis();
        let worker = Worker {
            worker_id: self.worker_id.clone(),
            name: self.worker_name.clone(),
            queue: self.queue.clone(),
            status: WorkerStatus::Online,
            last_heartbeat_at: now,
            registered_at: now,
        };
        self.workers.register(worker)?;
        Ok(())
    }

    /// Run the job processing loop.
    ///
    /// Continuously claims pending jobs from this worker's queue and executes
    /// them through the registered executors, up to `max_concurrent` at a
    /// time. Jobs enqueued through this coordinator wake the loop
    /// immediately; fallback polling picks up retries and jobs enqueued
    /// elsewhere. Heartbeats are recorded inline so a wedged loop stops
    /// beating and the reaper can reclaim its jobs.
    pub async fn run_loop(&self, max_concurrent: usize) -> Result<()> {
        log::debug!(
            "Starting job processing loop (worker={}, queue={}, max {} concurrent)",
            self.worker_id,
            self.queue,
            max_concurrent
        );

        // Take the awake receiver - can only run one loop per coordinator
        let mut awake_receiver: mpsc::UnboundedReceiver<JobId> = self
            .awake_receiver
            .lock()
            .await
            .take()
            .expect("run_loop can only be called once per WorkerCoordinator");

        self.register_worker().await?;

        // Requeue whatever this worker's previous run left behind
        self.recover_incomplete_jobs().await?;

        let heartbeat_interval =
            Duration::from_secs(self.config.jobs.heartbeat_interval_seconds.max(1));
        let mut last_heartbeat = Instant::now();
        let poll_interval = Duration::from_millis(self.config.jobs.poll_interval_ms.max(10));

        let max_concurrent = max_concurrent.max(1);
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let coordinator = self.app_context().coordinator();
        let mut join_set = JoinSet::new();

        loop {
            // Check for shutdown signal (lock-free atomic check)
            if self.is_shutting_down() {
                log::info!("Shutdown signal received, stopping job loop");
                break;
            }

            while let Some(result) = join_set.try_join_next() {
                if let Err(err) = result {
                    log::error!("Job task panicked: {}", err);
                }
            }

            if last_heartbeat.elapsed() >= heartbeat_interval {
                let beat = self
                    .workers
                    .heartbeat_async(self.worker_id.clone(), now_millis())
                    .await;
                if let Err(e) = beat {
                    log::warn!("Failed to record worker heartbeat: {}", e);
                }
                last_heartbeat = Instant::now();
            }

            if semaphore.available_permits() == 0 {
                if let Some(Err(err)) = join_set.join_next().await {
                    log::error!("Job task panicked: {}", err);
                }
                continue;
            }

            let permit = match Arc::clone(&semaphore).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    sleep(Duration::from_millis(50)).await;
                    continue;
                }
            };

            // Wait for an enqueue wakeup or fall back to polling. Polling
            // covers retries whose scheduled_at just passed and jobs
            // enqueued by other processes sharing the store.
            let _awakened = tokio::select! {
                biased;
                Some(job_id) = awake_receiver.recv() => Some(job_id),
                _ = sleep(poll_interval) => None,
            };

            match self
                .jobs
                .claim_next_async(self.queue.clone(), self.worker_id.clone(), now_millis())
                .await
            {
                Ok(Some(job)) => {
                    self.log_job_event(
                        &job.job_id,
                        Level::Info,
                        &format!(
                            "Job claimed: kind={}, attempt {}/{}",
                            job.kind,
                            job.attempts + 1,
                            job.max_attempts
                        ),
                    );
                    let coordinator = Arc::clone(&coordinator);
                    join_set.spawn(async move {
                        let _permit = permit;
                        if let Err(e) = coordinator.execute_claimed(job).await {
                            log::error!("Job execution failed critically: {}", e);
                        }
                    });
                }
                Ok(None) => {
                    drop(permit);
                    // No eligible jobs - continue loop (select! already waited)
                }
                Err(e) => {
                    drop(permit);
                    log::error!("Failed to claim next job: {}", e);
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }

        // Drain in-flight jobs before going offline
        while let Some(result) = join_set.join_next().await {
            if let Err(err) = result {
                log::error!("Job task panicked: {}", err);
            }
        }
        if let Err(e) = self.workers.mark_offline(&self.worker_id) {
            log::warn!("Failed to mark worker offline: {}", e);
        }
        log::info!("Worker {} stopped", self.worker_id);

        Ok(())
    }

    /// Run a single claim-and-execute cycle (test helper).
    ///
    /// Returns Ok(true) if a job was executed, Ok(false) if none were
    /// eligible.
    pub async fn run_once_for_tests(&self) -> Result<bool> {
        let claimed = self
            .jobs
            .claim_next_async(self.queue.clone(), self.worker_id.clone(), now_millis())
            .await?;

        if let Some(job) = claimed {
            self.execute_claimed(job).await?;
            return Ok(true);
        }

        Ok(false)
    }

    /// Execute one claimed job and settle its row from the outcome.
    ///
    /// Executors run under the kind's timeout; hitting it counts as a
    /// transient failure. Executor-level errors (unknown kind, payload that
    /// fails to decode or validate) are permanent: retrying cannot fix them.
    pub(crate) async fn execute_claimed(&self, job: Job) -> Result<()> {
        let app_ctx = self.app_context();
        let job_id = job.job_id.clone();
        self.log_job_event(
            &job_id,
            Level::Debug,
            &format!("Job started: kind={}", job.kind),
        );

        let timeout = Duration::from_secs(job.kind.timeout_seconds().max(1) as u64);
        let outcome = match tokio::time::timeout(timeout, self.registry.execute(app_ctx, &job)).await
        {
            Ok(outcome) => outcome,
            Err(_) => Ok(JobOutcome::Retry {
                error: format!(
                    "Execution timed out after {}s",
                    job.kind.timeout_seconds()
                ),
            }),
        };

        let now = now_millis();
        match outcome {
            Ok(JobOutcome::Completed { message }) => {
                self.jobs.complete_async(job_id.clone(), now).await?;
                self.log_job_event(
                    &job_id,
                    Level::Info,
                    &format!(
                        "Job completed: {}",
                        message.as_deref().unwrap_or("ok")
                    ),
                );
            }
            Ok(JobOutcome::Retry { error }) => {
                self.handle_job_retry(&job, &error, now).await?;
            }
            Ok(JobOutcome::Fatal { error }) => {
                self.fail_claimed_job(&job, error, now).await?;
            }
            Err(e) => {
                self.fail_claimed_job(&job, format!("Executor error: {}", e), now)
                    .await?;
            }
        }

        Ok(())
    }

    /// Reschedule a failed job with exponential backoff, or fail it
    /// permanently once the retry budget is spent.
    async fn handle_job_retry(&self, job: &Job, error: &str, now: i64) -> Result<()> {
        if !job.can_retry() {
            return self
                .fail_claimed_job(job, format!("Retry budget exhausted: {}", error), now)
                .await;
        }

        let tenant = Some(&job.tenant_id);
        let base = self.settings.retry_base_delay_seconds(tenant);
        let cap = self.settings.max_retry_delay_seconds(tenant);
        let delay_ms = backoff_ms(base, cap, job.attempts);
        let retry_at = now + delay_ms;

        let updated = self
            .jobs
            .reschedule_async(job.job_id.clone(), error.to_string(), retry_at, now)
            .await?;
        self.log_job_event(
            &job.job_id,
            Level::Warn,
            &format!(
                "Job attempt {}/{} failed, retrying in {}ms: {}",
                updated.attempts, updated.max_attempts, delay_ms, error
            ),
        );

        Ok(())
    }

    /// Terminally fail a claimed job, audit the exhaustion, and give the
    /// lifecycle layer a chance to settle the affected pod.
    async fn fail_claimed_job(&self, job: &Job, error: String, now: i64) -> Result<()> {
        let failed = self
            .jobs
            .fail_permanently_async(job.job_id.clone(), error.clone(), now)
            .await?;
        self.log_job_event(
            &job.job_id,
            Level::Error,
            &format!(
                "Job permanently failed after {} attempts: {}",
                failed.attempts, error
            ),
        );

        let metadata = serde_json::json!({
            "kind": job.kind.as_str(),
            "attempts": failed.attempts,
            "error": error,
        });
        if let Err(e) = self.audit.record(
            AuditScope::Tenant(job.tenant_id.clone()),
            self.worker_id.as_str(),
            "job.exhausted",
            "job",
            job.job_id.as_str(),
            Some(metadata),
        ) {
            log::warn!("[{}] Failed to record audit event: {}", job.job_id, e);
        }

        let app_ctx = self.app_context();
        if let Err(e) = app_ctx.lifecycle().on_job_exhausted(job, &error).await {
            log::error!(
                "[{}] Post-failure pod handling failed: {}",
                job.job_id,
                e
            );
        }

        Ok(())
    }

    /// Recover jobs this worker's previous run left Running.
    ///
    /// A restarted process holds no claims, so any Running job still bearing
    /// this worker id is an orphan: requeue it for an immediate retry, or
    /// fail it permanently when its budget is already spent. Jobs orphaned
    /// by other workers are the reaper's responsibility.
    pub(crate) async fn recover_incomplete_jobs(&self) -> Result<()> {
        let filter = JobFilter {
            status: Some(JobStatus::Running),
            ..Default::default()
        };
        let running = self.jobs.list_jobs_filtered(&filter)?;

        let orphaned: Vec<Job> = running
            .into_iter()
            .filter(|job| job.claimed_by.as_ref() == Some(&self.worker_id))
            .collect();

        if orphaned.is_empty() {
            log::debug!("No incomplete jobs to recover");
            return Ok(());
        }

        log::warn!(
            "Recovering {} incomplete jobs from previous run",
            orphaned.len()
        );

        let now = now_millis();
        for job in orphaned {
            if job.can_retry() {
                self.jobs.reschedule_async(
                    job.job_id.clone(),
                    "Worker restarted".to_string(),
                    now,
                    now,
                )
                .await?;
                self.log_job_event(&job.job_id, Level::Warn, "Job requeued after worker restart");
            } else {
                self.fail_claimed_job(&job, "Worker restarted; retry budget exhausted".to_string(), now)
                    .await?;
            }
        }

        Ok(())
    }
}
