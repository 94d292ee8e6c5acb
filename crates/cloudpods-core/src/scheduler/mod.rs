//! Timer-driven background work.
//!
//! The scheduler owns every periodic task in the orchestrator: usage
//! sampling, health checks, the reaper pass, backup policy firing, the
//! daily usage rollup and retention pruning. Keeping all timers in one
//! place leaves the rest of the system event-driven and testable with
//! explicit `now` arguments; tests call the underlying `run_*` methods
//! directly instead of waiting for wall-clock ticks.

pub mod reaper;

pub use reaper::{ReapSummary, Reaper};

use crate::app_context::AppContext;
use crate::error::Result;
use chrono::{DateTime, NaiveTime, Utc};
use cloudpods_commons::now_millis;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinSet;
use tokio::time::{interval, sleep, Duration, Instant, MissedTickBehavior};

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

pub struct Scheduler {
    app_ctx: Arc<AppContext>,
    reaper: Arc<Reaper>,
    shutdown: Arc<AtomicBool>,
    notify: Arc<Notify>,
    tasks: Mutex<JoinSet<()>>,
}

impl Scheduler {
    pub fn new(app_ctx: Arc<AppContext>) -> Self {
        let system = app_ctx.system();
        let reaper = Arc::new(Reaper::new(
            system.jobs(),
            system.workers(),
            app_ctx.audit(),
            app_ctx.lifecycle(),
            Arc::clone(app_ctx.config()),
        ));
        Self {
            app_ctx,
            reaper,
            shutdown: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn reaper(&self) -> Arc<Reaper> {
        Arc::clone(&self.reaper)
    }

    /// Spawn every background ticker. Idempotent per scheduler; a second
    /// call is a no-op.
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            log::warn!("Scheduler already started");
            return;
        }

        let config = Arc::clone(self.app_ctx.config());
        log::info!(
            "Starting scheduler (sampling {}s, health {}s, reaper {}s, backups {}s, rollup at {:02}:00 UTC)",
            config.metrics.sample_interval_seconds,
            config.scheduler.health_check_interval_seconds,
            config.scheduler.reaper_interval_seconds,
            config.scheduler.backup_check_interval_seconds,
            config.scheduler.rollup_hour_utc
        );

        let sampler = self.app_ctx.sampler();
        spawn_ticker(
            &mut tasks,
            "Usage sampling",
            Duration::from_secs(config.metrics.sample_interval_seconds.max(1)),
            Arc::clone(&self.shutdown),
            Arc::clone(&self.notify),
            move || {
                let sampler = Arc::clone(&sampler);
                async move {
                    let count = sampler.sample_active_pods(now_millis()).await?;
                    Ok(format!("sampled {} pods", count))
                }
            },
        );

        let health = self.app_ctx.health();
        spawn_ticker(
            &mut tasks,
            "Health check",
            Duration::from_secs(config.scheduler.health_check_interval_seconds.max(1)),
            Arc::clone(&self.shutdown),
            Arc::clone(&self.notify),
            move || {
                let health = Arc::clone(&health);
                async move {
                    let count = health.check_active_pods(now_millis()).await?;
                    Ok(format!("checked {} pods", count))
                }
            },
        );

        // Webhook retry recovery rides the reaper cadence: both exist to
        // pick up work lost to a crashed worker
        let reaper = Arc::clone(&self.reaper);
        let webhooks = self.app_ctx.webhooks();
        spawn_ticker(
            &mut tasks,
            "Reaper",
            Duration::from_secs(config.scheduler.reaper_interval_seconds.max(1)),
            Arc::clone(&self.shutdown),
            Arc::clone(&self.notify),
            move || {
                let reaper = Arc::clone(&reaper);
                let webhooks = Arc::clone(&webhooks);
                async move {
                    let now = now_millis();
                    let summary = reaper.run_once(now).await?;
                    let recovered = webhooks.enqueue_due_retries(now).await?;
                    Ok(format!(
                        "{} workers offlined, {} jobs requeued, {} jobs failed, {} deliveries recovered",
                        summary.workers_offlined,
                        summary.jobs_requeued,
                        summary.jobs_failed,
                        recovered
                    ))
                }
            },
        );

        let backups = self.app_ctx.backups();
        spawn_ticker(
            &mut tasks,
            "Backup check",
            Duration::from_secs(config.scheduler.backup_check_interval_seconds.max(1)),
            Arc::clone(&self.shutdown),
            Arc::clone(&self.notify),
            move || {
                let backups = Arc::clone(&backups);
                async move {
                    let fired = backups.fire_due(now_millis()).await?;
                    Ok(format!("fired {} backup policies", fired))
                }
            },
        );

        self.spawn_daily_task(&mut tasks, config.scheduler.rollup_hour_utc);
    }

    /// Daily work: roll up yesterday's usage, then prune expired rows.
    /// Runs at `rollup_hour_utc` instead of on a fixed interval so the
    /// rolled-up day is always complete.
    fn spawn_daily_task(&self, tasks: &mut JoinSet<()>, rollup_hour_utc: u32) {
        let app_ctx = Arc::clone(&self.app_ctx);
        let shutdown = Arc::clone(&self.shutdown);
        let notify = Arc::clone(&self.notify);
        tasks.spawn(async move {
            loop {
                let wait = next_rollup_delay(Utc::now(), rollup_hour_utc);
                log::debug!("Next daily rollup in {:?}", wait);
                tokio::select! {
                    _ = sleep(wait) => {}
                    _ = notify.notified() => break,
                }
                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                let Some(date) = Utc::now().date_naive().pred_opt() else {
                    continue;
                };
                let started = Instant::now();
                match app_ctx.rollup().rollup_all_for_date(date).await {
                    Ok(count) => log::debug!(
                        "Daily rollup tick: {} rollups for {} in {:?}",
                        count,
                        date,
                        started.elapsed()
                    ),
                    Err(e) => log::error!("Daily rollup for {} failed: {}", date, e),
                }

                let started = Instant::now();
                match run_retention(&app_ctx, now_millis()) {
                    Ok(outcome) => {
                        log::debug!("Retention tick: {} in {:?}", outcome, started.elapsed())
                    }
                    Err(e) => log::error!("Retention sweep failed: {}", e),
                }
            }
            log::debug!("Daily rollup ticker stopped");
        });
    }

    /// Run the retention sweep immediately.
    pub fn run_retention_once(&self, now: i64) -> Result<String> {
        run_retention(&self.app_ctx, now)
    }

    /// Stop all tickers and wait for in-flight ticks to finish.
    pub async fn shutdown(&self) {
        log::debug!("Initiating scheduler shutdown");
        self.shutdown.store(true, Ordering::Release);
        self.notify.notify_waiters();
        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                log::error!("Scheduler task panicked: {}", e);
            }
        }
        log::info!("Scheduler stopped");
    }
}

/// Spawn one fixed-period ticker that runs `tick` until shutdown. The
/// outcome string is logged together with the tick duration.
fn spawn_ticker<F, Fut>(
    tasks: &mut JoinSet<()>,
    name: &'static str,
    period: Duration,
    shutdown: Arc<AtomicBool>,
    notify: Arc<Notify>,
    tick: F,
) where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<String>> + Send,
{
    tasks.spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = notify.notified() => break,
            }
            if shutdown.load(Ordering::Acquire) {
                break;
            }
            let started = Instant::now();
            match tick().await {
                Ok(outcome) => {
                    log::debug!("{} tick: {} in {:?}", name, outcome, started.elapsed())
                }
                Err(e) => log::error!("{} tick failed: {}", name, e),
            }
        }
        log::debug!("{} ticker stopped", name);
    });
}

/// Delete rows past their retention windows. Webhook deliveries share the
/// job retention window; audit chains keep their newest record as the
/// verification anchor.
fn run_retention(app_ctx: &Arc<AppContext>, now: i64) -> Result<String> {
    let settings = app_ctx.settings();
    let system = app_ctx.system();

    let job_days = settings.job_retention_days();
    let jobs_deleted = system.jobs().cleanup_old_jobs(job_days, now)?;
    let deliveries_deleted = system
        .deliveries()
        .cleanup_old_deliveries(job_days, now)?;

    let sample_cutoff = now - settings.sample_retention_days() as i64 * MS_PER_DAY;
    let samples_deleted = system.usage_samples().cleanup_old_samples(sample_cutoff)?;

    let audit_cutoff = now - settings.audit_retention_days() as i64 * MS_PER_DAY;
    let audit = system.audit();
    let mut audit_deleted = 0;
    for scope in audit.list_scopes()? {
        audit_deleted += audit.prune_older_than(&scope, audit_cutoff)?;
    }

    Ok(format!(
        "pruned {} jobs, {} deliveries, {} samples, {} audit records",
        jobs_deleted, deliveries_deleted, samples_deleted, audit_deleted
    ))
}

/// Time until the next `rollup_hour_utc` boundary after `now`.
fn next_rollup_delay(now: DateTime<Utc>, rollup_hour_utc: u32) -> Duration {
    let time = NaiveTime::from_hms_opt(rollup_hour_utc, 0, 0).unwrap_or(NaiveTime::MIN);
    let today_run = now.date_naive().and_time(time).and_utc();
    let target = if now < today_run {
        today_run
    } else {
        today_run + chrono::Duration::days(1)
    };
    (target - now).to_std().unwrap_or(Duration::ZERO)
}
