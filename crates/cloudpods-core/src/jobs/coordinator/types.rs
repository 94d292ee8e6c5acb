use crate::app_context::AppContext;
use crate::audit::AuditRecorder;
use crate::jobs::registry::JobRegistry;
use crate::settings::SettingsService;
use cloudpods_commons::{JobId, WorkerId};
use cloudpods_configs::OrchestratorConfig;
use cloudpods_system::{JobsProvider, WorkersProvider};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tokio::sync::mpsc;

/// Worker coordinator.
///
/// One instance per process. Registers itself in the worker table, claims
/// pending jobs from its queue, dispatches them through the executor
/// registry, and maps each outcome back onto the job row (complete,
/// reschedule with backoff, or permanent failure).
pub struct WorkerCoordinator {
    pub(crate) config: Arc<OrchestratorConfig>,
    /// Job persistence provider
    pub(crate) jobs: Arc<JobsProvider>,
    /// Worker registration and heartbeat provider
    pub(crate) workers: Arc<WorkersProvider>,

    /// Registry of job executors (trait-based dispatch)
    pub(crate) registry: Arc<JobRegistry>,
    pub(crate) settings: Arc<SettingsService>,
    pub(crate) audit: Arc<AuditRecorder>,

    /// Stable worker identity derived from the configured server name, so a
    /// restarted process can recover the jobs its previous run had claimed.
    pub(crate) worker_id: WorkerId,
    pub(crate) worker_name: String,
    /// Queue this coordinator claims from.
    pub(crate) queue: String,

    /// Flag for graceful shutdown (AtomicBool for lock-free access in hot loop)
    pub(crate) shutdown: AtomicBool,
    /// AppContext for global services - uses Weak to avoid Arc cycle
    /// (AppContext holds Arc<WorkerCoordinator>, so we use Weak here)
    pub(crate) app_context: OnceLock<Weak<AppContext>>,

    /// Wakes the run loop as soon as a job is enqueued instead of waiting
    /// for the next poll tick.
    pub(crate) awake_sender: mpsc::UnboundedSender<JobId>,
    pub(crate) awake_receiver: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<JobId>>>,
}

impl WorkerCoordinator {
    pub fn new(
        config: Arc<OrchestratorConfig>,
        jobs: Arc<JobsProvider>,
        workers: Arc<WorkersProvider>,
        registry: Arc<JobRegistry>,
        settings: Arc<SettingsService>,
        audit: Arc<AuditRecorder>,
    ) -> Self {
        let worker_name = config.server.name.clone();
        let worker_id = WorkerId::new(format!("WK-{}", worker_name));
        let queue = config.jobs.queue.clone();
        let (awake_sender, awake_receiver) = mpsc::unbounded_channel();

        Self {
            config,
            jobs,
            workers,
            registry,
            settings,
            audit,
            worker_id,
            worker_name,
            queue,
            shutdown: AtomicBool::new(false),
            app_context: OnceLock::new(),
            awake_sender,
            awake_receiver: tokio::sync::Mutex::new(Some(awake_receiver)),
        }
    }

    /// Attach the AppContext after construction. Supports the initialization
    /// ordering where AppContext is created after the coordinator.
    pub(crate) fn attach_app_context(&self, app_ctx: &Arc<AppContext>) {
        if self.app_context.set(Arc::downgrade(app_ctx)).is_err() {
            log::warn!("AppContext already attached to WorkerCoordinator; ignoring duplicate attach");
        }
    }

    /// Get attached AppContext (panics if AppContext was dropped)
    pub(crate) fn app_context(&self) -> Arc<AppContext> {
        self.app_context
            .get()
            .and_then(|weak| weak.upgrade())
            .expect("AppContext was dropped - WorkerCoordinator outlived AppContext")
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Wake the run loop to claim a freshly enqueued job immediately.
    pub(crate) fn awake(&self, job_id: JobId) {
        // Send fails only when the run loop is gone; polling covers that case
        let _ = self.awake_sender.send(job_id);
    }

    /// Request graceful shutdown
    pub fn shutdown(&self) {
        log::debug!("Initiating worker coordinator shutdown");
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}
