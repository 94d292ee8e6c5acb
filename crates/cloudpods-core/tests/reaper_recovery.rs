//! Worker Crash Recovery Integration Tests
//!
//! A provisioning job claimed by a worker that stops heartbeating must be
//! noticed by the reaper, requeued with the attempt counted, and finished
//! by a healthy worker. The pod converges to active as if the crash never
//! happened.

use cloudpods_commons::models::{Job, JobStatus, Pod, PodStatus, Worker, WorkerStatus};
use cloudpods_commons::{now_millis, TenantId, WorkerId};
use cloudpods_core::lifecycle::NewPodRequest;
use cloudpods_core::scheduler::{ReapSummary, Scheduler};
use cloudpods_core::test_helpers::{test_harness, TestHarness};

/// Create a pod and claim its provisioning job under a worker whose last
/// heartbeat is `now - 120s`, far past the default 45s staleness window.
async fn crashed_claim(harness: &TestHarness, now: i64) -> (Pod, Job) {
    let (pod, job) = harness
        .app_ctx
        .lifecycle()
        .create_pod(NewPodRequest {
            tenant_id: TenantId::new("t1"),
            plan_code: "small".to_string(),
            template: "debian-12".to_string(),
            primary_domain: None,
        })
        .await
        .unwrap();

    let system = harness.app_ctx.system();
    system
        .workers()
        .register(Worker {
            worker_id: WorkerId::new("WK-crashed"),
            name: "WK-crashed-host".to_string(),
            queue: "default".to_string(),
            status: WorkerStatus::Online,
            last_heartbeat_at: now - 120_000,
            registered_at: now - 120_000,
        })
        .unwrap();
    let claimed = system
        .jobs()
        .claim_next("default", &WorkerId::new("WK-crashed"), now)
        .unwrap()
        .unwrap();
    assert_eq!(claimed.job_id, job.job_id);
    assert_eq!(claimed.status, JobStatus::Running);

    (pod, job)
}

#[tokio::test]
async fn test_crashed_worker_claim_is_requeued_and_finished() {
    let harness = test_harness();
    let app_ctx = &harness.app_ctx;
    let now = now_millis();
    let (pod, job) = crashed_claim(&harness, now).await;

    let scheduler = Scheduler::new(app_ctx.clone());
    let summary = scheduler.reaper().run_once(now).await.unwrap();
    assert_eq!(summary.workers_offlined, 1);
    assert_eq!(summary.jobs_requeued, 1);
    assert_eq!(summary.jobs_failed, 0);

    let system = app_ctx.system();
    let requeued = system.jobs().get_job(&job.job_id).unwrap().unwrap();
    assert_eq!(requeued.status, JobStatus::Pending);
    assert_eq!(requeued.attempts, 1);
    assert!(requeued.claimed_by.is_none());
    assert!(requeued.last_error.unwrap().contains("WK-crashed"));
    let worker = system
        .workers()
        .get_worker(&WorkerId::new("WK-crashed"))
        .unwrap()
        .unwrap();
    assert_eq!(worker.status, WorkerStatus::Offline);

    // A healthy worker picks the requeued job up and finishes the pod
    let coordinator = app_ctx.coordinator();
    while coordinator.run_once_for_tests().await.unwrap() {}

    let finished = system.jobs().get_job(&job.job_id).unwrap().unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.attempts, 1);
    let pod = system.pods().get_pod(&pod.pod_id).unwrap().unwrap();
    assert_eq!(pod.status, PodStatus::Active);
    assert!(pod.instance_id.is_some());
    assert_eq!(harness.hypervisor.instance_count(), 1);
}

#[tokio::test]
async fn test_second_sweep_finds_nothing_to_reap() {
    let harness = test_harness();
    let now = now_millis();
    crashed_claim(&harness, now).await;

    let scheduler = Scheduler::new(harness.app_ctx.clone());
    let first = scheduler.reaper().run_once(now).await.unwrap();
    assert_eq!(first.jobs_requeued, 1);

    // Worker already offline, job already back in the queue
    let second = scheduler.reaper().run_once(now).await.unwrap();
    assert_eq!(second, ReapSummary::default());
}
