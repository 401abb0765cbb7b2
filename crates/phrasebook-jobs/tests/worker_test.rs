//! Worker loop against the in-memory job repository.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;

use phrasebook_db::InMemoryJobRepository;
use phrasebook_jobs::{
    JobContext, JobHandler, JobRepository, JobResult, JobStatus, JobType, NoOpHandler,
    WorkerBuilder, WorkerConfig, WorkerEvent,
};

/// Counts calls and answers with a fixed result kind.
struct CountingHandler {
    calls: Arc<AtomicUsize>,
    outcome: fn() -> JobResult,
}

#[async_trait]
impl JobHandler for CountingHandler {
    fn job_type(&self) -> JobType {
        JobType::CategorizePhrase
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        assert!(ctx.phrase_id().is_some());
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.outcome)()
    }
}

struct SlowHandler;

#[async_trait]
impl JobHandler for SlowHandler {
    fn job_type(&self) -> JobType {
        JobType::CategorizePhrase
    }

    async fn execute(&self, _ctx: JobContext) -> JobResult {
        tokio::time::sleep(Duration::from_secs(30)).await;
        JobResult::Success(None)
    }
}

async fn queue_one(repo: &InMemoryJobRepository) -> Uuid {
    let phrase_id = Uuid::now_v7();
    repo.queue(
        Some(phrase_id),
        JobType::CategorizePhrase,
        JobType::CategorizePhrase.default_priority(),
        Some(json!({ "phrase_id": phrase_id })),
    )
    .await
    .unwrap()
}

/// Wait for the first event matching `pred`, failing after `secs`.
async fn wait_for<F>(events: &mut broadcast::Receiver<WorkerEvent>, secs: u64, pred: F) -> WorkerEvent
where
    F: Fn(&WorkerEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(secs), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event channel closed: {:?}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for worker event")
}

#[tokio::test]
async fn test_worker_completes_queued_job() {
    let repo = Arc::new(InMemoryJobRepository::new());
    let job_id = queue_one(&repo).await;

    let worker = WorkerBuilder::new(repo.clone())
        .with_config(WorkerConfig::default().with_poll_interval(50))
        .with_handler(NoOpHandler::new(JobType::CategorizePhrase))
        .build()
        .await;
    let mut events = worker.events();
    let handle = worker.start();

    wait_for(&mut events, 5, |e| {
        matches!(e, WorkerEvent::JobCompleted { job_id: id, .. } if *id == job_id)
    })
    .await;

    let job = repo.get(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.completed_at.is_some());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_notify_wakes_idle_worker_before_poll_interval() {
    let repo = Arc::new(InMemoryJobRepository::new());

    let worker = WorkerBuilder::new(repo.clone())
        .with_config(WorkerConfig::default().with_poll_interval(60_000))
        .with_notify(repo.job_notify())
        .with_handler(NoOpHandler::new(JobType::CategorizePhrase))
        .build()
        .await;
    let mut events = worker.events();
    let handle = worker.start();

    // Let the worker reach its idle wait first.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let job_id = queue_one(&repo).await;

    wait_for(&mut events, 5, |e| {
        matches!(e, WorkerEvent::JobCompleted { job_id: id, .. } if *id == job_id)
    })
    .await;

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_retry_result_requeues_until_max_retries() {
    let repo = Arc::new(InMemoryJobRepository::new());
    let job_id = queue_one(&repo).await;
    let calls = Arc::new(AtomicUsize::new(0));

    let worker = WorkerBuilder::new(repo.clone())
        .with_config(WorkerConfig::default().with_poll_interval(20))
        .with_handler(CountingHandler {
            calls: calls.clone(),
            outcome: || JobResult::Retry("store unavailable".to_string()),
        })
        .build()
        .await;
    let handle = worker.start();

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let job = repo.get(job_id).await.unwrap().unwrap();
            if job.status == JobStatus::Failed {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .map(|job| {
        assert_eq!(job.retry_count, job.max_retries);
        assert_eq!(job.error_message.as_deref(), Some("store unavailable"));
    })
    .expect("job never reached failed");

    // One initial attempt plus one per retry.
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_interrupted_job_is_delivered_again() {
    let repo = Arc::new(InMemoryJobRepository::new());
    let job_id = queue_one(&repo).await;

    // Simulate a previous process that claimed the job and died.
    let claimed = repo
        .claim_next_for_types(&[JobType::CategorizePhrase])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.id, job_id);
    assert_eq!(
        repo.get(job_id).await.unwrap().unwrap().status,
        JobStatus::Running
    );

    let calls = Arc::new(AtomicUsize::new(0));
    let worker = WorkerBuilder::new(repo.clone())
        .with_config(WorkerConfig::default().with_poll_interval(20))
        .with_handler(CountingHandler {
            calls: calls.clone(),
            outcome: || JobResult::Success(None),
        })
        .build()
        .await;
    let mut events = worker.events();
    let handle = worker.start();

    wait_for(&mut events, 5, |e| matches!(e, WorkerEvent::JobCompleted { .. })).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_timeout_fails_job() {
    let repo = Arc::new(InMemoryJobRepository::new());
    let job_id = queue_one(&repo).await;

    let worker = WorkerBuilder::new(repo.clone())
        .with_config(
            WorkerConfig::default()
                .with_poll_interval(60_000)
                .with_job_timeout(1),
        )
        .with_handler(SlowHandler)
        .build()
        .await;
    let mut events = worker.events();
    let handle = worker.start();

    let event = wait_for(&mut events, 5, |e| matches!(e, WorkerEvent::JobFailed { .. })).await;
    match event {
        WorkerEvent::JobFailed { job_id: id, error, .. } => {
            assert_eq!(id, job_id);
            assert!(error.contains("timeout"));
        }
        other => panic!("unexpected event {:?}", other),
    }

    let job = repo.get(job_id).await.unwrap().unwrap();
    assert_eq!(job.retry_count, 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_disabled_worker_leaves_queue_untouched() {
    let repo = Arc::new(InMemoryJobRepository::new());
    queue_one(&repo).await;

    let worker = WorkerBuilder::new(repo.clone())
        .with_config(WorkerConfig::default().with_poll_interval(10).with_enabled(false))
        .with_handler(NoOpHandler::new(JobType::CategorizePhrase))
        .build()
        .await;
    let _handle = worker.start();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(repo.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_shutdown_emits_worker_stopped() {
    let repo = Arc::new(InMemoryJobRepository::new());

    let worker = WorkerBuilder::new(repo.clone())
        .with_config(WorkerConfig::default().with_poll_interval(60_000))
        .with_handler(NoOpHandler::new(JobType::CategorizePhrase))
        .build()
        .await;
    let mut events = worker.events();
    let handle = worker.start();

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.shutdown().await.unwrap();

    wait_for(&mut events, 5, |e| matches!(e, WorkerEvent::WorkerStopped)).await;
}
