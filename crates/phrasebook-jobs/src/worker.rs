//! The queue worker: claims pending jobs in batches and runs their handlers.
//!
//! The worker sleeps only while the queue is empty. It wakes when the poll
//! interval elapses, when the repository fires the shared [`Notify`] on a
//! new job, or when shutdown is requested.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, Notify, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use phrasebook_core::{defaults, Error, Job, JobRepository, JobType, Result};

use crate::handler::{JobContext, JobHandler, JobResult};
use crate::DEFAULT_POLL_INTERVAL_MS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Fallback poll when no wake-up arrives.
    pub poll_interval_ms: u64,
    /// Jobs claimed and run together per batch.
    pub max_concurrent_jobs: usize,
    /// Upper bound on a single handler run.
    pub job_timeout_secs: u64,
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_concurrent_jobs: defaults::JOB_MAX_CONCURRENT,
            job_timeout_secs: defaults::JOB_TIMEOUT_SECS,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Defaults overridden from the environment.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `JOB_WORKER_ENABLED` | `true` (`false` or `0` disables) |
    /// | `JOB_MAX_CONCURRENT` | `4` |
    /// | `JOB_POLL_INTERVAL_MS` | `5000` |
    /// | `JOB_TIMEOUT_SECS` | `120` |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr>(raw: Option<String>) -> Option<T> {
            raw.and_then(|v| v.trim().parse().ok())
        }

        let defaults = Self::default();
        Self {
            enabled: lookup("JOB_WORKER_ENABLED")
                .map(|v| !matches!(v.trim(), "false" | "0"))
                .unwrap_or(defaults.enabled),
            max_concurrent_jobs: parsed::<usize>(lookup("JOB_MAX_CONCURRENT"))
                .unwrap_or(defaults.max_concurrent_jobs)
                .max(1),
            poll_interval_ms: parsed(lookup("JOB_POLL_INTERVAL_MS"))
                .unwrap_or(defaults.poll_interval_ms),
            job_timeout_secs: parsed::<u64>(lookup("JOB_TIMEOUT_SECS"))
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.job_timeout_secs),
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    pub fn with_job_timeout(mut self, secs: u64) -> Self {
        self.job_timeout_secs = secs;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

/// Lifecycle and per-job notifications, broadcast to every subscriber.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    JobStarted { job_id: Uuid, job_type: JobType },
    JobProgress {
        job_id: Uuid,
        percent: i32,
        message: Option<String>,
    },
    JobCompleted { job_id: Uuid, job_type: JobType },
    /// The repository may still requeue the job for another attempt.
    JobFailed {
        job_id: Uuid,
        job_type: JobType,
        error: String,
    },
    WorkerStarted,
    WorkerStopped,
}

/// Control handle for a started worker. Dropping it stops the worker at its
/// next idle wait.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Job worker already stopped".into()))
    }

    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Handlers keyed by the job type they serve.
#[derive(Clone, Default)]
struct Registry(Arc<RwLock<HashMap<JobType, Arc<dyn JobHandler>>>>);

impl Registry {
    async fn insert(&self, handler: Arc<dyn JobHandler>) -> JobType {
        let job_type = handler.job_type();
        self.0.write().await.insert(job_type, handler);
        job_type
    }

    async fn job_types(&self) -> Vec<JobType> {
        self.0.read().await.keys().copied().collect()
    }

    async fn get(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.0.read().await.get(&job_type).cloned()
    }
}

/// Why an idle wait ended.
#[derive(Debug, PartialEq, Eq)]
enum Wake {
    Shutdown,
    Timer,
    Queued,
}

pub struct JobWorker {
    jobs: Arc<dyn JobRepository>,
    config: WorkerConfig,
    registry: Registry,
    event_tx: broadcast::Sender<WorkerEvent>,
    notify: Option<Arc<Notify>>,
}

impl JobWorker {
    pub fn new(jobs: Arc<dyn JobRepository>, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            jobs,
            config,
            registry: Registry::default(),
            event_tx,
            notify: None,
        }
    }

    /// Wake from idle as soon as `notify` fires.
    pub fn with_notify(mut self, notify: Arc<Notify>) -> Self {
        self.notify = Some(notify);
        self
    }

    pub async fn register_handler<H: JobHandler + 'static>(&self, handler: H) {
        let job_type = self.registry.insert(Arc::new(handler)).await;
        debug!(subsystem = "jobs", component = "worker", ?job_type, "Registered job handler");
    }

    /// Spawn the worker loop onto the runtime.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Subscribe before [`start`](Self::start) to see `WorkerStarted`.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    pub async fn pending_count(&self) -> Result<i64> {
        self.jobs.pending_count().await
    }

    #[instrument(skip_all, fields(subsystem = "jobs", component = "worker"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Job worker disabled, queue left untouched");
            return;
        }

        self.recover_interrupted().await;

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_jobs,
            job_timeout_secs = self.config.job_timeout_secs,
            notify = self.notify.is_some(),
            "Job worker started"
        );
        self.emit(WorkerEvent::WorkerStarted);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            let batch = self.claim_batch().await;
            if batch.is_empty() {
                match self.idle(shutdown_rx).await {
                    Wake::Shutdown => break,
                    Wake::Queued => debug!("Woken by queued job"),
                    Wake::Timer => {}
                }
                continue;
            }

            self.run_batch(batch).await;
        }

        self.emit(WorkerEvent::WorkerStopped);
        info!("Job worker stopped");
    }

    /// Jobs left `running` by a crash are delivered again.
    async fn recover_interrupted(&self) {
        match self.jobs.requeue_interrupted().await {
            Ok(0) => {}
            Ok(requeued) => info!(op = "requeue_interrupted", requeued, "Requeued interrupted jobs"),
            Err(e) => error!(op = "requeue_interrupted", error = %e, "Failed to requeue interrupted jobs"),
        }
    }

    async fn claim_batch(&self) -> Vec<Job> {
        let job_types = self.registry.job_types().await;
        if job_types.is_empty() {
            return Vec::new();
        }

        let mut batch = Vec::new();
        while batch.len() < self.config.max_concurrent_jobs.max(1) {
            match self.jobs.claim_next_for_types(&job_types).await {
                Ok(Some(job)) => batch.push(job),
                Ok(None) => break,
                Err(e) => {
                    error!(op = "claim_next", error = %e, "Failed to claim job");
                    break;
                }
            }
        }
        batch
    }

    async fn idle(&self, shutdown_rx: &mut mpsc::Receiver<()>) -> Wake {
        tokio::select! {
            _ = shutdown_rx.recv() => Wake::Shutdown,
            _ = tokio::time::sleep(self.config.poll_interval()) => Wake::Timer,
            _ = wait_for_wake(self.notify.as_deref()) => Wake::Queued,
        }
    }

    async fn run_batch(&self, batch: Vec<Job>) {
        debug!(claimed = batch.len(), "Running job batch");

        let mut tasks = JoinSet::new();
        for job in batch {
            let executor = self.executor();
            tasks.spawn(executor.run(job));
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = ?e, "Job task panicked");
            }
        }
    }

    fn executor(&self) -> Executor {
        Executor {
            jobs: self.jobs.clone(),
            registry: self.registry.clone(),
            event_tx: self.event_tx.clone(),
            timeout: self.config.job_timeout(),
        }
    }

    fn emit(&self, event: WorkerEvent) {
        let _ = self.event_tx.send(event);
    }
}

async fn wait_for_wake(notify: Option<&Notify>) {
    match notify {
        Some(notify) => notify.notified().await,
        None => std::future::pending().await,
    }
}

/// Runs one claimed job inside a spawned task and records its outcome.
struct Executor {
    jobs: Arc<dyn JobRepository>,
    registry: Registry,
    event_tx: broadcast::Sender<WorkerEvent>,
    timeout: Duration,
}

impl Executor {
    async fn run(self, job: Job) {
        let start = Instant::now();
        let (job_id, job_type) = (job.id, job.job_type);

        info!(
            subsystem = "jobs",
            component = "worker",
            op = "execute",
            %job_id,
            ?job_type,
            phrase_id = ?job.phrase_id,
            retry_count = job.retry_count,
            "Processing job"
        );
        self.emit(WorkerEvent::JobStarted { job_id, job_type });

        let outcome = self.dispatch(job).await;
        debug!(
            subsystem = "jobs",
            component = "worker",
            %job_id,
            success = outcome.is_success(),
            "Handler returned"
        );
        self.record(job_id, job_type, outcome, start.elapsed()).await;
    }

    async fn dispatch(&self, job: Job) -> JobResult {
        let (job_id, job_type) = (job.id, job.job_type);
        let Some(handler) = self.registry.get(job_type).await else {
            warn!(subsystem = "jobs", component = "worker", ?job_type, "No handler registered");
            return JobResult::Failed(format!("No handler for job type: {:?}", job_type));
        };

        let progress_tx = self.event_tx.clone();
        let ctx = JobContext::new(job).with_progress_callback(move |percent, message| {
            let _ = progress_tx.send(WorkerEvent::JobProgress {
                job_id,
                percent,
                message: message.map(String::from),
            });
        });

        match tokio::time::timeout(self.timeout, handler.execute(ctx)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let secs = self.timeout.as_secs();
                warn!(
                    subsystem = "jobs",
                    component = "worker",
                    %job_id,
                    timeout_secs = secs,
                    "Job exceeded timeout"
                );
                JobResult::Failed(format!("Job exceeded timeout of {}s", secs))
            }
        }
    }

    async fn record(&self, job_id: Uuid, job_type: JobType, outcome: JobResult, elapsed: Duration) {
        let duration_ms = elapsed.as_millis() as u64;
        match outcome {
            JobResult::Success(result) => match self.jobs.complete(job_id, result).await {
                Ok(()) => {
                    info!(
                        subsystem = "jobs",
                        component = "worker",
                        %job_id,
                        duration_ms,
                        "Job completed"
                    );
                    self.emit(WorkerEvent::JobCompleted { job_id, job_type });
                }
                Err(e) => error!(
                    subsystem = "jobs",
                    component = "worker",
                    %job_id,
                    error = %e,
                    "Failed to mark job completed"
                ),
            },
            // The repository decides between requeue and a terminal failure.
            JobResult::Failed(error) | JobResult::Retry(error) => {
                match self.jobs.fail(job_id, &error).await {
                    Ok(()) => {
                        warn!(
                            subsystem = "jobs",
                            component = "worker",
                            %job_id,
                            %error,
                            duration_ms,
                            "Job failed"
                        );
                        self.emit(WorkerEvent::JobFailed {
                            job_id,
                            job_type,
                            error,
                        });
                    }
                    Err(e) => error!(
                        subsystem = "jobs",
                        component = "worker",
                        %job_id,
                        error = %e,
                        "Failed to mark job failed"
                    ),
                }
            }
        }
    }

    fn emit(&self, event: WorkerEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Assembles a [`JobWorker`] from a repository, config, handlers and an
/// optional wake-up handle.
pub struct WorkerBuilder {
    jobs: Arc<dyn JobRepository>,
    config: WorkerConfig,
    handlers: Vec<Arc<dyn JobHandler>>,
    notify: Option<Arc<Notify>>,
}

impl WorkerBuilder {
    pub fn new(jobs: Arc<dyn JobRepository>) -> Self {
        Self {
            jobs,
            config: WorkerConfig::default(),
            handlers: Vec::new(),
            notify: None,
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_handler<H: JobHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// The handle the job repository fires when it queues a job.
    pub fn with_notify(mut self, notify: Arc<Notify>) -> Self {
        self.notify = Some(notify);
        self
    }

    pub async fn build(self) -> JobWorker {
        let mut worker = JobWorker::new(self.jobs, self.config);
        if let Some(notify) = self.notify {
            worker = worker.with_notify(notify);
        }
        for handler in self.handlers {
            worker.registry.insert(handler).await;
        }
        worker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> WorkerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_config_defaults() {
        let config = config_from(&[]);
        assert_eq!(config, WorkerConfig::default());
        assert_eq!(config.poll_interval_ms, 5_000);
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.job_timeout_secs, 120);
        assert!(config.enabled);
    }

    #[test]
    fn test_config_from_env_values() {
        let config = config_from(&[
            ("JOB_WORKER_ENABLED", "0"),
            ("JOB_MAX_CONCURRENT", "2"),
            ("JOB_POLL_INTERVAL_MS", "250"),
            ("JOB_TIMEOUT_SECS", "30"),
        ]);
        assert!(!config.enabled);
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.job_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_config_rejects_zero_concurrency_and_timeout() {
        let config = config_from(&[("JOB_MAX_CONCURRENT", "0"), ("JOB_TIMEOUT_SECS", "0")]);
        assert_eq!(config.max_concurrent_jobs, 1);
        assert_eq!(config.job_timeout_secs, defaults::JOB_TIMEOUT_SECS);
    }

    #[test]
    fn test_config_builder() {
        let config = WorkerConfig::default()
            .with_poll_interval(1000)
            .with_max_concurrent(8)
            .with_job_timeout(5)
            .with_enabled(false);

        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.max_concurrent_jobs, 8);
        assert_eq!(config.job_timeout_secs, 5);
        assert!(!config.enabled);
    }

    #[tokio::test]
    async fn test_registry_lists_registered_types() {
        let registry = Registry::default();
        assert!(registry.job_types().await.is_empty());

        registry
            .insert(Arc::new(crate::NoOpHandler::new(JobType::CategorizePhrase)))
            .await;
        assert_eq!(registry.job_types().await, vec![JobType::CategorizePhrase]);
        assert!(registry.get(JobType::CategorizePhrase).await.is_some());
    }

    #[tokio::test]
    async fn test_wait_for_wake_without_notify_never_resolves() {
        let waited = tokio::time::timeout(Duration::from_millis(20), wait_for_wake(None)).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_wait_for_wake_uses_stored_permit() {
        let notify = Notify::new();
        notify.notify_one();
        let waited =
            tokio::time::timeout(Duration::from_millis(20), wait_for_wake(Some(&notify))).await;
        assert!(waited.is_ok());
    }
}
