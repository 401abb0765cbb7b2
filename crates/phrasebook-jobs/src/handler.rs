//! What a job handler sees and what it returns.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use phrasebook_core::{Job, JobType};

/// Receives `(percent, message)` progress reports from a running handler.
pub type ProgressCallback = Box<dyn Fn(i32, Option<&str>) + Send + Sync>;

/// A claimed job plus the worker's progress sink.
pub struct JobContext {
    pub job: Job,
    progress: Option<ProgressCallback>,
}

impl JobContext {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            progress: None,
        }
    }

    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(i32, Option<&str>) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn report_progress(&self, percent: i32, message: Option<&str>) {
        if let Some(progress) = &self.progress {
            progress(percent, message);
        }
    }

    /// The phrase this job targets: the `phrase_id` column, or else a
    /// `"phrase_id"` string in the payload.
    pub fn phrase_id(&self) -> Option<Uuid> {
        self.job.phrase_id.or_else(|| {
            self.payload()?
                .get("phrase_id")?
                .as_str()?
                .parse()
                .ok()
        })
    }

    pub fn payload(&self) -> Option<&JsonValue> {
        self.job.payload.as_ref()
    }
}

/// Outcome of one handler run.
///
/// `Failed` and `Retry` both go through [`JobRepository::fail`], which
/// requeues while retries remain. `Retry` marks problems expected to clear
/// on their own, such as an unreachable store.
///
/// [`JobRepository::fail`]: phrasebook_core::JobRepository::fail
#[derive(Debug)]
pub enum JobResult {
    Success(Option<JsonValue>),
    Failed(String),
    Retry(String),
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success(_))
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> JobType;

    async fn execute(&self, ctx: JobContext) -> JobResult;
}

/// Completes every job it receives. Used to exercise the worker loop.
pub struct NoOpHandler {
    job_type: JobType,
}

impl NoOpHandler {
    pub fn new(job_type: JobType) -> Self {
        Self { job_type }
    }
}

#[async_trait]
impl JobHandler for NoOpHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        ctx.report_progress(100, None);
        JobResult::Success(None)
    }
}
