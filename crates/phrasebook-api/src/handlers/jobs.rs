//! Job handlers for background processing.

use async_trait::async_trait;
use tracing::{instrument, warn};

use phrasebook_core::JobType;
use phrasebook_jobs::{JobContext, JobHandler, JobResult};

use crate::services::PhraseService;

/// Runs [`PhraseService::enrich`] for `CategorizePhrase` jobs.
///
/// Transient store errors go back on the queue as [`JobResult::Retry`]. Every
/// enrichment outcome, fallbacks included, completes the job.
pub struct CategorizationHandler {
    phrases: PhraseService,
}

impl CategorizationHandler {
    pub fn new(phrases: PhraseService) -> Self {
        Self { phrases }
    }
}

#[async_trait]
impl JobHandler for CategorizationHandler {
    fn job_type(&self) -> JobType {
        JobType::CategorizePhrase
    }

    #[instrument(skip(self, ctx), fields(job_id = %ctx.job.id, subsystem = "jobs", component = "categorization"))]
    async fn execute(&self, ctx: JobContext) -> JobResult {
        let Some(phrase_id) = ctx.phrase_id() else {
            return JobResult::Failed("Job has no phrase_id".to_string());
        };

        ctx.report_progress(10, Some("Categorizing phrase"));
        match self.phrases.enrich(phrase_id).await {
            Ok(outcome) => {
                ctx.report_progress(100, Some("Done"));
                JobResult::Success(serde_json::to_value(&outcome).ok())
            }
            Err(e) if e.is_transient() => {
                warn!(phrase_id = %phrase_id, error = %e, "Enrichment hit a store error");
                JobResult::Retry(e.to_string())
            }
            Err(e) => {
                warn!(phrase_id = %phrase_id, error = %e, "Enrichment failed");
                JobResult::Failed(e.to_string())
            }
        }
    }
}
