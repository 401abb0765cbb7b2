//! Phrase ingestion and categorization workflow.
//!
//! A phrase is written in the Processing state and a categorization job is
//! queued in the same call. The job later runs [`PhraseService::enrich`],
//! which resolves a category and settles the phrase with a single write.
//!
//! ## Fallback
//!
//! Enrichment never fails on provider problems. Whenever the model cannot
//! produce a usable label the phrase settles as [`Category::LifeWisdom`] and
//! the reason is logged under the `fallback_reason` field.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use phrasebook_core::{
    Category, CreatePhraseRequest, Error, GeneratedPhrase, GenerationBackend, JobRepository,
    JobType, ListPhrasesRequest, Phrase, PhraseRepository, Result, Settings, SettingsRepository,
    UpdatePhraseRequest,
};
use phrasebook_inference::{
    categorization_request, parse_category, parse_generated_phrase, suggestion_request,
};

/// Why enrichment settled on the default category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// No API key is configured.
    NoApiKey,
    /// The provider call failed.
    Provider,
    /// The reply was not one of the category labels.
    UnrecognizedLabel,
    /// Settings could not be read.
    SettingsUnavailable,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::NoApiKey => "no_api_key",
            FallbackReason::Provider => "provider",
            FallbackReason::UnrecognizedLabel => "unrecognized_label",
            FallbackReason::SettingsUnavailable => "settings_unavailable",
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a call to [`PhraseService::enrich`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EnrichOutcome {
    /// The phrase does not exist (deleted before or during enrichment).
    Missing,
    /// The phrase was already settled; nothing was called or written.
    AlreadySettled,
    /// The phrase was settled with `category`.
    Settled {
        category: Category,
        fallback: Option<FallbackReason>,
    },
}

/// Phrase workflow over the repositories and the generation backend.
#[derive(Clone)]
pub struct PhraseService {
    phrases: Arc<dyn PhraseRepository>,
    settings: Arc<dyn SettingsRepository>,
    jobs: Arc<dyn JobRepository>,
    backend: Arc<dyn GenerationBackend>,
}

impl PhraseService {
    pub fn new(
        phrases: Arc<dyn PhraseRepository>,
        settings: Arc<dyn SettingsRepository>,
        jobs: Arc<dyn JobRepository>,
        backend: Arc<dyn GenerationBackend>,
    ) -> Self {
        Self {
            phrases,
            settings,
            jobs,
            backend,
        }
    }

    /// Insert a phrase in the Processing state and queue its categorization.
    ///
    /// Returns as soon as the job is queued. When queueing fails the phrase
    /// is removed again, so an error never leaves a Processing phrase with
    /// no job behind it.
    pub async fn submit(&self, req: CreatePhraseRequest) -> Result<Uuid> {
        let text = req.text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("Phrase text cannot be empty".to_string()));
        }

        let id = self
            .phrases
            .insert(CreatePhraseRequest {
                text: text.to_string(),
                source: normalize_source(req.source),
            })
            .await?;

        let job_type = JobType::CategorizePhrase;
        let queued = self
            .jobs
            .queue(
                Some(id),
                job_type,
                job_type.default_priority(),
                Some(json!({ "phrase_id": id })),
            )
            .await;
        let job_id = match queued {
            Ok(job_id) => job_id,
            Err(e) => {
                if let Err(cleanup) = self.phrases.delete(id).await {
                    error!(
                        subsystem = "api",
                        component = "phrases",
                        op = "submit",
                        phrase_id = %id,
                        error = %cleanup,
                        "Phrase left in Processing after queueing failed"
                    );
                }
                return Err(e);
            }
        };

        info!(
            subsystem = "api",
            component = "phrases",
            op = "submit",
            phrase_id = %id,
            job_id = %job_id,
            "Phrase submitted for categorization"
        );
        Ok(id)
    }

    /// Settle a Processing phrase with a model-chosen category.
    ///
    /// Only store failures are returned as errors.
    pub async fn enrich(&self, phrase_id: Uuid) -> Result<EnrichOutcome> {
        let start = Instant::now();

        let phrase = match self.phrases.get(phrase_id).await? {
            Some(phrase) => phrase,
            None => {
                debug!(
                    subsystem = "enrichment",
                    op = "enrich",
                    phrase_id = %phrase_id,
                    "Phrase no longer exists, skipping"
                );
                return Ok(EnrichOutcome::Missing);
            }
        };

        if !phrase.is_processing() {
            debug!(
                subsystem = "enrichment",
                op = "enrich",
                phrase_id = %phrase_id,
                category = phrase.category_label(),
                "Phrase already settled, skipping"
            );
            return Ok(EnrichOutcome::AlreadySettled);
        }

        let (category, fallback) = match self.settings.get().await {
            Ok(settings) => {
                self.resolve_category(&settings.unwrap_or_default(), &phrase)
                    .await
            }
            Err(e) => {
                warn!(
                    subsystem = "enrichment",
                    op = "enrich",
                    phrase_id = %phrase_id,
                    error = %e,
                    "Failed to read settings"
                );
                (Category::default(), Some(FallbackReason::SettingsUnavailable))
            }
        };

        if let Some(reason) = fallback {
            warn!(
                subsystem = "enrichment",
                op = "enrich",
                phrase_id = %phrase_id,
                fallback_reason = %reason,
                category = category.as_str(),
                "Categorization fell back to default category"
            );
        }

        if !self.phrases.settle(phrase_id, category).await? {
            debug!(
                subsystem = "enrichment",
                op = "enrich",
                phrase_id = %phrase_id,
                "Phrase deleted during enrichment"
            );
            return Ok(EnrichOutcome::Missing);
        }

        info!(
            subsystem = "enrichment",
            op = "enrich",
            phrase_id = %phrase_id,
            category = category.as_str(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Phrase settled"
        );
        Ok(EnrichOutcome::Settled { category, fallback })
    }

    async fn resolve_category(
        &self,
        settings: &Settings,
        phrase: &Phrase,
    ) -> (Category, Option<FallbackReason>) {
        let Some(request) = categorization_request(settings, &phrase.text) else {
            return (Category::default(), Some(FallbackReason::NoApiKey));
        };

        match self.backend.generate(&request).await {
            Ok(reply) => match parse_category(&reply) {
                Some(category) => (category, None),
                None => {
                    debug!(
                        subsystem = "enrichment",
                        phrase_id = %phrase.id,
                        model = %request.model,
                        reply = %reply,
                        "Model reply is not a category label"
                    );
                    (Category::default(), Some(FallbackReason::UnrecognizedLabel))
                }
            },
            Err(e) => {
                debug!(
                    subsystem = "enrichment",
                    phrase_id = %phrase.id,
                    model = %request.model,
                    error = %e,
                    "Categorization call failed"
                );
                (Category::default(), Some(FallbackReason::Provider))
            }
        }
    }

    /// Ask the model for a new phrase. Nothing is stored.
    pub async fn generate_suggestion(&self) -> Result<GeneratedPhrase> {
        let settings = self.settings.get().await?.unwrap_or_default();
        let request = suggestion_request(&settings).ok_or_else(|| {
            Error::Config("OpenRouter API key not configured".to_string())
        })?;

        let start = Instant::now();
        let reply = self.backend.generate(&request).await.map_err(|e| {
            warn!(
                subsystem = "api",
                component = "phrases",
                op = "generate",
                model = %request.model,
                error = %e,
                "Phrase generation failed"
            );
            generation_failed()
        })?;

        let phrase = parse_generated_phrase(&reply).map_err(|e| {
            warn!(
                subsystem = "api",
                component = "phrases",
                op = "generate",
                model = %request.model,
                error = %e,
                "Generated phrase could not be parsed"
            );
            generation_failed()
        })?;

        info!(
            subsystem = "api",
            component = "phrases",
            op = "generate",
            model = %request.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "Phrase generated"
        );
        Ok(phrase)
    }

    pub async fn get(&self, id: Uuid) -> Result<Phrase> {
        self.phrases
            .get(id)
            .await?
            .ok_or(Error::PhraseNotFound(id))
    }

    /// Edit a phrase. Does not queue categorization.
    pub async fn update(&self, id: Uuid, req: UpdatePhraseRequest) -> Result<Phrase> {
        let text = req.text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("Phrase text cannot be empty".to_string()));
        }

        self.phrases
            .update(
                id,
                UpdatePhraseRequest {
                    text: text.to_string(),
                    category: req.category,
                    source: normalize_source(req.source),
                },
            )
            .await?;

        debug!(
            subsystem = "api",
            component = "phrases",
            op = "update",
            phrase_id = %id,
            "Phrase updated"
        );
        self.get(id).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.phrases.delete(id).await?;
        debug!(
            subsystem = "api",
            component = "phrases",
            op = "delete",
            phrase_id = %id,
            "Phrase deleted"
        );
        Ok(())
    }

    pub async fn list(&self, req: &ListPhrasesRequest) -> Result<Vec<Phrase>> {
        let phrases = self.phrases.list(req).await?;
        debug!(
            subsystem = "api",
            component = "phrases",
            op = "list",
            result_count = phrases.len(),
            "Listed phrases"
        );
        Ok(phrases)
    }
}

fn generation_failed() -> Error {
    Error::Inference("Failed to generate phrase".to_string())
}

fn normalize_source(source: Option<String>) -> Option<String> {
    source
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
