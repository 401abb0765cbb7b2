//! In-memory repositories.
//!
//! Behave like the PostgreSQL repositories for everything the services rely
//! on, so workflow tests run without a database. Full-text search is
//! approximated by case-insensitive word matching.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use tokio::sync::{Notify, RwLock};
use uuid::Uuid;

use phrasebook_core::{
    defaults, CreatePhraseRequest, Category, Error, Job, JobRepository, JobStatus, JobType,
    ListMode, ListPhrasesRequest, Phrase, PhraseRepository, PhraseState, QueueStats, Result,
    Settings, SettingsPatch, SettingsRepository, UpdatePhraseRequest,
};

// =============================================================================
// PHRASES
// =============================================================================

/// In-memory [`PhraseRepository`].
#[derive(Default)]
pub struct InMemoryPhraseRepository {
    phrases: RwLock<HashMap<Uuid, Phrase>>,
}

impl InMemoryPhraseRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a phrase as-is, including its `created_at`.
    pub async fn insert_phrase(&self, phrase: Phrase) {
        self.phrases.write().await.insert(phrase.id, phrase);
    }

    /// Store a settled phrase created at `created_at` and return its id.
    pub async fn insert_settled_at(
        &self,
        text: &str,
        category: Category,
        created_at: DateTime<Utc>,
    ) -> Uuid {
        let phrase = Phrase {
            id: Uuid::now_v7(),
            text: text.to_string(),
            source: None,
            state: PhraseState::Settled(category),
            created_at,
        };
        let id = phrase.id;
        self.insert_phrase(phrase).await;
        id
    }

    pub async fn len(&self) -> usize {
        self.phrases.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.phrases.read().await.is_empty()
    }

    fn newest_first(mut phrases: Vec<Phrase>) -> Vec<Phrase> {
        phrases.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        phrases
    }

    /// Number of query words found in the phrase text.
    fn match_score(text: &str, query: &str) -> usize {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        query
            .split_whitespace()
            .map(str::to_lowercase)
            .filter(|q| words.iter().any(|w| w == q))
            .count()
    }
}

#[async_trait]
impl PhraseRepository for InMemoryPhraseRepository {
    async fn insert(&self, req: CreatePhraseRequest) -> Result<Uuid> {
        let phrase = Phrase {
            id: Uuid::now_v7(),
            text: req.text,
            source: req.source,
            state: PhraseState::Processing,
            created_at: Utc::now(),
        };
        let id = phrase.id;
        self.insert_phrase(phrase).await;
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Phrase>> {
        Ok(self.phrases.read().await.get(&id).cloned())
    }

    async fn settle(&self, id: Uuid, category: Category) -> Result<bool> {
        let mut phrases = self.phrases.write().await;
        match phrases.get_mut(&id) {
            Some(phrase) => {
                phrase.state = PhraseState::Settled(category);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update(&self, id: Uuid, req: UpdatePhraseRequest) -> Result<()> {
        let mut phrases = self.phrases.write().await;
        let phrase = phrases.get_mut(&id).ok_or(Error::PhraseNotFound(id))?;
        phrase.text = req.text;
        phrase.source = req.source;
        if let Some(category) = req.category {
            phrase.state = PhraseState::Settled(category);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.phrases
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::PhraseNotFound(id))
    }

    async fn list(&self, req: &ListPhrasesRequest) -> Result<Vec<Phrase>> {
        let phrases = self.phrases.read().await;
        let result = match req.mode() {
            ListMode::Search { query, category } => {
                let mut scored: Vec<(usize, Phrase)> = phrases
                    .values()
                    .filter(|p| category.map_or(true, |c| p.category_label() == c))
                    .map(|p| (Self::match_score(&p.text, query), p.clone()))
                    .filter(|(score, _)| *score > 0)
                    .collect();
                scored.sort_by(|(sa, a), (sb, b)| {
                    sb.cmp(sa).then(b.created_at.cmp(&a.created_at))
                });
                scored.into_iter().map(|(_, p)| p).collect()
            }
            ListMode::Category(category) => Self::newest_first(
                phrases
                    .values()
                    .filter(|p| p.category_label() == category)
                    .cloned()
                    .collect(),
            ),
            ListMode::All => Self::newest_first(phrases.values().cloned().collect()),
        };
        Ok(result)
    }

    async fn category_counts(&self) -> Result<BTreeMap<String, i64>> {
        let mut counts = BTreeMap::new();
        for phrase in self.phrases.read().await.values() {
            *counts.entry(phrase.category_label().to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn count_created_since(&self, cutoff: DateTime<Utc>) -> Result<i64> {
        Ok(self
            .phrases
            .read()
            .await
            .values()
            .filter(|p| p.created_at >= cutoff)
            .count() as i64)
    }

    async fn settled_ids(&self) -> Result<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self
            .phrases
            .read()
            .await
            .values()
            .filter(|p| !p.is_processing())
            .map(|p| p.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn daily_counts(&self, since: DateTime<Utc>) -> Result<BTreeMap<NaiveDate, i64>> {
        let mut counts = BTreeMap::new();
        for phrase in self.phrases.read().await.values() {
            if phrase.created_at >= since {
                *counts.entry(phrase.created_at.date_naive()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}

// =============================================================================
// SETTINGS
// =============================================================================

/// In-memory [`SettingsRepository`].
#[derive(Default)]
pub struct InMemorySettingsRepository {
    settings: RwLock<Option<Settings>>,
}

impl InMemorySettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a stored API key.
    pub fn with_api_key(api_key: &str) -> Self {
        Self {
            settings: RwLock::new(Some(Settings {
                api_key: Some(api_key.to_string()),
                preferred_model: None,
                updated_at: Some(Utc::now()),
            })),
        }
    }
}

#[async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn get(&self) -> Result<Option<Settings>> {
        Ok(self.settings.read().await.clone())
    }

    async fn upsert(&self, patch: SettingsPatch) -> Result<Settings> {
        let mut settings = self.settings.write().await;
        let updated = patch.apply_to(settings.as_ref());
        *settings = Some(updated.clone());
        Ok(updated)
    }
}

// =============================================================================
// JOBS
// =============================================================================

/// In-memory [`JobRepository`] with the same retry semantics as the queue table.
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<Uuid, Job>>,
    notify: Arc<Notify>,
}

impl Default for InMemoryJobRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::with_notify(Arc::new(Notify::new()))
    }

    pub fn with_notify(notify: Arc<Notify>) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            notify,
        }
    }

    pub fn job_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Snapshot of every job, oldest first.
    pub async fn all(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        jobs
    }

    fn job_not_found(job_id: Uuid) -> Error {
        Error::NotFound(format!("Job {}", job_id))
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn queue(
        &self,
        phrase_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Uuid> {
        let job = Job {
            id: Uuid::now_v7(),
            phrase_id,
            job_type,
            status: JobStatus::Pending,
            priority,
            payload,
            result: None,
            error_message: None,
            retry_count: 0,
            max_retries: defaults::JOB_MAX_RETRIES,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        let id = job.id;
        self.jobs.write().await.insert(id, job);
        self.notify.notify_one();
        Ok(id)
    }

    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>> {
        let mut jobs = self.jobs.write().await;
        let next = jobs
            .values_mut()
            .filter(|j| j.status == JobStatus::Pending)
            .filter(|j| job_types.is_empty() || job_types.contains(&j.job_type))
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then(b.created_at.cmp(&a.created_at))
                    .then(b.id.cmp(&a.id))
            });

        Ok(next.map(|job| {
            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());
            job.clone()
        }))
    }

    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| Self::job_not_found(job_id))?;
        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.result = result;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        let requeued = {
            let mut jobs = self.jobs.write().await;
            let job = jobs
                .get_mut(&job_id)
                .ok_or_else(|| Self::job_not_found(job_id))?;
            job.error_message = Some(error.to_string());
            if job.retry_count < job.max_retries {
                job.retry_count += 1;
                job.status = JobStatus::Pending;
                job.started_at = None;
                true
            } else {
                job.status = JobStatus::Failed;
                job.completed_at = Some(Utc::now());
                false
            }
        };
        if requeued {
            self.notify.notify_one();
        }
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.jobs.read().await.get(&job_id).cloned())
    }

    async fn pending_count(&self) -> Result<i64> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .count() as i64)
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let hour_ago = Utc::now() - Duration::hours(1);
        let jobs = self.jobs.read().await;
        let recent = |j: &&Job| j.completed_at.map_or(false, |t| t > hour_ago);

        Ok(QueueStats {
            pending: jobs.values().filter(|j| j.status == JobStatus::Pending).count() as i64,
            processing: jobs.values().filter(|j| j.status == JobStatus::Running).count() as i64,
            completed_last_hour: jobs
                .values()
                .filter(|j| j.status == JobStatus::Completed)
                .filter(recent)
                .count() as i64,
            failed_last_hour: jobs
                .values()
                .filter(|j| j.status == JobStatus::Failed)
                .filter(recent)
                .count() as i64,
            total: jobs.len() as i64,
        })
    }

    async fn requeue_interrupted(&self) -> Result<u64> {
        let mut requeued = 0;
        for job in self.jobs.write().await.values_mut() {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Pending;
                job.started_at = None;
                requeued += 1;
            }
        }
        if requeued > 0 {
            self.notify.notify_one();
        }
        Ok(requeued)
    }
}
