//! Core traits for phrasebook abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// PHRASE REPOSITORY TRAITS
// =============================================================================

/// Query parameters for listing phrases.
///
/// Empty strings count as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListPhrasesRequest {
    /// Exact category label (including the processing sentinel).
    #[serde(default)]
    pub category: Option<String>,
    /// Full-text query over phrase text.
    #[serde(default)]
    pub search: Option<String>,
}

/// How a [`ListPhrasesRequest`] is answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListMode<'a> {
    /// Full-text search, optionally narrowed by category. Relevance order.
    Search {
        query: &'a str,
        category: Option<&'a str>,
    },
    /// Category equality lookup, newest first.
    Category(&'a str),
    /// Everything, newest first.
    All,
}

impl ListPhrasesRequest {
    /// Text search takes precedence; category then narrows it.
    pub fn mode(&self) -> ListMode<'_> {
        let category = self
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let search = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match (search, category) {
            (Some(query), category) => ListMode::Search { query, category },
            (None, Some(category)) => ListMode::Category(category),
            (None, None) => ListMode::All,
        }
    }
}

/// Repository for phrase storage and the read aggregations over it.
#[async_trait]
pub trait PhraseRepository: Send + Sync {
    /// Insert a new phrase in the Processing state.
    async fn insert(&self, req: CreatePhraseRequest) -> Result<Uuid>;

    /// Fetch a phrase by ID.
    async fn get(&self, id: Uuid) -> Result<Option<Phrase>>;

    /// Set the final category and clear the processing flag.
    ///
    /// Returns `false` when the phrase no longer exists.
    async fn settle(&self, id: Uuid, category: Category) -> Result<bool>;

    /// Apply a user edit. Fails with `PhraseNotFound` when missing.
    async fn update(&self, id: Uuid, req: UpdatePhraseRequest) -> Result<()>;

    /// Delete a phrase. Fails with `PhraseNotFound` when missing.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// List phrases according to [`ListPhrasesRequest::mode`].
    async fn list(&self, req: &ListPhrasesRequest) -> Result<Vec<Phrase>>;

    /// Count of phrases per category label, sentinel included.
    async fn category_counts(&self) -> Result<BTreeMap<String, i64>>;

    /// Count of phrases with `created_at >= cutoff`.
    async fn count_created_since(&self, cutoff: DateTime<Utc>) -> Result<i64>;

    /// IDs of every phrase that is not processing.
    async fn settled_ids(&self) -> Result<Vec<Uuid>>;

    /// Per-day (UTC) creation counts for phrases created at or after `since`.
    async fn daily_counts(&self, since: DateTime<Utc>) -> Result<BTreeMap<NaiveDate, i64>>;
}

// =============================================================================
// SETTINGS REPOSITORY TRAITS
// =============================================================================

/// Repository for the single settings record.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Read the settings record, if one was ever saved.
    async fn get(&self) -> Result<Option<Settings>>;

    /// Patch the record if it exists, otherwise insert it.
    async fn upsert(&self, patch: SettingsPatch) -> Result<Settings>;
}

// =============================================================================
// JOB REPOSITORY TRAITS
// =============================================================================

/// Repository for job queue operations.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Queue a new job.
    async fn queue(
        &self,
        phrase_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Uuid>;

    /// Claim the next pending job whose type is in `job_types`.
    /// An empty slice means "claim any type".
    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>>;

    /// Mark job as completed.
    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()>;

    /// Mark job as failed, requeueing it while retries remain.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Get job by ID.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Get pending jobs count.
    async fn pending_count(&self) -> Result<i64>;

    /// Get queue statistics.
    async fn queue_stats(&self) -> Result<QueueStats>;

    /// Return jobs left running by a previous process to the pending state.
    async fn requeue_interrupted(&self) -> Result<u64>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// One chat-completion call.
#[derive(Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Bearer token for the provider.
    pub api_key: String,
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub max_tokens: Option<u32>,
    /// Ask the provider for a JSON object response.
    pub json_object: bool,
}

impl fmt::Debug for GenerationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationRequest")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("system", &self.system)
            .field("prompt", &self.prompt)
            .field("max_tokens", &self.max_tokens)
            .field("json_object", &self.json_object)
            .finish()
    }
}

/// Backend for text generation.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Run a chat completion and return the assistant message content.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(category: Option<&str>, search: Option<&str>) -> ListPhrasesRequest {
        ListPhrasesRequest {
            category: category.map(String::from),
            search: search.map(String::from),
        }
    }

    #[test]
    fn test_list_mode_all_when_empty() {
        assert_eq!(req(None, None).mode(), ListMode::All);
        assert_eq!(req(Some(""), Some("  ")).mode(), ListMode::All);
    }

    #[test]
    fn test_list_mode_category_only() {
        assert_eq!(
            req(Some("Technical"), None).mode(),
            ListMode::Category("Technical")
        );
    }

    #[test]
    fn test_list_mode_search_takes_precedence() {
        assert_eq!(
            req(Some("Technical"), Some("wisdom")).mode(),
            ListMode::Search {
                query: "wisdom",
                category: Some("Technical")
            }
        );
        assert_eq!(
            req(None, Some("wisdom")).mode(),
            ListMode::Search {
                query: "wisdom",
                category: None
            }
        );
    }

    #[test]
    fn test_generation_request_debug_hides_key() {
        let request = GenerationRequest {
            api_key: "sk-or-v1-abc".to_string(),
            model: "m".to_string(),
            system: String::new(),
            prompt: "hello".to_string(),
            max_tokens: Some(20),
            json_object: false,
        };
        assert!(!format!("{:?}", request).contains("sk-or-v1-abc"));
    }
}
