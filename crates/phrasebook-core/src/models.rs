//! Core data models for phrasebook.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::defaults;
use crate::error::{Error, Result};

// =============================================================================
// CATEGORY
// =============================================================================

/// Fixed set of labels a settled phrase can carry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Category {
    Professional,
    Philosophical,
    Humorous,
    Motivational,
    Technical,
    Creative,
    #[default]
    #[serde(rename = "Life Wisdom")]
    LifeWisdom,
}

impl Category {
    /// All categories, in the order they are offered to the model.
    pub const ALL: [Category; 7] = [
        Category::Professional,
        Category::Philosophical,
        Category::Humorous,
        Category::Motivational,
        Category::Technical,
        Category::Creative,
        Category::LifeWisdom,
    ];

    /// Wire label for this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Professional => "Professional",
            Category::Philosophical => "Philosophical",
            Category::Humorous => "Humorous",
            Category::Motivational => "Motivational",
            Category::Technical => "Technical",
            Category::Creative => "Creative",
            Category::LifeWisdom => "Life Wisdom",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    /// Case-exact match against the wire labels.
    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| Error::InvalidInput(format!("Unknown category: {}", s)))
    }
}

// =============================================================================
// PHRASE
// =============================================================================

/// Categorization lifecycle of a phrase.
///
/// Stored and serialized as the pair (`category`, `is_processing`); the only
/// valid pairs are (`"Processing…"`, true) and (`<label>`, false).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhraseState {
    /// Waiting for the enrichment job.
    Processing,
    /// Categorization finished (or was set by hand).
    Settled(Category),
}

impl PhraseState {
    /// Value of the `category` column/field for this state.
    pub fn category_label(&self) -> &'static str {
        match self {
            PhraseState::Processing => defaults::PROCESSING_SENTINEL,
            PhraseState::Settled(category) => category.as_str(),
        }
    }

    pub fn is_processing(&self) -> bool {
        matches!(self, PhraseState::Processing)
    }

    /// The final category, if settled.
    pub fn category(&self) -> Option<Category> {
        match self {
            PhraseState::Processing => None,
            PhraseState::Settled(category) => Some(*category),
        }
    }

    /// Rebuild a state from its stored pair, rejecting inconsistent pairs.
    pub fn from_parts(category: &str, is_processing: bool) -> Result<Self> {
        match (is_processing, category) {
            (true, defaults::PROCESSING_SENTINEL) => Ok(PhraseState::Processing),
            (true, other) => Err(Error::Serialization(format!(
                "Processing phrase carries category '{}'",
                other
            ))),
            (false, defaults::PROCESSING_SENTINEL) => Err(Error::Serialization(
                "Settled phrase carries the processing sentinel".to_string(),
            )),
            (false, label) => Ok(PhraseState::Settled(label.parse()?)),
        }
    }
}

/// A saved phrase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "PhraseRecord", try_from = "PhraseRecord")]
pub struct Phrase {
    pub id: Uuid,
    pub text: String,
    pub source: Option<String>,
    pub state: PhraseState,
    pub created_at: DateTime<Utc>,
}

impl Phrase {
    /// Assemble a phrase from stored columns.
    pub fn from_parts(
        id: Uuid,
        text: String,
        source: Option<String>,
        category: &str,
        is_processing: bool,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            id,
            text,
            source,
            state: PhraseState::from_parts(category, is_processing)?,
            created_at,
        })
    }

    pub fn category_label(&self) -> &'static str {
        self.state.category_label()
    }

    pub fn is_processing(&self) -> bool {
        self.state.is_processing()
    }
}

/// Flattened wire form of [`Phrase`].
#[derive(Serialize, Deserialize)]
struct PhraseRecord {
    id: Uuid,
    text: String,
    #[serde(default)]
    source: Option<String>,
    category: String,
    #[serde(default)]
    is_processing: bool,
    created_at: DateTime<Utc>,
}

impl From<Phrase> for PhraseRecord {
    fn from(phrase: Phrase) -> Self {
        Self {
            id: phrase.id,
            category: phrase.state.category_label().to_string(),
            is_processing: phrase.state.is_processing(),
            text: phrase.text,
            source: phrase.source,
            created_at: phrase.created_at,
        }
    }
}

impl TryFrom<PhraseRecord> for Phrase {
    type Error = Error;

    fn try_from(record: PhraseRecord) -> Result<Self> {
        Phrase::from_parts(
            record.id,
            record.text,
            record.source,
            &record.category,
            record.is_processing,
            record.created_at,
        )
    }
}

/// Request to submit a new phrase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePhraseRequest {
    pub text: String,
    #[serde(default)]
    pub source: Option<String>,
}

/// Request to edit an existing phrase.
///
/// `category` keeps the current state when absent. `source` always
/// replaces the stored value, so omitting it clears the attribution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePhraseRequest {
    pub text: String,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub source: Option<String>,
}

/// A phrase produced by the model, not yet saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedPhrase {
    pub text: String,
    pub source: String,
}

// =============================================================================
// SETTINGS
// =============================================================================

/// The single global settings record.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub api_key: Option<String>,
    pub preferred_model: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Settings {
    /// API key, if one is configured and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    /// Model to call, falling back to [`defaults::DEFAULT_MODEL`].
    pub fn effective_model(&self) -> &str {
        self.preferred_model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(defaults::DEFAULT_MODEL)
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("preferred_model", &self.preferred_model)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Partial settings update: absent fields keep their stored value.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub preferred_model: Option<String>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.api_key.is_none() && self.preferred_model.is_none()
    }

    /// Apply this patch over an existing record (or an empty one).
    pub fn apply_to(&self, existing: Option<&Settings>) -> Settings {
        let base = existing.cloned().unwrap_or_default();
        Settings {
            api_key: self.api_key.clone().or(base.api_key),
            preferred_model: self.preferred_model.clone().or(base.preferred_model),
            updated_at: Some(Utc::now()),
        }
    }
}

impl fmt::Debug for SettingsPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsPatch")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("preferred_model", &self.preferred_model)
            .finish()
    }
}

/// A model the settings screen offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelOption {
    pub id: &'static str,
    pub name: &'static str,
}

/// Models selectable as `preferred_model`.
pub const AVAILABLE_MODELS: [ModelOption; 3] = [
    ModelOption {
        id: defaults::DEFAULT_MODEL,
        name: "Grok 4.1 Fast (Free)",
    },
    ModelOption {
        id: "z-ai/glm-4.5-air:free",
        name: "GLM 4.5 Air (Free)",
    },
    ModelOption {
        id: "moonshotai/kimi-k2:free",
        name: "Kimi K2 (Free)",
    },
];

// =============================================================================
// JOBS
// =============================================================================

/// Job status in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Kind of background work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Settle a processing phrase with an AI-chosen category.
    CategorizePhrase,
}

impl JobType {
    /// Queue priority (higher is claimed first).
    pub fn default_priority(&self) -> i32 {
        match self {
            JobType::CategorizePhrase => defaults::CATEGORIZE_PRIORITY,
        }
    }
}

/// A job in the processing queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub phrase_id: Option<Uuid>,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i32,
    pub payload: Option<JsonValue>,
    pub result: Option<JsonValue>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Queue statistics summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed_last_hour: i64,
    pub failed_last_hour: i64,
    pub total: i64,
}
