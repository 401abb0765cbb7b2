//! Settings service: the single global settings record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use phrasebook_core::{ModelOption, Result, Settings, SettingsPatch, SettingsRepository, AVAILABLE_MODELS};

/// Settings as exposed to clients. The key itself is never returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsView {
    pub has_api_key: bool,
    pub preferred_model: Option<String>,
    pub effective_model: String,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Settings> for SettingsView {
    fn from(settings: &Settings) -> Self {
        Self {
            has_api_key: settings.has_api_key(),
            preferred_model: settings.preferred_model.clone(),
            effective_model: settings.effective_model().to_string(),
            updated_at: settings.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct SettingsService {
    settings: Arc<dyn SettingsRepository>,
}

impl SettingsService {
    pub fn new(settings: Arc<dyn SettingsRepository>) -> Self {
        Self { settings }
    }

    /// Current settings, or empty settings if none were ever saved.
    pub async fn get(&self) -> Result<Settings> {
        Ok(self.settings.get().await?.unwrap_or_default())
    }

    /// Upsert: supplied fields replace stored ones, absent fields are kept.
    pub async fn update(&self, patch: SettingsPatch) -> Result<Settings> {
        if patch.is_empty() {
            return self.get().await;
        }

        let updates_key = patch.api_key.is_some();
        let updates_model = patch.preferred_model.is_some();
        let settings = self.settings.upsert(patch).await?;

        info!(
            subsystem = "api",
            component = "settings",
            op = "update",
            updates_key,
            updates_model,
            model = settings.effective_model(),
            "Settings saved"
        );
        Ok(settings)
    }

    pub fn available_models(&self) -> &'static [ModelOption] {
        &AVAILABLE_MODELS
    }
}
