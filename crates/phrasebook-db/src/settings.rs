//! Settings repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use phrasebook_core::{Error, Result, Settings, SettingsPatch, SettingsRepository};

/// PostgreSQL implementation of SettingsRepository over the single-row table.
pub struct PgSettingsRepository {
    pool: Pool<Postgres>,
}

impl PgSettingsRepository {
    /// Create a new PgSettingsRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_settings_row(row: sqlx::postgres::PgRow) -> Settings {
        Settings {
            api_key: row.get("api_key"),
            preferred_model: row.get("preferred_model"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl SettingsRepository for PgSettingsRepository {
    async fn get(&self) -> Result<Option<Settings>> {
        let row =
            sqlx::query("SELECT api_key, preferred_model, updated_at FROM settings WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)?;

        Ok(row.map(Self::parse_settings_row))
    }

    async fn upsert(&self, patch: SettingsPatch) -> Result<Settings> {
        let row = sqlx::query(
            "INSERT INTO settings (id, api_key, preferred_model, updated_at)
             VALUES (1, $1, $2, NOW())
             ON CONFLICT (id) DO UPDATE SET
                 api_key = COALESCE(EXCLUDED.api_key, settings.api_key),
                 preferred_model = COALESCE(EXCLUDED.preferred_model, settings.preferred_model),
                 updated_at = NOW()
             RETURNING api_key, preferred_model, updated_at",
        )
        .bind(&patch.api_key)
        .bind(&patch.preferred_model)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_settings_row(row))
    }
}
