//! Phrase repository implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use phrasebook_core::{
    defaults, Category, CreatePhraseRequest, Error, ListMode, ListPhrasesRequest, Phrase,
    PhraseRepository, Result, UpdatePhraseRequest,
};

const PHRASE_COLUMNS: &str = "id, text, source, category, is_processing, created_at";

/// PostgreSQL implementation of PhraseRepository.
pub struct PgPhraseRepository {
    pool: Pool<Postgres>,
}

impl PgPhraseRepository {
    /// Create a new PgPhraseRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Parse a phrase row, rejecting rows that break the state invariant.
    fn parse_phrase_row(row: PgRow) -> Result<Phrase> {
        let category: String = row.get("category");
        Phrase::from_parts(
            row.get("id"),
            row.get("text"),
            row.get("source"),
            &category,
            row.get("is_processing"),
            row.get("created_at"),
        )
    }

    fn parse_rows(rows: Vec<PgRow>) -> Result<Vec<Phrase>> {
        rows.into_iter().map(Self::parse_phrase_row).collect()
    }
}

#[async_trait]
impl PhraseRepository for PgPhraseRepository {
    async fn insert(&self, req: CreatePhraseRequest) -> Result<Uuid> {
        let id = Uuid::now_v7();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO phrase (id, text, source, category, is_processing, created_at)
             VALUES ($1, $2, $3, $4, TRUE, $5)",
        )
        .bind(id)
        .bind(&req.text)
        .bind(&req.source)
        .bind(defaults::PROCESSING_SENTINEL)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Phrase>> {
        let row = sqlx::query(&format!("SELECT {PHRASE_COLUMNS} FROM phrase WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_phrase_row).transpose()
    }

    async fn settle(&self, id: Uuid, category: Category) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE phrase SET category = $1, is_processing = FALSE WHERE id = $2",
        )
        .bind(category.as_str())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn update(&self, id: Uuid, req: UpdatePhraseRequest) -> Result<()> {
        let result = match req.category {
            Some(category) => {
                sqlx::query(
                    "UPDATE phrase
                     SET text = $1, source = $2, category = $3, is_processing = FALSE
                     WHERE id = $4",
                )
                .bind(&req.text)
                .bind(&req.source)
                .bind(category.as_str())
                .bind(id)
                .execute(&self.pool)
                .await
            }
            None => {
                sqlx::query("UPDATE phrase SET text = $1, source = $2 WHERE id = $3")
                    .bind(&req.text)
                    .bind(&req.source)
                    .bind(id)
                    .execute(&self.pool)
                    .await
            }
        }
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::PhraseNotFound(id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM phrase WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::PhraseNotFound(id));
        }
        Ok(())
    }

    async fn list(&self, req: &ListPhrasesRequest) -> Result<Vec<Phrase>> {
        let rows = match req.mode() {
            ListMode::Search { query, category } => {
                debug!(
                    subsystem = "database",
                    component = "phrases",
                    op = "search",
                    category = category.unwrap_or(""),
                    "Full-text phrase search"
                );
                sqlx::query(&format!(
                    "SELECT {PHRASE_COLUMNS} FROM phrase
                     WHERE tsv @@ websearch_to_tsquery('english', $1)
                       AND ($2::text IS NULL OR category = $2)
                     ORDER BY ts_rank(tsv, websearch_to_tsquery('english', $1)) DESC,
                              created_at DESC"
                ))
                .bind(query)
                .bind(category)
                .fetch_all(&self.pool)
                .await
            }
            ListMode::Category(category) => {
                sqlx::query(&format!(
                    "SELECT {PHRASE_COLUMNS} FROM phrase
                     WHERE category = $1
                     ORDER BY created_at DESC"
                ))
                .bind(category)
                .fetch_all(&self.pool)
                .await
            }
            ListMode::All => {
                sqlx::query(&format!(
                    "SELECT {PHRASE_COLUMNS} FROM phrase ORDER BY created_at DESC"
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(Error::Database)?;

        Self::parse_rows(rows)
    }

    async fn category_counts(&self) -> Result<BTreeMap<String, i64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT category, COUNT(*) FROM phrase GROUP BY category")
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;

        Ok(rows.into_iter().collect())
    }

    async fn count_created_since(&self, cutoff: DateTime<Utc>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM phrase WHERE created_at >= $1")
            .bind(cutoff)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(count)
    }

    async fn settled_ids(&self) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM phrase WHERE NOT is_processing ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(ids)
    }

    async fn daily_counts(&self, since: DateTime<Utc>) -> Result<BTreeMap<NaiveDate, i64>> {
        let rows: Vec<(NaiveDate, i64)> = sqlx::query_as(
            "SELECT (created_at AT TIME ZONE 'UTC')::date AS day, COUNT(*)
             FROM phrase
             WHERE created_at >= $1
             GROUP BY day",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().collect())
    }
}
