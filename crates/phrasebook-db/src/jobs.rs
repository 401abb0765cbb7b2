//! Postgres-backed job queue.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use tokio::sync::Notify;
use tracing::info;
use uuid::Uuid;

use phrasebook_core::{
    defaults, Error, Job, JobRepository, JobStatus, JobType, QueueStats, Result,
};

const JOB_COLUMNS: &str = "id, phrase_id, job_type::text, status::text, priority, payload, result,
                           error_message, retry_count, max_retries,
                           created_at, started_at, completed_at";

/// [`JobRepository`] over the `job_queue` table.
///
/// Claims use `FOR UPDATE SKIP LOCKED`, so several workers can share a queue.
pub struct PgJobRepository {
    pool: Pool<Postgres>,
    /// Woken on every queued job so the worker does not wait out its poll interval.
    notify: Arc<Notify>,
}

impl PgJobRepository {
    /// Repository with a private wake handle.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Repository that wakes a worker constructed elsewhere.
    pub fn with_notify(pool: Pool<Postgres>, notify: Arc<Notify>) -> Self {
        Self { pool, notify }
    }

    /// Handle signalled whenever a job becomes claimable.
    pub fn job_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Label stored in the `job_type` enum column.
    pub(crate) fn type_label(job_type: JobType) -> &'static str {
        match job_type {
            JobType::CategorizePhrase => "categorize_phrase",
        }
    }

    pub(crate) fn parse_type(s: &str) -> Result<JobType> {
        match s {
            "categorize_phrase" => Ok(JobType::CategorizePhrase),
            other => Err(Error::Serialization(format!("Unknown job type: {}", other))),
        }
    }

    pub(crate) fn parse_status(s: &str) -> Result<JobStatus> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(Error::Serialization(format!("Unknown job status: {}", other))),
        }
    }

    fn row_to_job(row: sqlx::postgres::PgRow) -> Result<Job> {
        Ok(Job {
            id: row.get("id"),
            phrase_id: row.get("phrase_id"),
            job_type: Self::parse_type(row.get("job_type"))?,
            status: Self::parse_status(row.get("status"))?,
            priority: row.get("priority"),
            payload: row.get("payload"),
            result: row.get("result"),
            error_message: row.get("error_message"),
            retry_count: row.get("retry_count"),
            max_retries: row.get("max_retries"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        })
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn queue(
        &self,
        phrase_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Uuid> {
        let job_id = Uuid::now_v7();

        sqlx::query(
            "INSERT INTO job_queue (id, phrase_id, job_type, status, priority, payload, max_retries, created_at)
             VALUES ($1, $2, $3::job_type, 'pending'::job_status, $4, $5, $6, $7)",
        )
        .bind(job_id)
        .bind(phrase_id)
        .bind(Self::type_label(job_type))
        .bind(priority)
        .bind(&payload)
        .bind(defaults::JOB_MAX_RETRIES)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        self.notify.notify_one();
        Ok(job_id)
    }

    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>> {
        let labels: Vec<&str> = job_types.iter().copied().map(Self::type_label).collect();

        // No types means any type.
        let row = sqlx::query(&format!(
            "UPDATE job_queue
             SET status = 'running'::job_status, started_at = $1
             WHERE id = (
                 SELECT id FROM job_queue
                 WHERE status = 'pending'::job_status
                   AND (cardinality($2::text[]) = 0 OR job_type::text = ANY($2))
                 ORDER BY priority DESC, created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(Utc::now())
        .bind(&labels)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::row_to_job).transpose()
    }

    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()> {
        sqlx::query(
            "UPDATE job_queue
             SET status = 'completed'::job_status, completed_at = $1, result = $2
             WHERE id = $3",
        )
        .bind(Utc::now())
        .bind(&result)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let (retry_count, max_retries): (i32, i32) = sqlx::query_as(
            "SELECT retry_count, max_retries FROM job_queue WHERE id = $1 FOR UPDATE",
        )
        .bind(job_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let requeue = retry_count < max_retries;
        if requeue {
            // Back to pending; the next claim picks it up.
            sqlx::query(
                "UPDATE job_queue
                 SET status = 'pending'::job_status, retry_count = $1, error_message = $2,
                     started_at = NULL
                 WHERE id = $3",
            )
            .bind(retry_count + 1)
            .bind(error)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        } else {
            // Out of attempts.
            sqlx::query(
                "UPDATE job_queue
                 SET status = 'failed'::job_status, completed_at = $1, error_message = $2
                 WHERE id = $3",
            )
            .bind(Utc::now())
            .bind(error)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;

        if requeue {
            self.notify.notify_one();
        }
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM job_queue WHERE id = $1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::row_to_job).transpose()
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM job_queue WHERE status = 'pending'::job_status",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(count)
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) FILTER (WHERE status = 'pending') as pending,
                COUNT(*) FILTER (WHERE status = 'running') as processing,
                COUNT(*) FILTER (WHERE status = 'completed' AND completed_at > NOW() - INTERVAL '1 hour') as completed_last_hour,
                COUNT(*) FILTER (WHERE status = 'failed' AND completed_at > NOW() - INTERVAL '1 hour') as failed_last_hour,
                COUNT(*) as total
             FROM job_queue",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            pending: row.get::<i64, _>("pending"),
            processing: row.get::<i64, _>("processing"),
            completed_last_hour: row.get::<i64, _>("completed_last_hour"),
            failed_last_hour: row.get::<i64, _>("failed_last_hour"),
            total: row.get::<i64, _>("total"),
        })
    }

    async fn requeue_interrupted(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE job_queue
             SET status = 'pending'::job_status, started_at = NULL
             WHERE status = 'running'::job_status",
        )
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let requeued = result.rows_affected();
        if requeued > 0 {
            info!(
                subsystem = "database",
                component = "jobs",
                op = "requeue_interrupted",
                result_count = requeued,
                "Requeued jobs left running by a previous process"
            );
            self.notify.notify_one();
        }
        Ok(requeued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_round_trip() {
        let s = PgJobRepository::type_label(JobType::CategorizePhrase);
        assert_eq!(s, "categorize_phrase");
        assert_eq!(
            PgJobRepository::parse_type(s).unwrap(),
            JobType::CategorizePhrase
        );
    }

    #[test]
    fn test_job_type_string_matches_serde() {
        let serde = serde_json::to_value(JobType::CategorizePhrase).unwrap();
        assert_eq!(
            serde.as_str(),
            Some(PgJobRepository::type_label(JobType::CategorizePhrase))
        );
    }

    #[test]
    fn test_parse_type_unknown_is_error() {
        assert!(PgJobRepository::parse_type("ai_revision").is_err());
        assert!(PgJobRepository::parse_type("Categorize_Phrase").is_err());
    }

    #[test]
    fn test_parse_status_all_variants() {
        assert_eq!(
            PgJobRepository::parse_status("pending").unwrap(),
            JobStatus::Pending
        );
        assert_eq!(
            PgJobRepository::parse_status("running").unwrap(),
            JobStatus::Running
        );
        assert_eq!(
            PgJobRepository::parse_status("completed").unwrap(),
            JobStatus::Completed
        );
        assert_eq!(
            PgJobRepository::parse_status("failed").unwrap(),
            JobStatus::Failed
        );
    }

    #[test]
    fn test_parse_status_unknown_is_error() {
        assert!(PgJobRepository::parse_status("cancelled").is_err());
        assert!(PgJobRepository::parse_status("").is_err());
    }
}
