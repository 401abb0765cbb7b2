//! # phrasebook-db
//!
//! PostgreSQL database layer for phrasebook.
//!
//! Contents:
//! - Pool sizing from the environment
//! - Repository implementations for phrases, settings and the job queue
//! - Full-text phrase search with PostgreSQL tsvector
//! - In-memory repositories with the same semantics, for tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use phrasebook_db::{CreatePhraseRequest, Database, PhraseRepository, PoolConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect_with_config(
//!         "postgres://localhost/phrasebook",
//!         PoolConfig::from_env(),
//!     )
//!     .await?;
//!
//!     let id = db.phrases.insert(CreatePhraseRequest {
//!         text: "Done is better than perfect".to_string(),
//!         source: None,
//!     }).await?;
//!
//!     println!("Created phrase: {}", id);
//!     Ok(())
//! }
//! ```
use std::sync::Arc;

use tokio::sync::Notify;

pub mod jobs;
pub mod memory;
pub mod phrases;
pub mod pool;
pub mod settings;

// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use phrasebook_core::*;

pub use jobs::PgJobRepository;
pub use memory::{InMemoryJobRepository, InMemoryPhraseRepository, InMemorySettingsRepository};
pub use phrases::PgPhraseRepository;
pub use pool::{create_pool_with_config, log_pool_metrics, PoolConfig, PoolHealth};
pub use settings::PgSettingsRepository;

/// One pool and the three repositories built on it.
pub struct Database {
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub phrases: PgPhraseRepository,
    /// Single-row settings repository.
    pub settings: PgSettingsRepository,
    /// Categorization queue.
    pub jobs: PgJobRepository,
}

impl Database {
    /// Repositories over an existing pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self::with_job_notify(pool, Arc::new(Notify::new()))
    }

    /// Create a Database whose job repository wakes `notify` on every queued job.
    pub fn with_job_notify(pool: sqlx::Pool<sqlx::Postgres>, notify: Arc<Notify>) -> Self {
        Self {
            phrases: PgPhraseRepository::new(pool.clone()),
            settings: PgSettingsRepository::new(pool.clone()),
            jobs: PgJobRepository::with_notify(pool.clone(), notify),
            pool,
        }
    }

    /// Open a pool sized by `config` and wrap it.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Apply `migrations/` to the connected database.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }

    /// Notify handle shared with the job worker.
    pub fn job_notify(&self) -> Arc<Notify> {
        self.jobs.job_notify()
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::with_job_notify(self.pool.clone(), self.jobs.job_notify())
    }
}
