//! # phrasebook-jobs
//!
//! Background job queue worker for phrasebook.
//!
//! Contents:
//! - Priority-based job claiming over any [`JobRepository`]
//! - Bounded concurrent execution with a per-job timeout
//! - Immediate wake-up on queue through a shared `Notify`
//! - Lifecycle and progress events on a broadcast channel
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use phrasebook_jobs::{NoOpHandler, WorkerBuilder, WorkerConfig, JobType};
//! use phrasebook_db::InMemoryJobRepository;
//!
//! let jobs = Arc::new(InMemoryJobRepository::new());
//!
//! let worker = WorkerBuilder::new(jobs.clone())
//!     .with_config(WorkerConfig::default().with_poll_interval(1000))
//!     .with_notify(jobs.job_notify())
//!     .with_handler(NoOpHandler::new(JobType::CategorizePhrase))
//!     .build()
//!     .await;
//!
//! let handle = worker.start();
//!
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     tracing::info!(?event, "worker event");
//! }
//!
//! handle.shutdown().await?;
//! ```

pub mod handler;
pub mod worker;

// Re-export core types
pub use phrasebook_core::*;

pub use handler::{JobContext, JobHandler, JobResult, NoOpHandler};
pub use worker::{JobWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};

/// Attempts after the first before a job is marked failed.
pub const DEFAULT_MAX_RETRIES: i32 = phrasebook_core::defaults::JOB_MAX_RETRIES;

/// Milliseconds between queue polls when nothing wakes the worker.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = phrasebook_core::defaults::JOB_POLL_INTERVAL_MS;
