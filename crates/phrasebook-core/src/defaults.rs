//! Centralized default constants for phrasebook.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// PHRASES
// =============================================================================

/// Category label shown while a phrase waits for categorization.
pub const PROCESSING_SENTINEL: &str = "Processing…";

/// Source attached to generated phrases when the model omits one.
pub const GENERATED_SOURCE: &str = "AI Generated";

/// Trailing window used by the weekly counter, in hours.
pub const WEEKLY_WINDOW_HOURS: i64 = 7 * 24;

/// Number of days shown by the weekly activity series.
pub const WEEKLY_SERIES_DAYS: i64 = 7;

/// Lookback for the activity heatmap, in days (52 weeks).
pub const HEATMAP_LOOKBACK_DAYS: i64 = 364;

// =============================================================================
// INFERENCE
// =============================================================================

/// Base URL of the OpenRouter chat-completion API.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Model used when settings carry no preferred model.
pub const DEFAULT_MODEL: &str = "x-ai/grok-4.1-fast:free";

/// Token cap for a categorization answer (one label).
pub const CATEGORIZE_MAX_TOKENS: u32 = 20;

/// HTTP timeout for provider calls in seconds.
pub const GEN_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// JOB PROCESSING
// =============================================================================

/// Default maximum retry count for failed jobs.
pub const JOB_MAX_RETRIES: i32 = 3;

/// Priority of categorization jobs (higher runs first).
pub const CATEGORIZE_PRIORITY: i32 = 5;

/// Default job worker safety-net poll interval in milliseconds.
///
/// Queueing a job wakes the worker directly, so this interval only covers
/// rows inserted outside the process and jobs recovered after a restart.
pub const JOB_POLL_INTERVAL_MS: u64 = 5_000;

/// Default maximum concurrent jobs per worker.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Default job execution timeout in seconds.
pub const JOB_TIMEOUT_SECS: u64 = 120;

/// Capacity of the worker event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP port.
pub const SERVER_PORT: u16 = 3000;

/// Default bind address.
pub const SERVER_HOST: &str = "0.0.0.0";

/// Maximum accepted request body in bytes.
pub const REQUEST_BODY_LIMIT: usize = 64 * 1024;
