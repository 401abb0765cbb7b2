//! Field names for structured `tracing` events.
//!
//! Every crate logs with these keys so one query finds a phrase across the
//! HTTP request, the categorization job and the provider call:
//!
//! ```text
//! phrase_id=0192... subsystem=enrichment op=enrich model=x-ai/grok-4.1-fast:free fallback_reason=provider
//! ```
//!
//! Levels: `error` needs an operator, `warn` means a fallback was applied,
//! `info` marks lifecycle and completed operations, `debug` records
//! decisions and intermediate values.

// Where the event came from.

/// `x-request-id` of the HTTP request, a UUIDv7.
pub const REQUEST_ID: &str = "request_id";

/// `api`, `database`, `inference`, `jobs` or `enrichment`.
pub const SUBSYSTEM: &str = "subsystem";

/// Part of the subsystem, e.g. `pool`, `worker`, `openai`, `phrases`.
pub const COMPONENT: &str = "component";

/// Operation name, e.g. `submit`, `enrich`, `generate`, `claim_next`.
pub const OPERATION: &str = "op";

// What it was about.

pub const PHRASE_ID: &str = "phrase_id";
pub const JOB_ID: &str = "job_id";
pub const JOB_TYPE: &str = "job_type";

/// Category label a phrase settled with.
pub const CATEGORY: &str = "category";

/// Model id sent to the provider.
pub const MODEL: &str = "model";

/// Why enrichment settled on Life Wisdom: `no_api_key`, `provider`,
/// `unrecognized_label` or `settings_unavailable`.
pub const FALLBACK_REASON: &str = "fallback_reason";

// How it went.

pub const DURATION_MS: &str = "duration_ms";

/// Rows returned by a list or search.
pub const RESULT_COUNT: &str = "result_count";

/// Characters in a provider reply.
pub const RESPONSE_LEN: &str = "response_len";

pub const POOL_SIZE: &str = "pool_size";
pub const POOL_IDLE: &str = "pool_idle";

pub const SUCCESS: &str = "success";
pub const ERROR_MSG: &str = "error";

/// Every field name above.
pub const ALL_FIELDS: [&str; 17] = [
    REQUEST_ID,
    SUBSYSTEM,
    COMPONENT,
    OPERATION,
    PHRASE_ID,
    JOB_ID,
    JOB_TYPE,
    CATEGORY,
    MODEL,
    FALLBACK_REASON,
    DURATION_MS,
    RESULT_COUNT,
    RESPONSE_LEN,
    POOL_SIZE,
    POOL_IDLE,
    SUCCESS,
    ERROR_MSG,
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_field_names_are_snake_case() {
        for field in ALL_FIELDS {
            assert!(
                field.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "{field} is not snake_case"
            );
        }
    }

    #[test]
    fn test_field_names_are_unique() {
        let unique: HashSet<_> = ALL_FIELDS.iter().collect();
        assert_eq!(unique.len(), ALL_FIELDS.len());
    }
}
