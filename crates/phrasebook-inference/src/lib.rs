//! # phrasebook-inference
//!
//! Chat-completion access for phrasebook.
//!
//! This crate provides:
//! - OpenAI-compatible backend (OpenRouter by default)
//! - Categorization and suggestion prompts with strict reply parsing
//! - Mock backend for tests (feature `mock`)
//!
//! # Example
//!
//! ```rust,no_run
//! use phrasebook_inference::{categorization_request, parse_category, OpenAIBackend, Settings};
//! use phrasebook_core::GenerationBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OpenAIBackend::from_env().unwrap();
//!     let settings = Settings::default();
//!     if let Some(request) = categorization_request(&settings, "Stay curious") {
//!         let reply = backend.generate(&request).await.unwrap();
//!         println!("{:?}", parse_category(&reply));
//!     }
//! }
//! ```

pub mod openai;
pub mod prompts;

// Mock generation backend for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use phrasebook_core::*;

pub use openai::{OpenAIBackend, OpenAIConfig};
pub use prompts::{
    categorization_request, parse_category, parse_generated_phrase, suggestion_request,
    CATEGORIZE_SYSTEM_PROMPT, SUGGESTION_SYSTEM_PROMPT, SUGGESTION_USER_PROMPT,
};
