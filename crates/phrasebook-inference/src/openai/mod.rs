//! OpenAI-compatible inference backend.
//!
//! Talks to any endpoint that speaks the chat completions protocol. The
//! default target is OpenRouter.
//!
//! # Example
//!
//! ```rust,no_run
//! use phrasebook_core::{GenerationBackend, GenerationRequest};
//! use phrasebook_inference::openai::{OpenAIBackend, OpenAIConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OpenAIBackend::new(OpenAIConfig::from_env()).unwrap();
//!     let reply = backend
//!         .generate(&GenerationRequest {
//!             api_key: "sk-or-...".to_string(),
//!             model: "x-ai/grok-4.1-fast:free".to_string(),
//!             system: String::new(),
//!             prompt: "Hello".to_string(),
//!             max_tokens: Some(20),
//!             json_object: false,
//!         })
//!         .await;
//! }
//! ```

mod backend;
mod error;
mod types;

pub use backend::{OpenAIBackend, OpenAIConfig};
pub use error::OpenAIErrorCode;
pub use types::*;
