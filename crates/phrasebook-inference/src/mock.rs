//! In-memory [`GenerationBackend`] for tests that must not reach OpenRouter.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use phrasebook_inference::mock::MockGenerationBackend;
//!
//! let backend = MockGenerationBackend::new()
//!     .with_fixed_response("Technical")
//!     .with_scripted_failure("provider down");
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use phrasebook_core::{Error, GenerationBackend, GenerationRequest, Result};

/// Scripted reply consumed by the next call.
#[derive(Debug, Clone)]
enum MockReply {
    Content(String),
    Failure(String),
}

#[derive(Debug, Clone)]
struct Replies {
    by_prompt: HashMap<String, String>,
    fallback: String,
    failure_rate: f64,
}

impl Default for Replies {
    fn default() -> Self {
        Self {
            by_prompt: HashMap::new(),
            fallback: "Life Wisdom".to_string(),
            failure_rate: 0.0,
        }
    }
}

/// One request as the backend saw it.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub json_object: bool,
    pub at: std::time::Instant,
}

/// Mock [`GenerationBackend`]: scripted replies first, then per-prompt
/// mappings, then the default response.
#[derive(Clone)]
pub struct MockGenerationBackend {
    replies: Arc<Replies>,
    script: Arc<Mutex<VecDeque<MockReply>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockGenerationBackend {
    /// Answers "Life Wisdom" to everything.
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Replies::default()),
            script: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Reply used when neither the script nor a prompt mapping applies.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.replies).fallback = response.into();
        self
    }

    /// Answer `output` whenever the user prompt is exactly `prompt`.
    pub fn with_response_mapping(
        mut self,
        prompt: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.replies)
            .by_prompt
            .insert(prompt.into(), output.into());
        self
    }

    /// Queue a one-shot response.
    pub fn with_scripted_response(self, response: impl Into<String>) -> Self {
        self.push(MockReply::Content(response.into()));
        self
    }

    /// Queue a one-shot failure.
    pub fn with_scripted_failure(self, message: impl Into<String>) -> Self {
        self.push(MockReply::Failure(message.into()));
        self
    }

    /// Fail unscripted calls with probability `rate`, clamped to `0.0..=1.0`.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        Arc::make_mut(&mut self.replies).failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear()
    }

    fn push(&self, reply: MockReply) {
        lock(&self.script).push_back(reply);
    }

    fn record(&self, request: &GenerationRequest) {
        lock(&self.calls).push(MockCall {
            model: request.model.clone(),
            system: request.system.clone(),
            prompt: request.prompt.clone(),
            json_object: request.json_object,
            at: std::time::Instant::now(),
        });
    }

    fn should_fail(&self) -> bool {
        use rand::Rng;
        self.replies.failure_rate > 0.0 && rand::thread_rng().gen::<f64>() < self.replies.failure_rate
    }
}

/// A panicking test must not poison the backend for the rest of the suite.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Default for MockGenerationBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.record(request);

        let scripted = lock(&self.script).pop_front();
        match scripted {
            Some(MockReply::Content(content)) => return Ok(content),
            Some(MockReply::Failure(message)) => return Err(Error::Inference(message)),
            None => {}
        }

        if self.should_fail() {
            return Err(Error::Inference("Simulated failure for testing".to_string()));
        }

        let replies = &self.replies;
        Ok(replies
            .by_prompt
            .get(&request.prompt)
            .unwrap_or(&replies.fallback)
            .clone())
    }

    fn backend_name(&self) -> &str {
        "mock"
    }
}
