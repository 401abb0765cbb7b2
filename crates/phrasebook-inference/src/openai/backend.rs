//! Chat completions against OpenRouter, or any server speaking the same API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use phrasebook_core::{defaults, Error, GenerationBackend, GenerationRequest, Result};

use super::error::OpenAIErrorCode;
use super::types::*;

/// Configuration for the OpenAI-compatible backend.
///
/// The API key is not part of the configuration: it is read from the
/// settings record for every call and travels on the [`GenerationRequest`].
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Everything before `/chat/completions`.
    pub base_url: String,
    /// Whole-request timeout, in seconds.
    pub timeout_seconds: u64,
    /// Sent as `HTTP-Referer` when set.
    pub http_referer: Option<String>,
    /// Sent as `X-Title` when set.
    pub x_title: Option<String>,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::OPENROUTER_BASE_URL.to_string(),
            timeout_seconds: defaults::GEN_TIMEOUT_SECS,
            http_referer: None,
            x_title: None,
        }
    }
}

impl OpenAIConfig {
    /// Read `OPENROUTER_BASE_URL`, `OPENROUTER_TIMEOUT_SECS`,
    /// `OPENROUTER_HTTP_REFERER` and `OPENROUTER_X_TITLE`.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("OPENROUTER_BASE_URL")
                .unwrap_or_else(|_| defaults::OPENROUTER_BASE_URL.to_string()),
            timeout_seconds: std::env::var("OPENROUTER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults::GEN_TIMEOUT_SECS),
            http_referer: std::env::var("OPENROUTER_HTTP_REFERER")
                .ok()
                .filter(|v| !v.is_empty()),
            x_title: std::env::var("OPENROUTER_X_TITLE")
                .ok()
                .filter(|v| !v.is_empty()),
        }
    }
}

/// OpenAI-compatible generation backend (OpenRouter by default).
pub struct OpenAIBackend {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIBackend {
    /// Fails only when the HTTP client cannot be built.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Inference(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "openai",
            op = "init",
            base_url = %config.base_url,
            timeout_secs = config.timeout_seconds,
            "Initializing OpenAI-compatible backend"
        );

        Ok(Self { client, config })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(OpenAIConfig::default())
    }

    /// See [`OpenAIConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_env())
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    /// Build an authenticated POST request.
    fn build_request(&self, endpoint: &str, api_key: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key));

        // Attribution headers, OpenRouter only.
        if let Some(ref referer) = self.config.http_referer {
            req = req.header("HTTP-Referer", referer);
        }

        if let Some(ref title) = self.config.x_title {
            req = req.header("X-Title", title);
        }

        req.header("Content-Type", "application/json")
    }

    fn chat_request(request: &GenerationRequest) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if !request.system.is_empty() {
            messages.push(ChatMessage::system(request.system.as_str()));
        }
        messages.push(ChatMessage::user(request.prompt.as_str()));

        ChatCompletionRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            response_format: request.json_object.then(ResponseFormat::json_object),
            stream: false,
        }
    }

    /// Turn a non-success response into a classified error.
    async fn error_from_response(response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        let (kind, message) = match serde_json::from_str::<OpenAIErrorResponse>(&body) {
            Ok(parsed) => (parsed.error.kind(), parsed.error.message),
            Err(_) => (String::new(), format!("Provider returned {}", status)),
        };

        let code = OpenAIErrorCode::from_response(status.as_u16(), &kind);
        warn!(
            subsystem = "inference",
            component = "openai",
            status = status.as_u16(),
            error_code = ?code,
            retryable = code.is_retryable(),
            error = %message,
            "Chat completion rejected"
        );
        code.into_error(&message)
    }
}

#[async_trait]
impl GenerationBackend for OpenAIBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let start = Instant::now();
        debug!(
            subsystem = "inference",
            component = "openai",
            op = "generate",
            model = %request.model,
            prompt_len = request.prompt.len(),
            json_object = request.json_object,
            "Sending chat completion"
        );

        let response = self
            .build_request("/chat/completions", &request.api_key)
            .json(&Self::chat_request(request))
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        let content = result
            .first_content()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::Inference("No content generated".to_string()))?
            .to_string();

        debug!(
            subsystem = "inference",
            component = "openai",
            op = "generate",
            model = %request.model,
            response_len = content.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Chat completion finished"
        );
        Ok(content)
    }

    fn backend_name(&self) -> &str {
        "openai"
    }
}
