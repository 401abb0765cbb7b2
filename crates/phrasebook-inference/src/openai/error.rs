//! Classification of non-success replies from OpenRouter.

use phrasebook_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIErrorCode {
    /// Bad or revoked API key.
    AuthenticationError,
    /// OpenRouter account has no credits left (402).
    InsufficientCredits,
    RateLimitExceeded,
    /// Unknown model id, or a free model that was withdrawn.
    ModelNotFound,
    ServerError,
    Unknown,
}

impl OpenAIErrorCode {
    /// Classify from the HTTP status and the envelope's `error.type`/`code`.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        match (status, error_type) {
            (401 | 403, _) => Self::AuthenticationError,
            (402, _) => Self::InsufficientCredits,
            (429, _) => Self::RateLimitExceeded,
            (404, _) | (_, "model_not_found") => Self::ModelNotFound,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    /// Whether the same request could succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimitExceeded | Self::ServerError)
    }

    /// Caller-fixable problems become [`Error::Config`]; the rest are
    /// [`Error::Inference`].
    pub fn into_error(self, message: &str) -> Error {
        match self {
            Self::AuthenticationError => Error::Config(format!("Authentication failed: {message}")),
            Self::InsufficientCredits => Error::Config(format!("Insufficient credits: {message}")),
            Self::ModelNotFound => Error::Config(format!("Model not found: {message}")),
            Self::RateLimitExceeded => Error::Inference(format!("Rate limited: {message}")),
            Self::ServerError => Error::Inference(format!("Provider error: {message}")),
            Self::Unknown => Error::Inference(message.to_string()),
        }
    }
}
