//! The error type shared by every phrasebook crate.

use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Phrase not found: {0}")]
    PhraseNotFound(Uuid),

    /// The provider call or its reply was unusable.
    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Missing or invalid configuration, including an unset API key.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rejected caller input, such as blank phrase text or an unknown label.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Request error: {0}")]
    Request(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Failures of the store or transport that may clear on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::Request(_) | Error::Internal(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
