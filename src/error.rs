//! Error types for the agentic RAG pipeline

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rate limited by provider: {message}")]
    RateLimited {
        message: String,
        /// Delay the provider asked for, when it said so.
        retry_after: Option<Duration>,
    },

    #[error("LLM provider error: {0}")]
    Provider(String),

    #[error("Web search error: {0}")]
    WebSearch(String),

    #[error("Document index error: {0}")]
    Index(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Run finished without a generation")]
    MissingGeneration,

    #[error("Step budget exhausted after {steps} steps without a useful answer")]
    StepBudgetExhausted { steps: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Transient overload signal (HTTP 429 / quota exhausted).
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        let message = message.into();
        let retry_after = crate::retry::advised_delay(&message);
        Error::RateLimited {
            message,
            retry_after,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}
