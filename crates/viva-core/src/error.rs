//! Error types for the interview core

use thiserror::Error;

/// Result type alias for core operations
pub type VivaResult<T> = Result<T, VivaError>;

/// Errors raised by storage, configuration and the LLM gateway
#[derive(Error, Debug)]
pub enum VivaError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("LLM request failed: {0}")]
    Llm(String),

    #[error("LLM API error {status}: {body}")]
    LlmStatus { status: u16, body: String },

    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("Empty response from LLM")]
    EmptyResponse,

    #[error("Could not parse LLM response: {0}")]
    Parse(String),

    #[error("Feedback unavailable: {0}")]
    Unavailable(String),
}

impl From<sled::Error> for VivaError {
    fn from(err: sled::Error) -> Self {
        VivaError::Storage(err.to_string())
    }
}

impl From<config::ConfigError> for VivaError {
    fn from(err: config::ConfigError) -> Self {
        VivaError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for VivaError {
    fn from(err: reqwest::Error) -> Self {
        VivaError::Llm(err.to_string())
    }
}
