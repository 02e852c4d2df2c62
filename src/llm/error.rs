//! Error types for language-model operations

use thiserror::Error;

/// Errors that can occur while talking to a language model
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// Failed to connect to LLM service
    #[error("Failed to connect to LLM service: {0}")]
    ConnectionError(String),

    /// Request timeout
    #[error("LLM request timed out after {0} seconds")]
    Timeout(u64),

    /// The service answered with something unusable
    #[error("Invalid LLM response: {0}")]
    InvalidResponse(String),

    /// Failed to parse LLM output as JSON
    #[error("Failed to parse LLM output as JSON: {0}")]
    ParseError(String),

    /// Maximum retries exceeded
    #[error("Maximum retries ({0}) exceeded")]
    MaxRetriesExceeded(usize),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// No API key is stored for a provider that needs one
    #[error("No API key configured")]
    MissingApiKey,

    /// Rate limiting
    #[error("Rate limited by LLM service, retry after {0} seconds")]
    RateLimited(u64),

    /// Feature not available
    #[error("LLM feature not available: {0}. Enable with --features {1}")]
    FeatureNotAvailable(String, String),
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::ParseError(err.to_string())
    }
}

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

impl LlmError {
    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            LlmError::ConnectionError(msg) => {
                format!(
                    "Failed to connect to LLM service: {msg}\n\n\
                    Hints:\n\
                    - Check your internet connection\n\
                    - Verify the API endpoint is correct\n\
                    - For Ollama: ensure 'ollama serve' is running"
                )
            }
            LlmError::Timeout(secs) => {
                format!(
                    "LLM request timed out after {secs} seconds.\n\n\
                    Hint: Increase llm.timeout_seconds in the configuration file."
                )
            }
            LlmError::RateLimited(secs) => {
                format!(
                    "Rate limited by LLM service. Retry after {secs} seconds.\n\n\
                    Hint: Wait and try again, or use a different API key."
                )
            }
            LlmError::MissingApiKey => "No API key configured.\n\n\
                Hint: Store one with 'dnorm config set-api-key <KEY>'."
                .to_string(),
            LlmError::FeatureNotAvailable(feature, flag) => {
                format!(
                    "LLM feature '{feature}' not available.\n\n\
                    Hint: Rebuild with --features {flag}"
                )
            }
            _ => self.to_string(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::ConnectionError(_)
                | LlmError::Timeout(_)
                | LlmError::RateLimited(_)
                | LlmError::ParseError(_)
                | LlmError::InvalidResponse(_)
        )
    }

    /// Get suggested wait time before retry (in seconds)
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            LlmError::RateLimited(secs) => Some(*secs),
            LlmError::Timeout(_) => Some(5),
            LlmError::ConnectionError(_) => Some(2),
            _ => None,
        }
    }
}
