//! Configuration for the language-model collaborators

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::client::LlmClient;
use super::error::{LlmError, LlmResult};
use super::gemini::{DEFAULT_GEMINI_MODEL, GeminiClient};
use super::ollama::OllamaClient;

/// Which model service backs the collaborators
///
/// - `None`: no model; schema plans must be supplied and reports are manual
/// - `Ollama`: a local Ollama server
/// - `Gemini`: Google Gemini, authenticated with the stored API key
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LlmProvider {
    #[default]
    None,

    Ollama {
        #[serde(default = "default_ollama_url")]
        url: String,
        model: String,
    },

    Gemini {
        #[serde(default = "default_gemini_model")]
        model: String,
        /// Override of the models endpoint, mostly for proxies
        #[serde(default)]
        endpoint: Option<String>,
    },
}

impl LlmProvider {
    pub fn ollama(model: impl Into<String>) -> Self {
        LlmProvider::Ollama {
            url: default_ollama_url(),
            model: model.into(),
        }
    }

    pub fn gemini() -> Self {
        LlmProvider::Gemini {
            model: default_gemini_model(),
            endpoint: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, LlmProvider::None)
    }

    /// Whether the provider authenticates with the stored API key
    pub fn needs_api_key(&self) -> bool {
        matches!(self, LlmProvider::Gemini { .. })
    }
}

/// Settings shared by all collaborators
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Maximum retries on failure
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Pause between attempts, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Temperature for LLM sampling (0.0 = deterministic)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum context tokens (Ollama only)
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_gemini_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

fn default_timeout_seconds() -> u64 {
    120
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_context_tokens() -> usize {
    8192
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::None,
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            temperature: default_temperature(),
            max_context_tokens: default_max_context_tokens(),
        }
    }
}

impl LlmConfig {
    pub fn with_provider(mut self, provider: LlmProvider) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Build the client for the configured provider
    ///
    /// Returns `Ok(None)` when no provider is configured. Gemini requires
    /// `api_key`.
    pub fn build_client(&self, api_key: Option<&str>) -> LlmResult<Option<Arc<dyn LlmClient>>> {
        if self.provider.is_enabled() && !cfg!(feature = "llm-online") {
            return Err(LlmError::FeatureNotAvailable(
                "Online LLM".to_string(),
                "llm-online".to_string(),
            ));
        }

        match &self.provider {
            LlmProvider::None => Ok(None),
            LlmProvider::Ollama { url, model } => {
                let client = OllamaClient::new(url.clone(), model.clone())
                    .with_timeout(self.timeout_seconds)
                    .with_max_context(self.max_context_tokens)
                    .with_temperature(self.temperature);
                let client: Arc<dyn LlmClient> = Arc::new(client);
                Ok(Some(client))
            }
            LlmProvider::Gemini { model, endpoint } => {
                let key = api_key
                    .filter(|k| !k.trim().is_empty())
                    .ok_or(LlmError::MissingApiKey)?;
                let mut client = GeminiClient::new(key, model.clone())
                    .with_timeout(self.timeout_seconds)
                    .with_temperature(self.temperature);
                if let Some(endpoint) = endpoint {
                    client = client.with_endpoint(endpoint.clone());
                }
                let client: Arc<dyn LlmClient> = Arc::new(client);
                Ok(Some(client))
            }
        }
    }
}
