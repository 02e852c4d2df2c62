//! Ollama API client
//!
//! Talks to a locally hosted model through `/api/generate`.
//!
//! ```ignore
//! use data_normalization_sdk::llm::OllamaClient;
//!
//! let client = OllamaClient::new("http://localhost:11434", "llama3.2").with_timeout(60);
//! let text = client.complete("Propose a schema for ...").await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::client::LlmClient;
use super::error::{LlmError, LlmResult};

/// Ollama API client
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    timeout_seconds: u64,
    max_context_tokens: usize,
    temperature: f32,
    #[cfg(feature = "llm-online")]
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[allow(dead_code)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
#[allow(dead_code)]
struct GenerateOptions {
    temperature: f32,
    num_ctx: usize,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    total_duration: Option<u64>,
    #[serde(default)]
    eval_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct ModelInfo {
    name: String,
}

impl OllamaClient {
    /// Create a new Ollama client for `model` served at `base_url`
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout_seconds: 120,
            max_context_tokens: 8192,
            temperature: 0.1,
            #[cfg(feature = "llm-online")]
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_max_context(mut self, tokens: usize) -> Self {
        self.max_context_tokens = tokens;
        self
    }

    /// Set the sampling temperature, clamped to `0.0..=2.0`
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List models installed on the server
    #[cfg(feature = "llm-online")]
    pub async fn list_models(&self) -> LlmResult<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::ConnectionError(format!(
                "Failed to list models: HTTP {}",
                response.status()
            )));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    #[cfg(not(feature = "llm-online"))]
    pub async fn list_models(&self) -> LlmResult<Vec<String>> {
        Err(LlmError::FeatureNotAvailable(
            "Online LLM".to_string(),
            "llm-online".to_string(),
        ))
    }
}

#[cfg(feature = "llm-online")]
#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, prompt: &str) -> LlmResult<String> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: None,
            options: GenerateOptions {
                temperature: self.temperature,
                num_ctx: self.max_context_tokens,
            },
        };

        tracing::debug!(url = %url, model = %self.model, "Sending request to Ollama");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .timeout(std::time::Duration::from_secs(self.timeout_seconds))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout_seconds)
                } else {
                    LlmError::ConnectionError(format!(
                        "Failed to reach Ollama at {}: {e}",
                        self.base_url
                    ))
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited(60));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ConnectionError(format!(
                "Ollama API error (HTTP {status}): {body}"
            )));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        if let Some(duration) = generated.total_duration {
            tracing::debug!(
                "Ollama completion took {} ms, {} tokens",
                duration / 1_000_000,
                generated.eval_count.unwrap_or(0)
            );
        }

        Ok(generated.response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn max_tokens(&self) -> usize {
        self.max_context_tokens
    }

    async fn is_ready(&self) -> bool {
        self.list_models()
            .await
            .map(|models| models.iter().any(|m| m.starts_with(&self.model)))
            .unwrap_or(false)
    }
}

#[cfg(not(feature = "llm-online"))]
#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, _prompt: &str) -> LlmResult<String> {
        Err(LlmError::FeatureNotAvailable(
            "Online LLM".to_string(),
            "llm-online".to_string(),
        ))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn max_tokens(&self) -> usize {
        self.max_context_tokens
    }

    async fn is_ready(&self) -> bool {
        false
    }
}
