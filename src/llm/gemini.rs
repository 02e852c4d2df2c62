//! Google Gemini API client
//!
//! Each call is a single-turn `generateContent` request; no conversation
//! history is carried between prompts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::client::LlmClient;
use super::error::{LlmError, LlmResult};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini API client
#[derive(Clone)]
pub struct GeminiClient {
    endpoint: String,
    model: String,
    api_key: String,
    timeout_seconds: u64,
    temperature: f32,
    max_context_tokens: usize,
    #[cfg(feature = "llm-online")]
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[allow(dead_code)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[allow(dead_code)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[allow(dead_code)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first part of the first candidate
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
    }
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            model: model.into(),
            api_key: api_key.into(),
            timeout_seconds: 120,
            temperature: 0.1,
            max_context_tokens: 1_048_576,
            #[cfg(feature = "llm-online")]
            client: reqwest::Client::new(),
        }
    }

    /// Point the client at a different models endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    fn url(&self) -> String {
        format!(
            "{}/{}:generateContent?key={}",
            self.endpoint, self.model, self.api_key
        )
    }
}

#[cfg(feature = "llm-online")]
#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, prompt: &str) -> LlmResult<String> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        tracing::debug!(model = %self.model, "Sending request to Gemini");

        let response = self
            .client
            .post(self.url())
            .json(&request)
            .timeout(std::time::Duration::from_secs(self.timeout_seconds))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout_seconds)
                } else {
                    LlmError::ConnectionError(e.without_url().to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited(60));
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(LlmError::ConfigError(format!(
                "Gemini rejected the API key (HTTP {status})"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ConnectionError(format!(
                "Gemini API error (HTTP {status}): {body}"
            )));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        body.first_text()
            .ok_or_else(|| LlmError::InvalidResponse("Gemini returned no candidates".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn max_tokens(&self) -> usize {
        self.max_context_tokens
    }

    async fn is_ready(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[cfg(not(feature = "llm-online"))]
#[async_trait]
impl LlmClient for GeminiClient {
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
