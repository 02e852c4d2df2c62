//! LLM client trait
//!
//! Every collaborator that needs a language model talks to it through
//! [`LlmClient`], so the Ollama and Gemini backends are interchangeable and
//! tests can substitute a scripted client.

use async_trait::async_trait;

use super::error::LlmResult;

/// Trait for LLM client implementations
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a completion for the given prompt
    async fn complete(&self, prompt: &str) -> LlmResult<String>;

    /// Get the model name being used
    fn model_name(&self) -> &str;

    /// Get the maximum context size in tokens
    fn max_tokens(&self) -> usize;

    /// Check if the client is ready and connected
    async fn is_ready(&self) -> bool;
}

/// A scripted client for tests: returns queued responses in order, repeating
/// the last one
#[cfg(test)]
pub struct MockLlmClient {
    responses: std::sync::Mutex<std::collections::VecDeque<LlmResult<String>>>,
    last: std::sync::Mutex<Option<LlmResult<String>>>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockLlmClient {
    /// Create a mock client that always returns `response`
    pub fn new(response: impl Into<String>) -> Self {
        Self::sequence(vec![Ok(response.into())])
    }

    /// Create a mock client that always fails
    pub fn failing() -> Self {
        Self::sequence(vec![Err(super::error::LlmError::ConnectionError(
            "Mock failure".to_string(),
        ))])
    }

    /// Create a mock client answering with `responses` in order
    pub fn sequence(responses: Vec<LlmResult<String>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            last: std::sync::Mutex::new(None),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Number of completions requested so far
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _prompt: &str) -> LlmResult<String> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let next = self.responses.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(response) => {
                *last = Some(response.clone());
                response
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err(super::error::LlmError::InvalidResponse("empty".into()))),
        }
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }

    fn max_tokens(&self) -> usize {
        4096
    }

    async fn is_ready(&self) -> bool {
        true
    }
}
