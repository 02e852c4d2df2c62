//! Language-model collaborators
//!
//! The pipeline asks a model for a schema plan when none is supplied, and the
//! report service asks one for report suggestions and narrative summaries.
//! Everything goes through the [`LlmClient`] trait.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use data_normalization_sdk::llm::{OllamaClient, SchemaArchitect, SchemaProposer};
//!
//! let client = Arc::new(OllamaClient::new("http://localhost:11434", "llama3.2"));
//! let architect = SchemaArchitect::new(client);
//! let plan = architect.propose(&headers).await?;
//! ```
//!
//! # Feature Flags
//!
//! - `llm-online`: Enable the Ollama and Gemini HTTP clients
//!
//! Without it, the module still provides configuration, prompts and the
//! agents, but the clients return feature-not-available errors.

pub mod agents;
pub mod client;
pub mod config;
pub mod error;
pub mod gemini;
pub mod ollama;
pub mod prompt;

pub use agents::{FixedPlanProposer, ReportAnalyst, SchemaArchitect, SchemaProposer, Summarizer};
pub use client::LlmClient;
pub use config::{LlmConfig, LlmProvider};
pub use error::{LlmError, LlmResult};
pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use prompt::extract_json;

#[cfg(test)]
pub use client::MockLlmClient;
