//! Report suggestion, execution and summary over persisted tables

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::{QueryError, ReportQueryEngine, ReportResult};
use crate::llm::{LlmError, ReportAnalyst, Summarizer};
use crate::models::{ReportRequest, ReportSuggestion};
use crate::storage::{StorageBackend, StorageError};

/// Narrative used when the summarizer fails
pub const SUMMARY_FALLBACK: &str = "Could not generate summary.";

/// Rows handed to the summarizer
pub const SUMMARY_SAMPLE_ROWS: usize = 20;

/// Errors raised while proposing reports
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SuggestError {
    #[error("No schema plan has been stored yet; ingest a file first")]
    NoSchemaPlan,

    #[error("No report analyst is configured")]
    NoAnalyst,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// A finished report with its optional narrative
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportOutcome {
    pub title: String,
    pub description: String,
    pub result: ReportResult,
    /// `None` when no summarizer is configured
    pub summary: Option<String>,
}

/// Ties stored tables to the query engine and the model collaborators
pub struct ReportService {
    storage: Arc<dyn StorageBackend>,
    engine: ReportQueryEngine,
    analyst: Option<ReportAnalyst>,
    summarizer: Option<Summarizer>,
}

impl ReportService {
    pub fn new(storage: Arc<dyn StorageBackend>, engine: ReportQueryEngine) -> Self {
        Self {
            storage,
            engine,
            analyst: None,
            summarizer: None,
        }
    }

    pub fn with_analyst(mut self, analyst: ReportAnalyst) -> Self {
        self.analyst = Some(analyst);
        self
    }

    pub fn with_summarizer(mut self, summarizer: Summarizer) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Ask the analyst for reports over the stored schema plan
    pub async fn suggest(&self) -> Result<Vec<ReportSuggestion>, SuggestError> {
        let analyst = self.analyst.as_ref().ok_or(SuggestError::NoAnalyst)?;
        let plan = self
            .storage
            .load_schema_plan()
            .await?
            .filter(|p| !p.is_empty())
            .ok_or(SuggestError::NoSchemaPlan)?;

        let suggestions = analyst.suggest(&plan).await?;
        info!(count = suggestions.len(), "Report suggestions received");
        Ok(suggestions)
    }

    /// Execute a suggested report
    pub async fn run(&self, suggestion: &ReportSuggestion) -> Result<ReportOutcome, QueryError> {
        self.run_request(&suggestion.title, &suggestion.description, &suggestion.request())
            .await
    }

    /// Execute a request and summarize its rows
    pub async fn run_request(
        &self,
        title: &str,
        description: &str,
        request: &ReportRequest,
    ) -> Result<ReportOutcome, QueryError> {
        let result = self
            .engine
            .execute_from_storage(request, self.storage.as_ref())
            .await?;

        let summary = match &self.summarizer {
            Some(summarizer) => {
                let sample = &result.rows[..result.rows.len().min(SUMMARY_SAMPLE_ROWS)];
                match summarizer.summarize(title, description, sample).await {
                    Ok(text) => Some(text),
                    Err(e) => {
                        warn!(title, error = %e, "Summary failed");
                        Some(SUMMARY_FALLBACK.to_string())
                    }
                }
            }
            None => None,
        };

        Ok(ReportOutcome {
            title: title.to_string(),
            description: description.to_string(),
            result,
            summary,
        })
    }
}
