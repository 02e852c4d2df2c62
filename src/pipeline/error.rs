//! Error types for pipeline operations
//!
//! Errors chain to their module-level causes for debugging while providing
//! user-friendly messages for CLI output.

use thiserror::Error;

use crate::llm::LlmError;
use crate::materialize::MaterializeError;
use crate::source::SourceError;
use crate::storage::StorageError;
use crate::validation::SchemaPlanError;

/// Errors that can occur during a pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Pipeline configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The source could not be read
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The source produced no rows
    #[error("Source '{0}' contains no rows")]
    NoRows(String),

    /// No usable schema plan
    #[error(transparent)]
    SchemaPlan(#[from] SchemaPlanError),

    /// A table failed; tables written before it stay committed
    #[error("Table '{table}' failed: {source}")]
    TableMaterialization {
        table: String,
        #[source]
        source: MaterializeError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Multiple errors occurred
    #[error(
        "Multiple errors occurred: {}",
        .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
    )]
    Multiple(Vec<PipelineError>),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Build a configuration error from one or more problems
    pub fn config(problems: Vec<String>) -> Self {
        let mut errors: Vec<PipelineError> =
            problems.into_iter().map(PipelineError::ConfigError).collect();
        match errors.len() {
            1 => errors.remove(0),
            _ => PipelineError::Multiple(errors),
        }
    }

    /// The table being materialized when the run failed
    pub fn table_name(&self) -> Option<&str> {
        match self {
            PipelineError::TableMaterialization { table, .. } => Some(table),
            _ => None,
        }
    }

    /// Check if this error is recoverable (can retry)
    pub fn is_recoverable(&self) -> bool {
        match self {
            PipelineError::Storage(StorageError::IoError(_)) => true,
            PipelineError::Llm(e) => e.is_retryable(),
            PipelineError::Multiple(errors) => errors.iter().all(|e| e.is_recoverable()),
            _ => false,
        }
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::ConfigError(msg) => {
                format!(
                    "Configuration error: {msg}\n\nHint: Check the [pipeline] section of your configuration file."
                )
            }
            PipelineError::NoRows(source) => {
                format!(
                    "Source '{source}' contains no rows.\n\nHint: The first line must hold column names, followed by at least one data row."
                )
            }
            PipelineError::SchemaPlan(e) => e.user_message(),
            PipelineError::TableMaterialization { table, source } => {
                format!(
                    "Table '{table}' failed: {source}\n\nHint: Tables written before '{table}' were kept. Fix the plan and re-run; append mode skips rows already stored."
                )
            }
            PipelineError::Llm(e) => e.user_message(),
            PipelineError::Multiple(errors) => errors
                .iter()
                .map(|e| e.user_message())
                .collect::<Vec<_>>()
                .join("\n"),
            _ => self.to_string(),
        }
    }
}
