//! Pipeline configuration types

use serde::{Deserialize, Serialize};

use crate::materialize::KeyEncoding;
use crate::storage::validate_table_name;

/// How a run treats tables that already exist in storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestMode {
    /// Keep stored rows; only rows with new natural keys are added and ids
    /// continue from the stored maximum
    #[default]
    Append,
    /// Delete each planned table before writing it
    Replace,
}

impl IngestMode {
    pub fn name(&self) -> &'static str {
        match self {
            IngestMode::Append => "append",
            IngestMode::Replace => "replace",
        }
    }
}

/// Main pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rows read to infer headers before proposing a schema
    pub preview_rows: usize,
    /// Natural key encoding used for deduplication and lookups
    pub key_encoding: KeyEncoding,
    pub ingest_mode: IngestMode,
    /// Table that receives the raw rows when no schema plan can be obtained
    pub fallback_table: Option<String>,
    /// Save the run report under the `last_run` config key
    pub record_run_report: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preview_rows: 10,
            key_encoding: KeyEncoding::default(),
            ingest_mode: IngestMode::default(),
            fallback_table: None,
            record_run_report: true,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preview_rows(mut self, rows: usize) -> Self {
        self.preview_rows = rows;
        self
    }

    pub fn with_key_encoding(mut self, encoding: KeyEncoding) -> Self {
        self.key_encoding = encoding;
        self
    }

    pub fn with_ingest_mode(mut self, mode: IngestMode) -> Self {
        self.ingest_mode = mode;
        self
    }

    /// Import the file as one table named `table` when no plan is available
    pub fn with_fallback_table(mut self, table: impl Into<String>) -> Self {
        self.fallback_table = Some(table.into());
        self
    }

    pub fn with_record_run_report(mut self, record: bool) -> Self {
        self.record_run_report = record;
        self
    }

    /// Validate the configuration, collecting every problem
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        if self.preview_rows == 0 {
            problems.push("preview_rows must be at least 1".to_string());
        }

        if let Some(table) = &self.fallback_table {
            if let Err(e) = validate_table_name(table) {
                problems.push(format!("fallback_table: {e}"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.preview_rows, 10);
        assert_eq!(config.ingest_mode, IngestMode::Append);
        assert_eq!(config.key_encoding, KeyEncoding::Canonical);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_collects_problems() {
        let config = PipelineConfig::new()
            .with_preview_rows(0)
            .with_fallback_table("../escape");
        assert_eq!(config.validate().unwrap_err().len(), 2);
    }

    #[test]
    fn test_partial_toml() {
        let config: PipelineConfig = toml::from_str(
            r#"
            ingest_mode = "replace"
            key_encoding = "delimited"
            "#,
        )
        .unwrap();
        assert_eq!(config.ingest_mode, IngestMode::Replace);
        assert_eq!(config.key_encoding, KeyEncoding::Delimited);
        assert_eq!(config.preview_rows, 10);
    }
}
