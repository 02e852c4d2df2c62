//! Run state machine and run report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::materialize::MaterializeStats;

/// States a pipeline run moves through
///
/// ```text
/// Idle → ParsingPreview → AwaitingSchemaPlan → ParsingFull
///      → MaterializingTables(0..n) → PersistingSchema → Done
/// AwaitingSchemaPlan → ManualSingleTable → Done
/// any → Failed
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    ParsingPreview,
    AwaitingSchemaPlan,
    ParsingFull,
    MaterializingTables { index: usize, table: String },
    PersistingSchema,
    ManualSingleTable,
    Done,
    Failed,
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::ParsingPreview => "parsing_preview",
            PipelineState::AwaitingSchemaPlan => "awaiting_schema_plan",
            PipelineState::ParsingFull => "parsing_full",
            PipelineState::MaterializingTables { .. } => "materializing_tables",
            PipelineState::PersistingSchema => "persisting_schema",
            PipelineState::ManualSingleTable => "manual_single_table",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// What happened during one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run ID
    pub run_id: String,
    /// Name of the row source
    pub source: String,
    /// SHA-256 of the pipeline configuration
    pub config_hash: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    /// Every state entered, in order
    pub states: Vec<PipelineState>,
    /// Headers inferred from the preview
    pub headers: Vec<String>,
    /// Tables in dependency order
    pub table_order: Vec<String>,
    /// Rows read by the full parse
    pub rows_parsed: usize,
    /// One entry per table written
    pub tables: Vec<MaterializeStats>,
    /// Set when the rows were stored as a single table
    pub fallback_table: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new(
        run_id: impl Into<String>,
        source: impl Into<String>,
        config_hash: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            source: source.into(),
            config_hash: config_hash.into(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            states: vec![PipelineState::Idle],
            headers: Vec::new(),
            table_order: Vec::new(),
            rows_parsed: 0,
            tables: Vec::new(),
            fallback_table: None,
            error: None,
            duration_ms: 0,
        }
    }

    /// Record a state transition
    pub fn enter(&mut self, state: PipelineState) {
        self.states.push(state);
    }

    /// The most recent state
    pub fn state(&self) -> &PipelineState {
        self.states.last().unwrap_or(&PipelineState::Idle)
    }

    /// Mark run as completed
    pub fn complete(&mut self) {
        if self.state() != &PipelineState::Done {
            self.enter(PipelineState::Done);
        }
        self.status = RunStatus::Completed;
        self.finish();
    }

    /// Mark run as failed
    pub fn fail(&mut self, error: impl Into<String>) {
        self.enter(PipelineState::Failed);
        self.status = RunStatus::Failed;
        self.error = Some(error.into());
        self.finish();
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn table_stats(&self, table: &str) -> Option<&MaterializeStats> {
        self.tables.iter().find(|s| s.table == table)
    }

    fn finish(&mut self) {
        let now = Utc::now();
        self.duration_ms = (now - self.started_at).num_milliseconds().max(0) as u64;
        self.finished_at = Some(now);
    }
}
