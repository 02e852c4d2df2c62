//! Data Normalization SDK - schema-driven normalization of flat tabular data
//!
//! Provides:
//! - Row sources that stream CSV or in-memory rows in preview or full mode
//! - Schema plans describing normalized tables, with validation and
//!   dependency ordering
//! - Table materialization: natural-key deduplication, surrogate ids and
//!   foreign-key population through per-table lookup maps
//! - Storage backends for tables, the schema plan and settings
//! - A report query engine for joins, aggregations and chart series
//! - Language-model collaborators that propose schemas and reports and
//!   summarize results
//! - The pipeline orchestrating one ingest run end to end

pub mod config;
pub mod llm;
pub mod materialize;
pub mod models;
pub mod ordering;
pub mod pipeline;
pub mod report;
pub mod source;
pub mod storage;
pub mod validation;

// Re-export commonly used types
pub use config::{ConfigError, SdkConfig};
pub use llm::{
    LlmClient, LlmConfig, LlmError, ReportAnalyst, SchemaArchitect, SchemaProposer, Summarizer,
};
pub use materialize::{
    KeyEncoding, LookupMap, LookupRegistry, MaterializeError, MaterializeStats, TableMaterializer,
};
pub use models::{
    Aggregation, AggregationMethod, ChartKind, JoinSpec, MaterializedTable, ReportRequest,
    ReportSuggestion, Row, SchemaPlan, TableSchema,
};
pub use ordering::resolve_order;
pub use pipeline::{
    IngestMode, PipelineConfig, PipelineError, PipelineExecutor, PipelineResult, RunReport,
};
pub use report::{
    QueryError, ReportConfig, ReportQueryEngine, ReportResult, ReportService, TableSet,
};
pub use source::{CsvRowSource, MemoryRowSource, ParseMode, RowEvent, RowSource, SourceError};
#[cfg(feature = "native-fs")]
pub use storage::FileSystemStorageBackend;
pub use storage::{MemoryStorageBackend, StorageBackend, StorageError};
pub use validation::{SchemaPlanError, validate_plan};
