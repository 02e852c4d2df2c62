//! Models module for the SDK
//!
//! Defines the data structures shared by the normalization pipeline and the
//! report engine: dynamic rows, schema plans, materialized tables and report
//! requests.

pub mod report;
pub mod schema;
pub mod table;
pub mod value;

pub use report::{
    Aggregation, AggregationMethod, ChartKind, JoinSpec, ReportRequest, ReportSuggestion,
};
pub use schema::{DEFAULT_SURROGATE_COLUMN, ForeignKeyRef, PrimaryKey, SchemaPlan, TableSchema};
pub use table::{MaterializedTable, conform};
pub use value::{Row, display_text, number_value, parse_float, row};
