//! Ingest pipeline
//!
//! One run takes a [`RowSource`](crate::source::RowSource) through:
//!
//! 1. **Preview**: parse the first rows and infer the headers
//! 2. **Proposal**: obtain a schema plan (supplied, or from a
//!    [`SchemaProposer`](crate::llm::SchemaProposer))
//! 3. **Ordering**: validate the plan and resolve the table order
//! 4. **Full parse**: buffer every row
//! 5. **Materialization**: one table at a time, each persisted as it
//!    completes
//! 6. **Persist schema**: merge the plan into the stored plan
//!
//! When no plan can be obtained and a fallback table is configured, the raw
//! rows are stored as that single table instead.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use data_normalization_sdk::pipeline::{PipelineConfig, PipelineExecutor};
//! use data_normalization_sdk::source::CsvRowSource;
//! use data_normalization_sdk::storage::MemoryStorageBackend;
//!
//! let executor = PipelineExecutor::new(PipelineConfig::default(), Arc::new(MemoryStorageBackend::new()))?
//!     .with_schema_plan(plan);
//! let report = executor.run(&CsvRowSource::from_path("orders.csv")).await?;
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod state;

pub use config::{IngestMode, PipelineConfig};
pub use error::{PipelineError, PipelineResult};
pub use executor::{LAST_RUN_CONFIG, PipelineExecutor};
pub use state::{PipelineState, RunReport, RunStatus};
