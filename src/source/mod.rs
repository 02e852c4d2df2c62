//! Row stream sources
//!
//! A [`RowSource`] parses raw input on a blocking worker and streams the rows
//! back as [`RowEvent`]s over a bounded channel. A preview parse stops after a
//! fixed number of rows and still reports [`RowEvent::Complete`]; dropping the
//! receiver stops the worker at its next send.

pub mod csv_source;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::Row;

pub use csv_source::{CsvRowSource, typed_value};

/// Rows sent per [`RowEvent::Data`] message
pub const DEFAULT_BATCH_ROWS: usize = 256;

/// Capacity of the worker channel, in batches
pub const CHANNEL_CAPACITY: usize = 16;

/// Errors produced while reading rows
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Failed to open source '{source_name}': {message}")]
    Open {
        source_name: String,
        message: String,
    },

    #[error("Failed to parse source: {0}")]
    Parse(String),

    #[error("Row worker stopped before completing")]
    WorkerClosed,
}

/// How much of the source to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Stop after at most this many rows
    Preview(usize),
    /// Read every row
    Full,
}

impl ParseMode {
    pub fn limit(&self) -> Option<usize> {
        match self {
            ParseMode::Preview(cap) => Some(*cap),
            ParseMode::Full => None,
        }
    }
}

/// Message from a row worker
#[derive(Debug, Clone, PartialEq)]
pub enum RowEvent {
    /// A batch of parsed rows, in input order
    Data(Vec<Row>),
    /// No more rows will follow
    Complete,
    /// Parsing failed; no more rows will follow
    Error(String),
}

/// A source of rows that can be parsed in preview or full mode
pub trait RowSource: Send + Sync {
    /// Display name of the source (file name for file sources)
    fn name(&self) -> &str;

    /// Start a worker and return the receiving end of its event stream
    ///
    /// Must be called from within a tokio runtime.
    fn stream(&self, mode: ParseMode) -> mpsc::Receiver<RowEvent>;
}

/// Drain a source into memory
pub async fn collect_rows(
    source: &dyn RowSource,
    mode: ParseMode,
) -> Result<Vec<Row>, SourceError> {
    let mut rx = source.stream(mode);
    let mut rows = Vec::new();

    while let Some(event) = rx.recv().await {
        match event {
            RowEvent::Data(batch) => rows.extend(batch),
            RowEvent::Complete => return Ok(rows),
            RowEvent::Error(message) => return Err(SourceError::Parse(message)),
        }
    }
    Err(SourceError::WorkerClosed)
}

/// Field names seen across `rows`, in first-seen order
pub fn infer_headers(rows: &[Row]) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for row in rows {
        for field in row.keys() {
            if !headers.contains(field) {
                headers.push(field.clone());
            }
        }
    }
    headers
}

/// Rows already held in memory
#[derive(Debug, Clone)]
pub struct MemoryRowSource {
    name: String,
    rows: Vec<Row>,
    batch_rows: usize,
}

impl MemoryRowSource {
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            rows,
            batch_rows: DEFAULT_BATCH_ROWS,
        }
    }

    pub fn with_batch_rows(mut self, batch_rows: usize) -> Self {
        self.batch_rows = batch_rows.max(1);
        self
    }
}

impl RowSource for MemoryRowSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn stream(&self, mode: ParseMode) -> mpsc::Receiver<RowEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let take = mode.limit().unwrap_or(self.rows.len()).min(self.rows.len());
        let rows = self.rows[..take].to_vec();
        let batch_rows = self.batch_rows;

        tokio::spawn(async move {
            for chunk in rows.chunks(batch_rows) {
                if tx.send(RowEvent::Data(chunk.to_vec())).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(RowEvent::Complete).await;
        });
        rx
    }
}
