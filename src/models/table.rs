//! Materialized table model

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::schema::TableSchema;
use super::value::Row;

/// A normalized table: every row carries exactly the declared columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterializedTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl MaterializedTable {
    /// Create an empty table for a schema
    pub fn empty(schema: &TableSchema) -> Self {
        Self {
            name: schema.name.clone(),
            columns: schema.columns.clone(),
            rows: Vec::new(),
        }
    }

    /// Build a table, conforming every row to the declared columns
    pub fn from_rows(name: impl Into<String>, columns: Vec<String>, rows: Vec<Row>) -> Self {
        let rows = rows.iter().map(|r| conform(r, &columns)).collect();
        Self {
            name: name.into(),
            columns,
            rows,
        }
    }

    /// Wrap stored rows as they are
    ///
    /// Columns are the ordered union of every field seen, since stored tables
    /// carry no schema of their own.
    pub fn from_stored(name: impl Into<String>, rows: Vec<Row>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for field in row.keys() {
                if !columns.contains(field) {
                    columns.push(field.clone());
                }
            }
        }
        Self {
            name: name.into(),
            columns,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, null where a row lacks it
    pub fn column_values(&self, column: &str) -> Vec<&Value> {
        self.rows
            .iter()
            .map(|r| r.get(column).unwrap_or(&Value::Null))
            .collect()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

/// Re-map a row to exactly `columns`, filling missing fields with null
pub fn conform(row: &Row, columns: &[String]) -> Row {
    columns
        .iter()
        .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
        .collect()
}
