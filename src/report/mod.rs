//! Report query engine
//!
//! Executes a [`ReportRequest`] against materialized tables: an optional
//! parent/child equi-join, an optional group-by aggregation, then projection
//! onto the requested headers. Missing join partners and non-numeric values
//! never fail a query; they surface as nulls and zeros.

pub mod service;

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::models::{
    Aggregation, AggregationMethod, ChartKind, MaterializedTable, ReportRequest, Row, conform,
    number_value, parse_float,
};
use crate::storage::{StorageBackend, StorageError};

pub use service::{
    ReportOutcome, ReportService, SUMMARY_FALLBACK, SUMMARY_SAMPLE_ROWS, SuggestError,
};

/// Errors that prevent a report from being produced
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Report request names no tables")]
    NoTables,

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Tables {0:?} are requested together but no join is specified")]
    MissingJoin(Vec<String>),

    #[error("Join references table '{0}', which is not part of the request")]
    JoinTableNotRequested(String),

    #[error("Only one parent and one child table can be joined, got {0} tables")]
    TooManyTables(usize),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Which side wins when joined rows share a field name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePrecedence {
    /// Child fields are kept on collision
    #[default]
    ChildWins,
    /// Parent fields overwrite child fields on collision
    ParentWins,
}

/// Report engine settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub merge_precedence: MergePrecedence,
}

impl ReportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_merge_precedence(mut self, precedence: MergePrecedence) -> Self {
        self.merge_precedence = precedence;
        self
    }
}

/// Label/value projection of a report for charting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub kind: ChartKind,
    /// Header the values come from
    pub label: String,
    pub labels: Vec<Value>,
    pub values: Vec<Value>,
}

/// Uniform report rows plus their chart projection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportResult {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    pub chart: ChartSeries,
}

impl ReportResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Borrowed tables a query runs against
#[derive(Debug, Default)]
pub struct TableSet<'a> {
    tables: HashMap<&'a str, &'a MaterializedTable>,
}

impl<'a> TableSet<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: &'a MaterializedTable) -> Self {
        self.insert(table);
        self
    }

    pub fn insert(&mut self, table: &'a MaterializedTable) {
        self.tables.insert(table.name.as_str(), table);
    }

    pub fn get(&self, name: &str) -> Option<&'a MaterializedTable> {
        self.tables.get(name).copied()
    }
}

impl<'a> FromIterator<&'a MaterializedTable> for TableSet<'a> {
    fn from_iter<I: IntoIterator<Item = &'a MaterializedTable>>(iter: I) -> Self {
        let mut set = TableSet::new();
        for table in iter {
            set.insert(table);
        }
        set
    }
}

/// Stateless executor for report requests
#[derive(Debug, Clone, Default)]
pub struct ReportQueryEngine {
    config: ReportConfig,
}

impl ReportQueryEngine {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Run a request against borrowed tables
    pub fn execute(
        &self,
        request: &ReportRequest,
        tables: &TableSet<'_>,
    ) -> Result<ReportResult, QueryError> {
        let joined = self.join(request, tables)?;

        let rows = match &request.aggregation {
            Some(agg) => aggregate(&joined, agg),
            None => joined,
        };

        let headers = request.expected_headers();
        let rows: Vec<Row> = rows.iter().map(|r| conform(r, &headers)).collect();
        let chart = chart_series(request, &headers, &rows);

        debug!(
            tables = ?request.tables,
            rows = rows.len(),
            aggregated = request.aggregation.is_some(),
            "Report executed"
        );

        Ok(ReportResult {
            headers,
            rows,
            chart,
        })
    }

    /// Load the requested tables from storage, then execute
    pub async fn execute_from_storage(
        &self,
        request: &ReportRequest,
        storage: &dyn StorageBackend,
    ) -> Result<ReportResult, QueryError> {
        let known = storage.list_tables().await?;
        let mut loaded = Vec::with_capacity(request.tables.len());
        for name in &request.tables {
            if !known.contains(name) {
                return Err(QueryError::UnknownTable(name.clone()));
            }
            let rows = storage.load_rows(name).await?;
            loaded.push(MaterializedTable::from_stored(name.clone(), rows));
        }
        let set: TableSet<'_> = loaded.iter().collect();
        self.execute(request, &set)
    }

    fn join(&self, request: &ReportRequest, tables: &TableSet<'_>) -> Result<Vec<Row>, QueryError> {
        match request.tables.as_slice() {
            [] => Err(QueryError::NoTables),
            [only] => Ok(lookup(tables, only)?.rows.clone()),
            [_, _] => {
                let join = request
                    .join
                    .as_ref()
                    .ok_or_else(|| QueryError::MissingJoin(request.tables.clone()))?;
                for name in [&join.parent_table, &join.child_table] {
                    if !request.tables.contains(name) {
                        return Err(QueryError::JoinTableNotRequested(name.clone()));
                    }
                }
                for name in &request.tables {
                    lookup(tables, name)?;
                }
                let parent = lookup(tables, &join.parent_table)?;
                let child = lookup(tables, &join.child_table)?;
                Ok(self.merge(parent, &join.parent_key, child, &join.child_key))
            }
            more => Err(QueryError::TooManyTables(more.len())),
        }
    }

    fn merge(
        &self,
        parent: &MaterializedTable,
        parent_key: &str,
        child: &MaterializedTable,
        child_key: &str,
    ) -> Vec<Row> {
        // Later parents with the same key replace earlier ones
        let mut by_key: HashMap<String, &Row> = HashMap::new();
        for row in &parent.rows {
            if let Some(key) = join_key(row.get(parent_key)) {
                by_key.insert(key, row);
            }
        }

        child
            .rows
            .iter()
            .map(|child_row| {
                let matched = join_key(child_row.get(child_key)).and_then(|k| by_key.get(&k));
                let mut merged = child_row.clone();
                match matched {
                    Some(parent_row) => {
                        for (field, value) in parent_row.iter() {
                            let overwrite = self.config.merge_precedence
                                == MergePrecedence::ParentWins
                                || !merged.contains_key(field);
                            if overwrite {
                                merged.insert(field.clone(), value.clone());
                            }
                        }
                    }
                    None => {
                        for column in &parent.columns {
                            merged.entry(column.clone()).or_insert(Value::Null);
                        }
                    }
                }
                merged
            })
            .collect()
    }
}

fn lookup<'a>(tables: &TableSet<'a>, name: &str) -> Result<&'a MaterializedTable, QueryError> {
    tables
        .get(name)
        .ok_or_else(|| QueryError::UnknownTable(name.to_string()))
}

/// Key used to match join partners; null and missing never match
fn join_key(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(format!("s:{s}")),
        other => Some(format!("v:{}", crate::models::display_text(Some(other)))),
    }
}

/// Group identity; missing and null share the null group
fn group_key(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "n:".to_string(),
        Some(Value::String(s)) => format!("s:{s}"),
        Some(other) => format!("v:{}", crate::models::display_text(Some(other))),
    }
}

#[derive(Default)]
struct GroupAcc {
    label: Value,
    sum: f64,
    count: usize,
    numeric: usize,
}

fn aggregate(rows: &[Row], agg: &Aggregation) -> Vec<Row> {
    let mut groups: IndexMap<String, GroupAcc> = IndexMap::new();

    for row in rows {
        let label = row.get(&agg.group_by);
        let acc = groups
            .entry(group_key(label))
            .or_insert_with(|| GroupAcc {
                label: label.cloned().unwrap_or(Value::Null),
                ..GroupAcc::default()
            });

        acc.count += 1;
        let value = parse_float(row.get(&agg.column)).filter(|v| !v.is_nan());
        match agg.method {
            AggregationMethod::Sum => acc.sum += value.unwrap_or(0.0),
            AggregationMethod::Count => {}
            AggregationMethod::Avg => {
                if let Some(v) = value {
                    acc.sum += v;
                    acc.numeric += 1;
                }
            }
        }
    }

    groups
        .into_values()
        .map(|acc| {
            let result = match agg.method {
                AggregationMethod::Sum => acc.sum,
                AggregationMethod::Count => acc.count as f64,
                AggregationMethod::Avg if acc.numeric > 0 => acc.sum / acc.numeric as f64,
                AggregationMethod::Avg => 0.0,
            };
            let mut out = Row::new();
            out.insert(agg.group_by.clone(), acc.label);
            out.insert(agg.output_column.clone(), number_value(result));
            out
        })
        .collect()
}

fn chart_series(request: &ReportRequest, headers: &[String], rows: &[Row]) -> ChartSeries {
    let (label_col, value_col) = match &request.aggregation {
        Some(agg) => (agg.group_by.as_str(), agg.output_column.as_str()),
        None => match headers {
            [first, second, ..] => (first.as_str(), second.as_str()),
            _ => {
                return ChartSeries {
                    kind: request.chart_kind.clone(),
                    ..ChartSeries::default()
                };
            }
        },
    };

    ChartSeries {
        kind: request.chart_kind.clone(),
        label: value_col.to_string(),
        labels: rows
            .iter()
            .map(|r| r.get(label_col).cloned().unwrap_or(Value::Null))
            .collect(),
        values: rows
            .iter()
            .map(|r| r.get(value_col).cloned().unwrap_or(Value::Null))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JoinSpec, row};
    use serde_json::json;

    fn table(name: &str, rows: Vec<Row>) -> MaterializedTable {
        MaterializedTable::from_stored(name, rows)
    }

    fn sales() -> MaterializedTable {
        table(
            "sales",
            vec![
                row([("region", json!("N")), ("amount", json!("10"))]),
                row([("region", json!("N")), ("amount", json!(20))]),
                row([("region", json!("S")), ("amount", json!("x"))]),
            ],
        )
    }

    #[test]
    fn test_sum_treats_non_numeric_as_zero() {
        let sales = sales();
        let request = ReportRequest::new(["sales"]).with_aggregation(Aggregation::new(
            "region",
            "amount",
            AggregationMethod::Sum,
            "total",
        ));
        let result = ReportQueryEngine::default()
            .execute(&request, &TableSet::new().with_table(&sales))
            .unwrap();

        assert_eq!(result.headers, vec!["region", "total"]);
        assert_eq!(
            result.rows,
            vec![
                row([("region", json!("N")), ("total", json!(30))]),
                row([("region", json!("S")), ("total", json!(0))]),
            ]
        );
        assert_eq!(result.chart.labels, vec![json!("N"), json!("S")]);
        assert_eq!(result.chart.values, vec![json!(30), json!(0)]);
        assert_eq!(result.chart.label, "total");
    }

    #[test]
    fn test_avg_ignores_non_numeric() {
        let sales = sales();
        let request = ReportRequest::new(["sales"]).with_aggregation(Aggregation::new(
            "region",
            "amount",
            AggregationMethod::Avg,
            "avg",
        ));
        let result = ReportQueryEngine::default()
            .execute(&request, &TableSet::new().with_table(&sales))
            .unwrap();
        assert_eq!(result.rows[0]["avg"], json!(15));
        assert_eq!(result.rows[1]["avg"], json!(0));
    }

    #[test]
    fn test_count_and_null_group() {
        let t = table(
            "t",
            vec![
                row([("g", json!("a")), ("v", json!(1))]),
                row([("v", json!(2))]),
                row([("g", Value::Null), ("v", json!(3))]),
                row([("g", json!("a")), ("v", json!(4))]),
            ],
        );
        let request = ReportRequest::new(["t"]).with_aggregation(Aggregation::new(
            "g",
            "v",
            AggregationMethod::Count,
            "n",
        ));
        let result = ReportQueryEngine::default()
            .execute(&request, &TableSet::new().with_table(&t))
            .unwrap();
        assert_eq!(
            result.rows,
            vec![
                row([("g", json!("a")), ("n", json!(2))]),
                row([("g", Value::Null), ("n", json!(2))]),
            ]
        );
    }

    fn customers_orders() -> (MaterializedTable, MaterializedTable) {
        let customers = table(
            "customers",
            vec![
                row([("generated_id", json!("customers_1")), ("name", json!("Ann"))]),
                row([("generated_id", json!("customers_2")), ("name", json!("Bob"))]),
            ],
        );
        let order = |id: &str, customer: Value, total: i64| {
            row([
                ("generated_id", json!(id)),
                ("customer", customer),
                ("total", json!(total)),
            ])
        };
        let orders = table(
            "orders",
            vec![
                order("orders_1", json!("customers_1"), 5),
                order("orders_2", json!("customers_1"), 7),
                order("orders_3", Value::Null, 1),
            ],
        );
        (customers, orders)
    }

    fn join_request() -> ReportRequest {
        ReportRequest::new(["customers", "orders"])
            .with_join(JoinSpec::new("customers", "generated_id", "orders", "customer"))
            .with_columns("customers", ["name"])
            .with_columns("orders", ["generated_id", "total"])
    }

    #[test]
    fn test_join_keeps_every_child_row() {
        let (customers, orders) = customers_orders();
        let set: TableSet<'_> = [&customers, &orders].into_iter().collect();
        let result = ReportQueryEngine::default()
            .execute(&join_request(), &set)
            .unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!(result.headers, vec!["name", "generated_id", "total"]);
        assert_eq!(result.rows[0]["name"], json!("Ann"));
        assert_eq!(result.rows[1]["name"], json!("Ann"));
        assert_eq!(result.rows[2]["name"], Value::Null);
        // Child wins on the shared generated_id column
        assert_eq!(result.rows[0]["generated_id"], json!("orders_1"));
    }

    #[test]
    fn test_parent_wins_precedence() {
        let (customers, orders) = customers_orders();
        let set: TableSet<'_> = [&customers, &orders].into_iter().collect();
        let engine = ReportQueryEngine::new(
            ReportConfig::new().with_merge_precedence(MergePrecedence::ParentWins),
        );
        let result = engine.execute(&join_request(), &set).unwrap();
        assert_eq!(result.rows[0]["generated_id"], json!("customers_1"));
        // Unmatched rows keep their own fields
        assert_eq!(result.rows[2]["generated_id"], json!("orders_3"));
    }

    #[test]
    fn test_request_errors() {
        let (customers, orders) = customers_orders();
        let set: TableSet<'_> = [&customers, &orders].into_iter().collect();
        let engine = ReportQueryEngine::default();

        let no_join = ReportRequest::new(["customers", "orders"]);
        assert!(matches!(
            engine.execute(&no_join, &set),
            Err(QueryError::MissingJoin(_))
        ));

        let unknown = ReportRequest::new(["missing"]);
        assert_eq!(
            engine.execute(&unknown, &set),
            Err(QueryError::UnknownTable("missing".to_string()))
        );

        let three = ReportRequest::new(["customers", "orders", "x"]);
        assert_eq!(engine.execute(&three, &set), Err(QueryError::TooManyTables(3)));

        let wrong_join = ReportRequest::new(["customers", "orders"])
            .with_join(JoinSpec::new("products", "generated_id", "orders", "product"));
        assert_eq!(
            engine.execute(&wrong_join, &set),
            Err(QueryError::JoinTableNotRequested("products".to_string()))
        );

        assert_eq!(
            engine.execute(&ReportRequest::default(), &set),
            Err(QueryError::NoTables)
        );
    }

    #[test]
    fn test_chart_needs_two_headers() {
        let sales = sales();
        let request = ReportRequest::new(["sales"]).with_columns("sales", ["region"]);
        let result = ReportQueryEngine::default()
            .execute(&request, &TableSet::new().with_table(&sales))
            .unwrap();
        assert_eq!(result.len(), 3);
        assert!(result.chart.labels.is_empty());
        assert!(result.chart.values.is_empty());
    }
}
