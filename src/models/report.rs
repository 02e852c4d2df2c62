//! Report request model
//!
//! A [`ReportRequest`] is the declarative description of a report: which tables
//! to read, how to join them, which columns to keep, and an optional group-by
//! aggregation. [`ReportSuggestion`] wraps a request with the title and
//! description proposed by the report-suggestion collaborator.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Equi-join between one parent and one child table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSpec {
    #[serde(alias = "parentTable")]
    pub parent_table: String,
    #[serde(alias = "parentKey")]
    pub parent_key: String,
    #[serde(alias = "childTable")]
    pub child_table: String,
    #[serde(alias = "childKey")]
    pub child_key: String,
}

impl JoinSpec {
    pub fn new(
        parent_table: impl Into<String>,
        parent_key: impl Into<String>,
        child_table: impl Into<String>,
        child_key: impl Into<String>,
    ) -> Self {
        Self {
            parent_table: parent_table.into(),
            parent_key: parent_key.into(),
            child_table: child_table.into(),
            child_key: child_key.into(),
        }
    }
}

/// Aggregation function applied per group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AggregationMethod {
    Sum,
    Count,
    Avg,
}

impl AggregationMethod {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::Count => "COUNT",
            Self::Avg => "AVG",
        }
    }
}

impl std::fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for AggregationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SUM" => Ok(Self::Sum),
            "COUNT" => Ok(Self::Count),
            "AVG" | "AVERAGE" | "MEAN" => Ok(Self::Avg),
            other => Err(format!("Unknown aggregation method: {other}")),
        }
    }
}

impl TryFrom<String> for AggregationMethod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AggregationMethod> for String {
    fn from(method: AggregationMethod) -> Self {
        method.name().to_string()
    }
}

/// Group-by aggregation over the joined rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    #[serde(rename = "groupBy", alias = "group_by")]
    pub group_by: String,
    pub column: String,
    pub method: AggregationMethod,
    #[serde(
        rename = "outputColumn",
        alias = "output_column",
        alias = "newColumnName"
    )]
    pub output_column: String,
}

impl Aggregation {
    pub fn new(
        group_by: impl Into<String>,
        column: impl Into<String>,
        method: AggregationMethod,
        output_column: impl Into<String>,
    ) -> Self {
        Self {
            group_by: group_by.into(),
            column: column.into(),
            method,
            output_column: output_column.into(),
        }
    }
}

/// Kind of chart a report is rendered as
///
/// Unknown kinds are kept verbatim so they round-trip to the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChartKind {
    #[default]
    Bar,
    Line,
    Pie,
    Doughnut,
    Scatter,
    Other(String),
}

impl From<String> for ChartKind {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "" | "bar" => Self::Bar,
            "line" => Self::Line,
            "pie" => Self::Pie,
            "doughnut" => Self::Doughnut,
            "scatter" => Self::Scatter,
            _ => Self::Other(value),
        }
    }
}

impl From<ChartKind> for String {
    fn from(kind: ChartKind) -> Self {
        match kind {
            ChartKind::Bar => "bar".to_string(),
            ChartKind::Line => "line".to_string(),
            ChartKind::Pie => "pie".to_string(),
            ChartKind::Doughnut => "doughnut".to_string(),
            ChartKind::Scatter => "scatter".to_string(),
            ChartKind::Other(other) => other,
        }
    }
}

/// Declarative report query
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportRequest {
    pub tables: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<JoinSpec>,
    #[serde(default)]
    pub columns: IndexMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Aggregation>,
    #[serde(default, alias = "chartKind")]
    pub chart_kind: ChartKind,
}

impl ReportRequest {
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_join(mut self, join: JoinSpec) -> Self {
        self.join = Some(join);
        self
    }

    pub fn with_columns<I, S>(mut self, table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns
            .insert(table.into(), columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    pub fn with_chart_kind(mut self, kind: ChartKind) -> Self {
        self.chart_kind = kind;
        self
    }

    /// Output headers in order: the aggregate pair, or the de-duplicated union
    /// of every requested column
    pub fn expected_headers(&self) -> Vec<String> {
        if let Some(agg) = &self.aggregation {
            let mut headers = vec![agg.group_by.clone()];
            if agg.output_column != agg.group_by {
                headers.push(agg.output_column.clone());
            }
            return headers;
        }
        let mut headers: Vec<String> = Vec::new();
        for column in self.columns.values().flatten() {
            if !headers.contains(column) {
                headers.push(column.clone());
            }
        }
        headers
    }
}

/// A report proposed by the report-suggestion collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SuggestionRepr")]
pub struct ReportSuggestion {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub query: ReportRequest,
    #[serde(default)]
    pub chart_kind: ChartKind,
}

#[derive(Deserialize)]
struct SuggestionRepr {
    title: String,
    #[serde(default)]
    description: String,
    query: ReportRequest,
    #[serde(default, alias = "chartKind")]
    chart_kind: Option<ChartKind>,
    #[serde(default)]
    chart_config: Option<ChartConfigRepr>,
}

#[derive(Deserialize)]
struct ChartConfigRepr {
    #[serde(rename = "type", default)]
    kind: Option<ChartKind>,
}

impl From<SuggestionRepr> for ReportSuggestion {
    fn from(repr: SuggestionRepr) -> Self {
        let chart_kind = repr
            .chart_kind
            .or_else(|| repr.chart_config.and_then(|c| c.kind))
            .unwrap_or_else(|| repr.query.chart_kind.clone());
        Self {
            title: repr.title,
            description: repr.description,
            query: repr.query,
            chart_kind,
        }
    }
}

impl ReportSuggestion {
    /// The executable request, carrying the suggestion's chart kind
    pub fn request(&self) -> ReportRequest {
        ReportRequest {
            chart_kind: self.chart_kind.clone(),
            ..self.query.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANALYST_EXAMPLE: &str = r#"[{"title":"Total Quantity Purchased per Product","description":"Calculates the sum of quantities for each product.","query":{"tables":["products","order_items"],"columns":{"products":["ProductName"],"order_items":["Quantity"]},"join":{"child_table":"order_items","child_key":"product_id","parent_table":"products","parent_key":"generated_id"},"aggregation":{"groupBy":"ProductName","column":"Quantity","method":"SUM","newColumnName":"Total Quantity Purchased"}},"chart_config":{"type":"bar","data":{"labels":[],"datasets":[{"label":"Total Quantity","data":[]}]}}}]"#;

    #[test]
    fn test_parse_analyst_output() {
        let suggestions: Vec<ReportSuggestion> = serde_json::from_str(ANALYST_EXAMPLE).unwrap();
        assert_eq!(suggestions.len(), 1);
        let s = &suggestions[0];
        assert_eq!(s.chart_kind, ChartKind::Bar);

        let request = s.request();
        assert_eq!(request.tables, vec!["products", "order_items"]);
        let join = request.join.as_ref().unwrap();
        assert_eq!(join.parent_key, "generated_id");
        let agg = request.aggregation.as_ref().unwrap();
        assert_eq!(agg.method, AggregationMethod::Sum);
        assert_eq!(agg.output_column, "Total Quantity Purchased");
        assert_eq!(
            request.expected_headers(),
            vec!["ProductName", "Total Quantity Purchased"]
        );
    }

    #[test]
    fn test_method_is_case_insensitive() {
        let agg: Aggregation = serde_json::from_str(
            r#"{"groupBy":"g","column":"v","method":"avg","outputColumn":"out"}"#,
        )
        .unwrap();
        assert_eq!(agg.method, AggregationMethod::Avg);
        assert!("MEDIAN".parse::<AggregationMethod>().is_err());
    }

    #[test]
    fn test_expected_headers_union_dedup() {
        let request = ReportRequest::new(["a", "b"])
            .with_columns("a", ["id", "name"])
            .with_columns("b", ["name", "qty"]);
        assert_eq!(request.expected_headers(), vec!["id", "name", "qty"]);
    }

    #[test]
    fn test_chart_kind_unknown_roundtrip() {
        let kind: ChartKind = serde_json::from_str(r#""polarArea""#).unwrap();
        assert_eq!(kind, ChartKind::Other("polarArea".to_string()));
        assert_eq!(serde_json::to_string(&kind).unwrap(), r#""polarArea""#);
    }
}
