//! Prompt templates for the schema architect, report analyst and summarizer

use serde::de::DeserializeOwned;

use crate::models::{DEFAULT_SURROGATE_COLUMN, Row, SchemaPlan};

/// Prompt asking for a normalized schema plan over flat headers
pub const ARCHITECT_PROMPT_TEMPLATE: &str = r#"You are a database architect. Design a normalized relational schema for a flat dataset with these columns:

{headers}

## Rules
1. Group the columns into logical entities. Table names are plural snake_case.
2. Use the input column names exactly as given. Every input column belongs to at least one table.
3. For every table give "natural_key_for_uniqueness": the list of columns that identify one business record. Rows with the same natural key are the same record.
4. For every table give "primary_key". Normally this is a new surrogate column named exactly "{surrogate}", which must also appear in "columns". Pure junction tables may use their combined foreign keys instead.
5. Give "foreign_keys" as an object mapping a column of the table to "parent_table.{surrogate}".
6. Foreign keys must form a hierarchy: no table may reference itself, directly or indirectly.

## Output
Return ONLY a single minified JSON object with one root key "schema". Each table maps to an object with the keys "columns", "primary_key", "natural_key_for_uniqueness" and "foreign_keys".

Example:
{"schema":{"suppliers":{"columns":["Supplier","City","{surrogate}"],"primary_key":"{surrogate}","natural_key_for_uniqueness":["Supplier"],"foreign_keys":{}},"products":{"columns":["Product","Supplier","Price","{surrogate}"],"primary_key":"{surrogate}","natural_key_for_uniqueness":["Product"],"foreign_keys":{"Supplier":"suppliers.{surrogate}"}}}}"#;

/// Prompt asking for report suggestions over a stored schema plan
pub const ANALYST_PROMPT_TEMPLATE: &str = r#"You are a business intelligence analyst. Propose 3 to 5 useful reports over this database schema:

```json
{schema}
```

## Rules
1. Each report has a "title", a short "description", a "query" object and a "chart_config" object whose "type" is a chart kind such as "bar", "line" or "pie".
2. "query.tables" lists one or two tables. "query.columns" maps each table to the columns to show.
3. When two tables are used, "query.join" names "parent_table", "parent_key", "child_table" and "child_key" exactly as in the schema.
4. When the report aggregates, "query.aggregation" gives "groupBy", "column", "method" (SUM, COUNT or AVG) and "newColumnName".

## Output
Return ONLY a minified JSON array of report objects.

Example:
[{"title":"Total Quantity per Product","description":"Sum of ordered quantities for each product.","query":{"tables":["products","order_items"],"columns":{"products":["ProductName"],"order_items":["Quantity"]},"join":{"child_table":"order_items","child_key":"product_id","parent_table":"products","parent_key":"{surrogate}"},"aggregation":{"groupBy":"ProductName","column":"Quantity","method":"SUM","newColumnName":"Total Quantity"}},"chart_config":{"type":"bar"}}]"#;

/// Prompt asking for a one-paragraph narrative over report rows
pub const SUMMARY_PROMPT_TEMPLATE: &str = r#"You summarize data reports.

Title: "{title}"
Description: "{description}"

Sample of the report rows:
```json
{rows}
```

Write one short paragraph describing the key findings and trends in this data. Return plain text only."#;

/// Build the schema architect prompt
pub fn architect_prompt(headers: &[String]) -> String {
    ARCHITECT_PROMPT_TEMPLATE
        .replace("{headers}", &headers.join(", "))
        .replace("{surrogate}", DEFAULT_SURROGATE_COLUMN)
}

/// Build the report analyst prompt
pub fn analyst_prompt(plan: &SchemaPlan) -> String {
    let schema = serde_json::to_string_pretty(plan).unwrap_or_else(|_| "{}".to_string());
    ANALYST_PROMPT_TEMPLATE
        .replace("{surrogate}", DEFAULT_SURROGATE_COLUMN)
        .replace("{schema}", &schema)
}

/// Build the summarizer prompt; `rows` should already be capped by the caller
pub fn summary_prompt(title: &str, description: &str, rows: &[Row]) -> String {
    let rows = serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string());
    SUMMARY_PROMPT_TEMPLATE
        .replace("{title}", title)
        .replace("{description}", description)
        .replace("{rows}", &rows)
}

/// Decode the JSON payload of a model response straight into `T`
pub fn parse_json_response<T: DeserializeOwned>(response: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(&extract_json(response))
}

/// Extract JSON from a model response that may wrap it in markdown or prose
pub fn extract_json(response: &str) -> String {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let content_start = start + 7;
        if let Some(end) = trimmed[content_start..].find("```") {
            return trimmed[content_start..content_start + end]
                .trim()
                .to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let content_start = start + 3;
        // Skip language identifier if present
        let content_start = trimmed[content_start..]
            .find('\n')
            .map(|n| content_start + n + 1)
            .unwrap_or(content_start);
        if let Some(end) = trimmed[content_start..].find("```") {
            return trimmed[content_start..content_start + end]
                .trim()
                .to_string();
        }
    }

    // Whichever bracket opens first decides between an object and an array
    let object = trimmed.find('{');
    let array = trimmed.find('[');
    let (open, close) = match (object, array) {
        (Some(o), Some(a)) if a < o => ('[', ']'),
        (None, Some(_)) => ('[', ']'),
        _ => ('{', '}'),
    };
    if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
        if end > start {
            return trimmed[start..=end].to_string();
        }
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TableSchema, row};
    use serde_json::{Value, json};

    #[test]
    fn test_architect_prompt_lists_headers() {
        let prompt = architect_prompt(&["Product".to_string(), "Supplier".to_string()]);
        assert!(prompt.contains("Product, Supplier"));
        assert!(prompt.contains("\"primary_key\":\"generated_id\""));
        assert!(!prompt.contains("{surrogate}"));
    }

    #[test]
    fn test_analyst_prompt_embeds_plan() {
        let plan = SchemaPlan::new().with_table(
            TableSchema::new("customers")
                .with_columns(["Customer", "generated_id"])
                .with_primary_key("generated_id")
                .with_natural_key(["Customer"]),
        );
        let prompt = analyst_prompt(&plan);
        assert!(prompt.contains("\"customers\""));
        assert!(prompt.contains("\"natural_key_for_uniqueness\""));
    }

    #[test]
    fn test_summary_prompt() {
        let prompt = summary_prompt("Sales", "By region", &[row([("Region", json!("North"))])]);
        assert!(prompt.contains("Title: \"Sales\""));
        assert!(prompt.contains("\"Region\": \"North\""));
    }

    #[test]
    fn test_extract_json_code_block() {
        let response = "Here is the schema:\n```json\n{\"schema\": {}}\n```\nDone";
        assert_eq!(extract_json(response), "{\"schema\": {}}");

        let response = "```\n[1, 2]\n```";
        assert_eq!(extract_json(response), "[1, 2]");
    }

    #[test]
    fn test_extract_json_bare() {
        assert_eq!(
            extract_json("Sure! {\"schema\": {\"a\": {}}} hope it helps"),
            "{\"schema\": {\"a\": {}}}"
        );
        assert_eq!(
            extract_json("Reports: [{\"title\": \"x\"}]"),
            "[{\"title\": \"x\"}]"
        );
        assert_eq!(extract_json("  plain text  "), "plain text");
    }

    #[test]
    fn test_parse_json_response() {
        let value: Value = parse_json_response("```json\n{\"a\": 1}\n```").unwrap();
        assert_eq!(value, json!({"a": 1}));
        assert!(parse_json_response::<Value>("not json").is_err());
    }
}
