//! Schema plan model
//!
//! A [`SchemaPlan`] describes the normalized tables that a flat dataset is split
//! into. The wire format is the JSON produced by the schema-proposal
//! collaborator:
//!
//! ```json
//! {"schema": {"products": {
//!     "columns": ["Product", "Supplier", "generated_id"],
//!     "primary_key": "generated_id",
//!     "natural_key_for_uniqueness": ["Product"],
//!     "foreign_keys": {"Supplier": "suppliers.generated_id"}
//! }}}
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::validation::{SchemaPlanError, validate_plan};

/// Name of the surrogate key column the schema architect synthesizes
pub const DEFAULT_SURROGATE_COLUMN: &str = "generated_id";

/// Reference from a local column to a column of a parent table
///
/// The child stores the parent's generated id, except when `parent_column`
/// is part of the parent's natural key; then the child stores that value.
/// Parent columns outside both keys still resolve to the generated id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ForeignKeyRepr", into = "String")]
pub struct ForeignKeyRef {
    pub parent_table: String,
    pub parent_column: String,
}

impl ForeignKeyRef {
    pub fn new(parent_table: impl Into<String>, parent_column: impl Into<String>) -> Self {
        Self {
            parent_table: parent_table.into(),
            parent_column: parent_column.into(),
        }
    }
}

impl std::fmt::Display for ForeignKeyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.parent_table, self.parent_column)
    }
}

impl From<ForeignKeyRef> for String {
    fn from(fk: ForeignKeyRef) -> Self {
        fk.to_string()
    }
}

/// Accepted spellings of a foreign key: `"parent.column"` or an object
#[derive(Deserialize)]
#[serde(untagged)]
enum ForeignKeyRepr {
    Dotted(String),
    Object {
        #[serde(alias = "parent_table")]
        table: String,
        #[serde(alias = "parent_column", default)]
        column: Option<String>,
    },
}

impl TryFrom<ForeignKeyRepr> for ForeignKeyRef {
    type Error = String;

    fn try_from(repr: ForeignKeyRepr) -> Result<Self, Self::Error> {
        let (table, column) = match repr {
            ForeignKeyRepr::Dotted(text) => match text.split_once('.') {
                Some((table, column)) => (table.to_string(), Some(column.to_string())),
                None => (text, None),
            },
            ForeignKeyRepr::Object { table, column } => (table, column),
        };
        let table = table.trim().to_string();
        if table.is_empty() {
            return Err("foreign key must name a parent table".to_string());
        }
        let column = column
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_SURROGATE_COLUMN.to_string());
        Ok(Self::new(table, column))
    }
}

/// Primary key of a table
///
/// Usually a single synthesized column; junction tables may use the combined
/// foreign keys instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Column(String),
    Composite(Vec<String>),
}

impl PrimaryKey {
    /// All columns that make up the key
    pub fn columns(&self) -> Vec<&str> {
        match self {
            PrimaryKey::Column(c) => vec![c.as_str()],
            PrimaryKey::Composite(cols) => cols.iter().map(String::as_str).collect(),
        }
    }

    /// The key column when the key is a single column
    pub fn single(&self) -> Option<&str> {
        match self {
            PrimaryKey::Column(c) => Some(c),
            PrimaryKey::Composite(cols) if cols.len() == 1 => cols.first().map(String::as_str),
            PrimaryKey::Composite(_) => None,
        }
    }
}

impl Default for PrimaryKey {
    fn default() -> Self {
        PrimaryKey::Column(DEFAULT_SURROGATE_COLUMN.to_string())
    }
}

/// Definition of one normalized table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name; filled from the key of the enclosing plan
    #[serde(skip)]
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub primary_key: PrimaryKey,
    #[serde(rename = "natural_key_for_uniqueness", alias = "natural_key")]
    pub natural_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: IndexMap<String, ForeignKeyRef>,
}

impl TableSchema {
    /// Create an empty table definition with a `generated_id` primary key
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: PrimaryKey::default(),
            natural_key: Vec::new(),
            foreign_keys: IndexMap::new(),
        }
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = PrimaryKey::Column(column.into());
        self
    }

    pub fn with_composite_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = PrimaryKey::Composite(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_natural_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.natural_key = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_foreign_key(
        mut self,
        local_column: impl Into<String>,
        parent_table: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        self.foreign_keys.insert(
            local_column.into(),
            ForeignKeyRef::new(parent_table, parent_column),
        );
        self
    }

    /// A root table references no other table
    pub fn is_root(&self) -> bool {
        self.foreign_keys.is_empty()
    }

    /// Whether the table declares a column
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Column that receives the generated surrogate id, if any
    ///
    /// This is the primary key when it is a single column that does not carry
    /// business data (i.e. is not part of the natural key).
    pub fn surrogate_column(&self) -> Option<&str> {
        self.primary_key
            .single()
            .filter(|pk| !self.natural_key.iter().any(|f| f == pk))
    }

    /// Names of the parent tables, in foreign key declaration order
    pub fn parent_tables(&self) -> Vec<&str> {
        let mut parents: Vec<&str> = Vec::new();
        for fk in self.foreign_keys.values() {
            if !parents.contains(&fk.parent_table.as_str()) {
                parents.push(&fk.parent_table);
            }
        }
        parents
    }
}

/// Mapping from table name to table definition, in plan order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PlanRepr", into = "PlanRepr")]
pub struct SchemaPlan {
    tables: IndexMap<String, TableSchema>,
}

#[derive(Clone, Serialize, Deserialize)]
struct PlanRepr {
    #[serde(default)]
    schema: IndexMap<String, TableSchema>,
}

impl From<PlanRepr> for SchemaPlan {
    fn from(repr: PlanRepr) -> Self {
        let mut plan = SchemaPlan::new();
        for (name, mut table) in repr.schema {
            table.name = name;
            plan.insert(table);
        }
        plan
    }
}

impl From<SchemaPlan> for PlanRepr {
    fn from(plan: SchemaPlan) -> Self {
        PlanRepr {
            schema: plan.tables,
        }
    }
}

/// Collaborator payload, where the `schema` key is mandatory
#[derive(Deserialize)]
struct PlanEnvelope {
    schema: Option<IndexMap<String, TableSchema>>,
}

impl PlanEnvelope {
    fn into_plan(self) -> Result<SchemaPlan, SchemaPlanError> {
        let schema = self.schema.ok_or_else(|| {
            SchemaPlanError::Invalid("'schema' property is missing from the plan".to_string())
        })?;
        Ok(PlanRepr { schema }.into())
    }
}

impl SchemaPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a plan from collaborator JSON (`{"schema": {...}}`)
    ///
    /// Tables and foreign keys keep the order they are declared in.
    pub fn from_json(json: &str) -> Result<Self, SchemaPlanError> {
        let envelope: PlanEnvelope =
            serde_json::from_str(json).map_err(|e| SchemaPlanError::Invalid(e.to_string()))?;
        envelope.into_plan()
    }

    /// Parse a plan from an already decoded JSON value
    pub fn from_value(value: serde_json::Value) -> Result<Self, SchemaPlanError> {
        let envelope: PlanEnvelope =
            serde_json::from_value(value).map_err(|e| SchemaPlanError::Invalid(e.to_string()))?;
        envelope.into_plan()
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn with_table(mut self, table: TableSchema) -> Self {
        self.insert(table);
        self
    }

    /// Insert or replace a table, keeping its original position when replaced
    pub fn insert(&mut self, table: TableSchema) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn get(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Index of a table in plan order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.tables.get_index_of(name)
    }

    /// Merge another plan into this one; tables in `other` replace same-named ones
    pub fn merge(&mut self, other: SchemaPlan) {
        for (_, table) in other.tables {
            self.insert(table);
        }
    }

    /// Check the plan invariants (column membership, parent existence, acyclicity)
    pub fn validate(&self) -> Result<(), SchemaPlanError> {
        validate_plan(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARCHITECT_EXAMPLE: &str = r#"{"schema":{"suppliers":{"columns":["Supplier","City","generated_id"],"primary_key":"generated_id","natural_key_for_uniqueness":["Supplier"],"foreign_keys":{}},"products":{"columns":["Product","Supplier","Price","generated_id"],"primary_key":"generated_id","natural_key_for_uniqueness":["Product"],"foreign_keys":{"Supplier":"suppliers.generated_id"}}}}"#;

    #[test]
    fn test_parse_architect_output() {
        let plan = SchemaPlan::from_json(ARCHITECT_EXAMPLE).unwrap();
        assert_eq!(plan.table_names(), vec!["suppliers", "products"]);

        let products = plan.get("products").unwrap();
        assert_eq!(products.name, "products");
        assert_eq!(products.natural_key, vec!["Product"]);
        assert_eq!(
            products.foreign_keys.get("Supplier"),
            Some(&ForeignKeyRef::new("suppliers", "generated_id"))
        );
        assert!(plan.get("suppliers").unwrap().is_root());
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_serialize_roundtrip_keeps_wire_format() {
        let plan = SchemaPlan::from_json(ARCHITECT_EXAMPLE).unwrap();
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(
            json["schema"]["products"]["foreign_keys"]["Supplier"],
            "suppliers.generated_id"
        );
        let back: SchemaPlan = serde_json::from_value(json).unwrap();
        assert_eq!(back, plan);
    }

    #[test]
    fn test_foreign_key_object_form_and_default_column() {
        let json = r#"{"schema":{"orders":{"columns":["Customer","generated_id"],
            "natural_key":["Customer"],
            "foreign_keys":{"Customer":{"table":"customers"}}}}}"#;
        let plan = SchemaPlan::from_json(json).unwrap();
        let fk = &plan.get("orders").unwrap().foreign_keys["Customer"];
        assert_eq!(fk.parent_table, "customers");
        assert_eq!(fk.parent_column, DEFAULT_SURROGATE_COLUMN);
    }

    #[test]
    fn test_composite_primary_key() {
        let json = r#"{"schema":{"order_items":{"columns":["order_id","product_id","Qty"],
            "primary_key":["order_id","product_id"],
            "natural_key_for_uniqueness":["order_id","product_id"],
            "foreign_keys":{}}}}"#;
        let plan = SchemaPlan::from_json(json).unwrap();
        let table = plan.get("order_items").unwrap();
        assert_eq!(table.primary_key.columns(), vec!["order_id", "product_id"]);
        assert_eq!(table.surrogate_column(), None);
    }

    #[test]
    fn test_surrogate_column_skips_business_keys() {
        let table = TableSchema::new("users")
            .with_columns(["email", "name"])
            .with_primary_key("email")
            .with_natural_key(["email"]);
        assert_eq!(table.surrogate_column(), None);

        let table = TableSchema::new("users")
            .with_columns(["email", "generated_id"])
            .with_natural_key(["email"]);
        assert_eq!(table.surrogate_column(), Some("generated_id"));
    }

    #[test]
    fn test_decoded_value_keeps_table_order() {
        let value = serde_json::json!({"schema": {
            "zeta": {"columns": ["Z"], "natural_key_for_uniqueness": ["Z"]},
            "alpha": {"columns": ["A"], "natural_key_for_uniqueness": ["A"]},
        }});
        let plan = SchemaPlan::from_value(value).unwrap();
        assert_eq!(plan.table_names(), vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_missing_schema_property() {
        let err = SchemaPlan::from_value(serde_json::json!({"tables": {}})).unwrap_err();
        assert!(matches!(err, SchemaPlanError::Invalid(_)));
        let err = SchemaPlan::from_json(r#"{"tables": {}}"#).unwrap_err();
        assert!(matches!(err, SchemaPlanError::Invalid(_)));
    }

    #[test]
    fn test_merge_replaces_and_appends() {
        let mut plan = SchemaPlan::new()
            .with_table(TableSchema::new("a").with_columns(["x"]))
            .with_table(TableSchema::new("b").with_columns(["y"]));
        let other = SchemaPlan::new()
            .with_table(TableSchema::new("b").with_columns(["z"]))
            .with_table(TableSchema::new("c"));
        plan.merge(other);
        assert_eq!(plan.table_names(), vec!["a", "b", "c"]);
        assert_eq!(plan.get("b").unwrap().columns, vec!["z"]);
    }
}
