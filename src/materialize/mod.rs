//! Table materialization
//!
//! Turns the flat input rows into one normalized table per [`TableSchema`]:
//!
//! 1. Foreign keys are populated by looking up each parent's natural key in
//!    the parent's [`LookupMap`]. A reference to a natural key column keeps
//!    its business value; other references store the parent's id.
//!    Unresolvable references become null.
//! 2. Rows are deduplicated by natural key, first occurrence wins.
//! 3. Each unique row gets a surrogate id `<table>_<n>`, recorded in the
//!    table's lookup map.
//! 4. Rows are projected onto exactly the declared columns.
//!
//! The same procedure applies to root and child tables; a root table simply
//! has no foreign keys to populate.

pub mod lookup;
pub mod natural_key;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{MaterializedTable, Row, SchemaPlan, TableSchema, conform};
use crate::ordering::resolve_order;
use crate::validation::SchemaPlanError;

pub use lookup::{LookupMap, LookupRegistry};
pub use natural_key::KeyEncoding;

/// Unresolved foreign key warnings logged per table before going quiet
const MAX_FK_WARNINGS: usize = 5;

/// Errors that stop a table from being materialized
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MaterializeError {
    #[error("Table '{0}' has an empty natural key")]
    EmptyNaturalKey(String),

    #[error("Table '{table}' references '{parent}', which is not in the schema plan")]
    UnknownParent { table: String, parent: String },

    #[error(transparent)]
    Plan(#[from] SchemaPlanError),
}

/// Counters describing one materialization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializeStats {
    pub table: String,
    /// Rows handed to the materializer
    pub input_rows: usize,
    /// Rows emitted, each with a new surrogate id
    pub unique_rows: usize,
    /// Rows dropped because an earlier row had the same natural key
    pub duplicates_dropped: usize,
    /// Rows dropped because their natural key was already stored
    pub already_stored: usize,
    /// Foreign key values set to null because the parent row was not found
    pub unresolved_foreign_keys: usize,
}

/// A materialized table with its statistics
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedOutput {
    pub table: MaterializedTable,
    pub stats: MaterializeStats,
}

/// Materializes tables against a shared [`LookupRegistry`]
#[derive(Debug, Clone, Default)]
pub struct TableMaterializer {
    encoding: KeyEncoding,
}

impl TableMaterializer {
    pub fn new(encoding: KeyEncoding) -> Self {
        Self { encoding }
    }

    pub fn encoding(&self) -> KeyEncoding {
        self.encoding
    }

    /// Materialize one table from the full input rows
    ///
    /// Every parent of `schema` should already have a map in `registry`; a
    /// missing map makes each reference to it unresolved. The table's own map
    /// is extended when present (append mode) and registered afterwards.
    pub fn materialize(
        &self,
        schema: &TableSchema,
        rows: &[Row],
        registry: &mut LookupRegistry,
        plan: &SchemaPlan,
    ) -> Result<MaterializedOutput, MaterializeError> {
        if schema.natural_key.is_empty() {
            return Err(MaterializeError::EmptyNaturalKey(schema.name.clone()));
        }

        let mut parents = Vec::with_capacity(schema.foreign_keys.len());
        for (local, fk) in &schema.foreign_keys {
            let parent = plan
                .get(&fk.parent_table)
                .ok_or_else(|| MaterializeError::UnknownParent {
                    table: schema.name.clone(),
                    parent: fk.parent_table.clone(),
                })?;
            parents.push((local.as_str(), fk.parent_column.as_str(), parent));
        }

        let surrogate = schema.surrogate_column();
        let mut map = registry.take_or_new(&schema.name);
        let mut seen: HashSet<String> = HashSet::new();
        let mut output = MaterializedTable::empty(schema);
        let mut stats = MaterializeStats {
            table: schema.name.clone(),
            input_rows: rows.len(),
            ..MaterializeStats::default()
        };

        for row in rows {
            let mut enriched = row.clone();

            // Later foreign keys see the ids written by earlier ones
            for (local, parent_column, parent) in &parents {
                let key = self.encoding.encode(&enriched, &parent.natural_key);
                let resolved = registry
                    .get(&parent.name)
                    .and_then(|m| m.get(&key))
                    .map(|id| reference_value(parent, parent_column, &enriched, id));
                match resolved {
                    Some(id) => {
                        enriched.insert(local.to_string(), id);
                    }
                    None => {
                        stats.unresolved_foreign_keys += 1;
                        if stats.unresolved_foreign_keys <= MAX_FK_WARNINGS {
                            warn!(
                                table = %schema.name,
                                column = %local,
                                parent = %parent.name,
                                "Foreign key not resolved, storing null"
                            );
                        }
                        enriched.insert(local.to_string(), Value::Null);
                    }
                }
            }

            let key = self.encoding.encode(&enriched, &schema.natural_key);
            if !seen.insert(key.clone()) {
                stats.duplicates_dropped += 1;
                continue;
            }
            if map.contains(&key) {
                stats.already_stored += 1;
                continue;
            }

            let id = map.assign(key);
            if let Some(column) = surrogate {
                enriched.insert(column.to_string(), Value::String(id));
            }
            output.rows.push(conform(&enriched, &schema.columns));
        }

        if stats.unresolved_foreign_keys > MAX_FK_WARNINGS {
            warn!(
                table = %schema.name,
                unresolved = stats.unresolved_foreign_keys,
                "Further unresolved foreign keys were not logged individually"
            );
        }

        stats.unique_rows = output.rows.len();
        debug!(
            table = %schema.name,
            input = stats.input_rows,
            unique = stats.unique_rows,
            duplicates = stats.duplicates_dropped,
            "Materialized table"
        );

        registry.insert(map);
        Ok(MaterializedOutput {
            table: output,
            stats,
        })
    }

    /// Materialize every table of a plan in dependency order with a fresh registry
    pub fn materialize_all(
        &self,
        plan: &SchemaPlan,
        rows: &[Row],
    ) -> Result<Vec<MaterializedOutput>, MaterializeError> {
        let mut registry = LookupRegistry::new();
        resolve_order(plan)?
            .iter()
            .filter_map(|name| plan.get(name))
            .map(|schema| self.materialize(schema, rows, &mut registry, plan))
            .collect()
    }
}

/// Value a child stores for a resolved reference to `parent`
///
/// A parent column that belongs to the parent's natural key is read from the
/// row itself; any other column receives the parent's lookup id.
fn reference_value(parent: &TableSchema, parent_column: &str, row: &Row, id: &str) -> Value {
    let is_business_key = parent.surrogate_column() != Some(parent_column)
        && parent.natural_key.iter().any(|f| f == parent_column);
    match row.get(parent_column) {
        Some(value) if is_business_key => value.clone(),
        _ => Value::String(id.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::row;
    use serde_json::json;

    fn suppliers() -> TableSchema {
        TableSchema::new("suppliers")
            .with_columns(["Supplier", "generated_id"])
            .with_natural_key(["Supplier"])
    }

    fn products() -> TableSchema {
        TableSchema::new("products")
            .with_columns(["Product", "Price", "Supplier", "generated_id"])
            .with_natural_key(["Product"])
            .with_foreign_key("Supplier", "suppliers", "generated_id")
    }

    fn plan() -> SchemaPlan {
        SchemaPlan::new()
            .with_table(products())
            .with_table(suppliers())
    }

    fn sale(product: &str, price: i64, supplier: &str) -> Row {
        row([
            ("Product", json!(product)),
            ("Price", json!(price)),
            ("Supplier", json!(supplier)),
        ])
    }

    fn input() -> Vec<Row> {
        vec![
            sale("A", 10, "S1"),
            sale("B", 20, "S2"),
            sale("A", 99, "S1"),
        ]
    }

    #[test]
    fn test_first_occurrence_wins() {
        let schema = TableSchema::new("products")
            .with_columns(["Product", "Price", "generated_id"])
            .with_natural_key(["Product"]);
        let plan = SchemaPlan::new().with_table(schema.clone());
        let mut registry = LookupRegistry::new();

        let out = TableMaterializer::default()
            .materialize(&schema, &input(), &mut registry, &plan)
            .unwrap();

        assert_eq!(
            out.table.rows,
            vec![
                row([
                    ("Product", json!("A")),
                    ("Price", json!(10)),
                    ("generated_id", json!("products_1")),
                ]),
                row([
                    ("Product", json!("B")),
                    ("Price", json!(20)),
                    ("generated_id", json!("products_2")),
                ]),
            ]
        );
        assert_eq!(out.stats.duplicates_dropped, 1);
        assert_eq!(registry.get("products").unwrap().len(), 2);
    }

    #[test]
    fn test_child_foreign_keys_resolved() {
        let outputs = TableMaterializer::default()
            .materialize_all(&plan(), &input())
            .unwrap();
        assert_eq!(outputs[0].table.name, "suppliers");
        assert_eq!(outputs[0].table.len(), 2);

        let products = &outputs[1].table;
        assert_eq!(products.rows[0]["Supplier"], json!("suppliers_1"));
        assert_eq!(products.rows[1]["Supplier"], json!("suppliers_2"));
        assert_eq!(outputs[1].stats.unresolved_foreign_keys, 0);
    }

    #[test]
    fn test_unresolved_foreign_key_becomes_null() {
        let plan = plan();
        let materializer = TableMaterializer::default();
        let mut registry = LookupRegistry::new();

        // Parent only knows S1
        materializer
            .materialize(&suppliers(), &input()[..1], &mut registry, &plan)
            .unwrap();
        let out = materializer
            .materialize(&products(), &input(), &mut registry, &plan)
            .unwrap();

        assert_eq!(out.table.len(), 2);
        assert_eq!(out.table.rows[0]["Supplier"], json!("suppliers_1"));
        assert_eq!(out.table.rows[1]["Supplier"], Value::Null);
        assert_eq!(out.stats.unresolved_foreign_keys, 1);
    }

    #[test]
    fn test_missing_parent_map_keeps_rows() {
        let plan = plan();
        let mut registry = LookupRegistry::new();
        let out = TableMaterializer::default()
            .materialize(&products(), &input(), &mut registry, &plan)
            .unwrap();
        assert_eq!(out.table.len(), 2);
        assert!(out.table.rows.iter().all(|r| r["Supplier"].is_null()));
    }

    #[test]
    fn test_rows_have_exactly_declared_columns() {
        let outputs = TableMaterializer::default()
            .materialize_all(&plan(), &input())
            .unwrap();
        for output in &outputs {
            for r in &output.table.rows {
                let keys: Vec<_> = r.keys().cloned().collect();
                assert_eq!(keys, output.table.columns);
            }
        }
    }

    #[test]
    fn test_idempotent_for_same_input() {
        for encoding in [KeyEncoding::Canonical, KeyEncoding::Delimited] {
            let materializer = TableMaterializer::new(encoding);
            let first = materializer.materialize_all(&plan(), &input()).unwrap();
            let second = materializer.materialize_all(&plan(), &input()).unwrap();
            assert_eq!(first, second, "{encoding:?}");
            assert_eq!(first[0].table.len(), 2);
            assert_eq!(first[1].table.len(), 2);
        }
    }

    #[test]
    fn test_reference_to_business_key_uses_its_value() {
        let users = TableSchema::new("users")
            .with_columns(["email", "name"])
            .with_primary_key("email")
            .with_natural_key(["email"]);
        let logins = TableSchema::new("logins")
            .with_columns(["at", "email", "generated_id"])
            .with_natural_key(["at", "email"])
            .with_foreign_key("email", "users", "email");
        let plan = SchemaPlan::new().with_table(users).with_table(logins);
        let rows = vec![
            row([("email", json!("a@x")), ("name", json!("A")), ("at", json!(1))]),
            row([("email", json!("b@x")), ("name", json!("B")), ("at", json!(2))]),
        ];

        let outputs = TableMaterializer::default()
            .materialize_all(&plan, &rows)
            .unwrap();
        let logins = &outputs[1];
        assert_eq!(logins.table.rows[0]["email"], json!("a@x"));
        assert_eq!(logins.table.rows[1]["email"], json!("b@x"));
        assert_eq!(logins.stats.unresolved_foreign_keys, 0);
    }

    #[test]
    fn test_existing_map_continues_ids() {
        let schema = suppliers();
        let plan = SchemaPlan::new().with_table(schema.clone());
        let stored = vec![row([
            ("Supplier", json!("S1")),
            ("generated_id", json!("suppliers_1")),
        ])];
        let encoding = KeyEncoding::Canonical;
        let mut registry = LookupRegistry::new();
        registry.insert(LookupMap::rebuild_from_rows(&schema, &stored, encoding));

        let out = TableMaterializer::new(encoding)
            .materialize(&schema, &input(), &mut registry, &plan)
            .unwrap();

        assert_eq!(out.table.len(), 1);
        assert_eq!(out.table.rows[0]["generated_id"], json!("suppliers_2"));
        assert_eq!(out.stats.already_stored, 1);
        assert_eq!(out.stats.duplicates_dropped, 1);
    }

    #[test]
    fn test_business_primary_key_keeps_its_value() {
        let schema = TableSchema::new("users")
            .with_columns(["email", "name"])
            .with_primary_key("email")
            .with_natural_key(["email"]);
        let plan = SchemaPlan::new().with_table(schema.clone());
        let rows = vec![row([("email", json!("a@x")), ("name", json!("A"))])];
        let mut registry = LookupRegistry::new();

        let out = TableMaterializer::default()
            .materialize(&schema, &rows, &mut registry, &plan)
            .unwrap();
        assert_eq!(out.table.rows[0]["email"], json!("a@x"));
        assert_eq!(registry.get("users").unwrap().len(), 1);
    }

    #[test]
    fn test_empty_natural_key_rejected() {
        let schema = TableSchema::new("t").with_columns(["generated_id"]);
        let plan = SchemaPlan::new().with_table(schema.clone());
        let err = TableMaterializer::default()
            .materialize(&schema, &[], &mut LookupRegistry::new(), &plan)
            .unwrap_err();
        assert_eq!(err, MaterializeError::EmptyNaturalKey("t".to_string()));
    }
}
