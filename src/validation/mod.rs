//! Schema plan validation
//!
//! Checks the invariants a [`SchemaPlan`] must satisfy before any table can be
//! materialized: declared columns cover the keys, every referenced parent
//! exists, and the reference graph is acyclic.

use thiserror::Error;

use crate::models::SchemaPlan;
use crate::ordering;

/// Errors describing an unusable schema plan
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaPlanError {
    /// The plan has no tables
    #[error("Schema plan contains no tables")]
    Empty,

    /// The plan could not be decoded
    #[error("Invalid schema plan: {0}")]
    Invalid(String),

    /// The proposal collaborator did not return a plan
    #[error("Schema proposal failed: {0}")]
    ProposalFailed(String),

    /// A key column is not part of the table's declared columns
    #[error("Table '{table}': {role} column '{column}' is not in the declared columns")]
    MissingColumn {
        table: String,
        column: String,
        role: &'static str,
    },

    /// A table has no natural key
    #[error("Table '{0}' has an empty natural key")]
    EmptyNaturalKey(String),

    /// A foreign key points at a table that is not in the plan
    #[error("Table '{table}': foreign key '{column}' references unknown table '{parent}'")]
    UnknownParent {
        table: String,
        column: String,
        parent: String,
    },

    /// The foreign key graph contains a cycle
    #[error("Foreign key cycle between tables: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    /// Several problems were found
    #[error("{}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<SchemaPlanError>),
}

impl SchemaPlanError {
    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            SchemaPlanError::ProposalFailed(msg) => format!(
                "Schema proposal failed: {msg}\n\nHint: Pass --table <name> to import the file as a single table."
            ),
            SchemaPlanError::Cycle(_) => format!(
                "{self}\n\nHint: Foreign keys must form a hierarchy; remove one of the references."
            ),
            _ => self.to_string(),
        }
    }
}

/// Validate every invariant of a plan, reporting all problems found
pub fn validate_plan(plan: &SchemaPlan) -> Result<(), SchemaPlanError> {
    let mut errors = Vec::new();

    for table in plan.tables() {
        if table.natural_key.is_empty() {
            errors.push(SchemaPlanError::EmptyNaturalKey(table.name.clone()));
        }

        for field in &table.natural_key {
            if !table.has_column(field) {
                errors.push(SchemaPlanError::MissingColumn {
                    table: table.name.clone(),
                    column: field.clone(),
                    role: "natural key",
                });
            }
        }

        for column in table.primary_key.columns() {
            if !table.has_column(column) {
                errors.push(SchemaPlanError::MissingColumn {
                    table: table.name.clone(),
                    column: column.to_string(),
                    role: "primary key",
                });
            }
        }

        for (local, fk) in &table.foreign_keys {
            if !table.has_column(local) {
                errors.push(SchemaPlanError::MissingColumn {
                    table: table.name.clone(),
                    column: local.clone(),
                    role: "foreign key",
                });
            }
            if !plan.contains(&fk.parent_table) {
                errors.push(SchemaPlanError::UnknownParent {
                    table: table.name.clone(),
                    column: local.clone(),
                    parent: fk.parent_table.clone(),
                });
            }
        }
    }

    // Cycle detection needs every parent to exist
    if errors.is_empty()
        && let Some(cycle) = ordering::find_cycle(plan)
    {
        errors.push(SchemaPlanError::Cycle(cycle));
    }

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(SchemaPlanError::Multiple(errors)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TableSchema;

    fn customers() -> TableSchema {
        TableSchema::new("customers")
            .with_columns(["Email", "generated_id"])
            .with_natural_key(["Email"])
    }

    #[test]
    fn test_valid_plan() {
        let plan = SchemaPlan::new().with_table(customers()).with_table(
            TableSchema::new("orders")
                .with_columns(["OrderNo", "Email", "generated_id"])
                .with_natural_key(["OrderNo"])
                .with_foreign_key("Email", "customers", "generated_id"),
        );
        assert_eq!(validate_plan(&plan), Ok(()));
    }

    #[test]
    fn test_missing_key_columns() {
        let plan = SchemaPlan::new().with_table(
            TableSchema::new("t")
                .with_columns(["a"])
                .with_natural_key(["b"]),
        );
        let err = validate_plan(&plan).unwrap_err();
        match err {
            SchemaPlanError::Multiple(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(errors.iter().any(|e| matches!(
                    e,
                    SchemaPlanError::MissingColumn { role: "natural key", .. }
                )));
                assert!(errors.iter().any(|e| matches!(
                    e,
                    SchemaPlanError::MissingColumn { role: "primary key", .. }
                )));
            }
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_parent() {
        let plan = SchemaPlan::new().with_table(
            TableSchema::new("orders")
                .with_columns(["Email", "generated_id"])
                .with_natural_key(["Email"])
                .with_foreign_key("Email", "customers", "generated_id"),
        );
        assert!(matches!(
            validate_plan(&plan),
            Err(SchemaPlanError::UnknownParent { parent, .. }) if parent == "customers"
        ));
    }

    #[test]
    fn test_empty_natural_key() {
        let plan = SchemaPlan::new()
            .with_table(TableSchema::new("t").with_columns(["generated_id"]));
        assert_eq!(
            validate_plan(&plan),
            Err(SchemaPlanError::EmptyNaturalKey("t".to_string()))
        );
    }

    #[test]
    fn test_cycle_reported() {
        let plan = SchemaPlan::new()
            .with_table(
                TableSchema::new("a")
                    .with_columns(["b_ref", "generated_id"])
                    .with_natural_key(["b_ref"])
                    .with_foreign_key("b_ref", "b", "generated_id"),
            )
            .with_table(
                TableSchema::new("b")
                    .with_columns(["a_ref", "generated_id"])
                    .with_natural_key(["a_ref"])
                    .with_foreign_key("a_ref", "a", "generated_id"),
            );
        assert!(matches!(validate_plan(&plan), Err(SchemaPlanError::Cycle(_))));
    }
}
