//! Storage backend abstraction
//!
//! Defines the StorageBackend trait and its implementations:
//! - MemoryStorageBackend: in-process maps (tests, one-shot runs)
//! - FileSystemStorageBackend: JSON/JSONL files under a base directory

use async_trait::async_trait;
use serde_json::Value;

use crate::models::{Row, SchemaPlan};

pub mod memory;

#[cfg(feature = "native-fs")]
pub mod filesystem;

pub use memory::MemoryStorageBackend;

#[cfg(feature = "native-fs")]
pub use filesystem::FileSystemStorageBackend;

/// Config key holding the language-model API key
pub const API_KEY_CONFIG: &str = "apiKey";

/// Error type for storage operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Invalid table name: {0}")]
    InvalidName(String),
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

/// Persistence contract for normalized tables, the schema plan and settings
///
/// Tables are append-only row collections registered in an ordered table
/// list. Loading an unknown table yields no rows.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Names of every stored table, in registration order
    async fn list_tables(&self) -> Result<Vec<String>, StorageError>;

    /// Append rows to a table, registering the table if needed
    async fn save_rows(&self, table: &str, rows: &[Row]) -> Result<(), StorageError>;

    /// All rows of a table in insertion order
    async fn load_rows(&self, table: &str) -> Result<Vec<Row>, StorageError>;

    /// Remove a table's rows and unregister it
    async fn delete_table(&self, table: &str) -> Result<(), StorageError>;

    /// Replace the stored schema plan
    async fn save_schema_plan(&self, plan: &SchemaPlan) -> Result<(), StorageError>;

    /// The stored schema plan, if one was saved
    async fn load_schema_plan(&self) -> Result<Option<SchemaPlan>, StorageError>;

    /// Store a configuration value
    async fn save_config(&self, key: &str, value: &Value) -> Result<(), StorageError>;

    /// Load a configuration value
    async fn load_config(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Whether a table is registered
    async fn table_exists(&self, table: &str) -> Result<bool, StorageError> {
        Ok(self.list_tables().await?.iter().any(|t| t == table))
    }

    /// Store the language-model API key
    async fn save_api_key(&self, key: &str) -> Result<(), StorageError> {
        self.save_config(API_KEY_CONFIG, &Value::String(key.to_string()))
            .await
    }

    /// Load the language-model API key
    async fn load_api_key(&self) -> Result<Option<String>, StorageError> {
        Ok(self
            .load_config(API_KEY_CONFIG)
            .await?
            .and_then(|v| v.as_str().map(str::to_string)))
    }
}

/// Reject table names that cannot be used as storage keys
pub(crate) fn validate_table_name(table: &str) -> Result<(), StorageError> {
    if table.trim().is_empty() {
        return Err(StorageError::InvalidName("table name is empty".to_string()));
    }
    if table.contains(['/', '\\', '\0']) || table.contains("..") {
        return Err(StorageError::InvalidName(format!(
            "'{table}' contains path characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("order_items").is_ok());
        assert!(validate_table_name("Sales 2024").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("../etc").is_err());
        assert!(validate_table_name("a/b").is_err());
    }
}
