//! In-memory storage backend

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{StorageBackend, StorageError, validate_table_name};
use crate::models::{Row, SchemaPlan};

#[derive(Debug, Default)]
struct MemoryState {
    table_list: Vec<String>,
    tables: HashMap<String, Vec<Row>>,
    schema: Option<SchemaPlan>,
    config: HashMap<String, Value>,
}

/// Storage backend keeping everything in process memory
#[derive(Debug, Default)]
pub struct MemoryStorageBackend {
    state: RwLock<MemoryState>,
}

impl MemoryStorageBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorageBackend {
    async fn list_tables(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.state.read().await.table_list.clone())
    }

    async fn save_rows(&self, table: &str, rows: &[Row]) -> Result<(), StorageError> {
        validate_table_name(table)?;
        let mut state = self.state.write().await;
        if !state.table_list.iter().any(|t| t == table) {
            state.table_list.push(table.to_string());
        }
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .extend_from_slice(rows);
        Ok(())
    }

    async fn load_rows(&self, table: &str) -> Result<Vec<Row>, StorageError> {
        Ok(self
            .state
            .read()
            .await
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_table(&self, table: &str) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        state.tables.remove(table);
        state.table_list.retain(|t| t != table);
        Ok(())
    }

    async fn save_schema_plan(&self, plan: &SchemaPlan) -> Result<(), StorageError> {
        self.state.write().await.schema = Some(plan.clone());
        Ok(())
    }

    async fn load_schema_plan(&self) -> Result<Option<SchemaPlan>, StorageError> {
        Ok(self.state.read().await.schema.clone())
    }

    async fn save_config(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        self.state
            .write()
            .await
            .config
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn load_config(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.state.read().await.config.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::row;
    use serde_json::json;

    #[tokio::test]
    async fn test_append_and_list() {
        let backend = MemoryStorageBackend::new();
        backend.save_rows("b", &[row([("x", json!(1))])]).await.unwrap();
        backend.save_rows("a", &[row([("x", json!(2))])]).await.unwrap();
        backend.save_rows("b", &[row([("x", json!(3))])]).await.unwrap();

        assert_eq!(backend.list_tables().await.unwrap(), vec!["b", "a"]);
        assert_eq!(backend.load_rows("b").await.unwrap().len(), 2);
        assert!(backend.load_rows("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_unregisters() {
        let backend = MemoryStorageBackend::new();
        backend.save_rows("t", &[row([("x", json!(1))])]).await.unwrap();
        backend.delete_table("t").await.unwrap();
        assert!(!backend.table_exists("t").await.unwrap());
        assert!(backend.load_rows("t").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_api_key_config() {
        let backend = MemoryStorageBackend::new();
        assert_eq!(backend.load_api_key().await.unwrap(), None);
        backend.save_api_key("secret").await.unwrap();
        assert_eq!(backend.load_api_key().await.unwrap().as_deref(), Some("secret"));
    }
}
