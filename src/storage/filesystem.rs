//! File system storage backend
//!
//! Layout under the base directory:
//!
//! ```text
//! tables.json          ordered list of table names
//! tables/<name>.jsonl  one JSON object per row
//! schema.json          the merged schema plan
//! config.json          key → value settings
//! ```
//!
//! ## Security
//!
//! All path operations are validated to prevent path traversal attacks.
//! Paths containing ".." are rejected, and all resolved paths are verified
//! to remain within the base directory.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{StorageBackend, StorageError, validate_table_name};
use crate::models::{Row, SchemaPlan};

const TABLE_LIST_FILE: &str = "tables.json";
const SCHEMA_FILE: &str = "schema.json";
const CONFIG_FILE: &str = "config.json";
const TABLES_DIR: &str = "tables";

/// File system storage backend
pub struct FileSystemStorageBackend {
    base_path: PathBuf,
}

impl FileSystemStorageBackend {
    /// Create a new file system storage backend
    ///
    /// All file operations are restricted to `base_path`, which is created on
    /// first write.
    ///
    /// # Example
    ///
    /// ```rust
    /// use data_normalization_sdk::storage::FileSystemStorageBackend;
    ///
    /// let backend = FileSystemStorageBackend::new("/workspace/data");
    /// assert_eq!(backend.base_path().to_str(), Some("/workspace/data"));
    /// ```
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a path relative to the base path with security checks.
    fn resolve_path(&self, path: &str) -> Result<PathBuf, StorageError> {
        let normalized = path.trim_start_matches('/');

        if normalized.contains("..") {
            return Err(StorageError::PermissionDenied(
                "Path traversal (..) not allowed".to_string(),
            ));
        }

        let full = self.base_path.join(normalized);

        for component in full.components() {
            if matches!(component, Component::ParentDir) {
                return Err(StorageError::PermissionDenied(
                    "Path traversal not allowed".to_string(),
                ));
            }
        }

        // Existing paths must stay inside the base once symlinks are resolved
        if full.exists() {
            let canonical = full
                .canonicalize()
                .map_err(|e| StorageError::IoError(format!("Failed to resolve path: {e}")))?;
            let base_canonical = self
                .base_path
                .canonicalize()
                .unwrap_or_else(|_| self.base_path.clone());

            if !canonical.starts_with(&base_canonical) {
                return Err(StorageError::PermissionDenied(
                    "Path escapes base directory".to_string(),
                ));
            }
            return Ok(canonical);
        }

        Ok(full)
    }

    fn table_path(&self, table: &str) -> Result<PathBuf, StorageError> {
        validate_table_name(table)?;
        self.resolve_path(&format!("{TABLES_DIR}/{table}.jsonl"))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        file: &str,
    ) -> Result<Option<T>, StorageError> {
        let path = self.resolve_path(file)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::IoError(format!(
                "Failed to read file {file}: {e}"
            ))),
        }
    }

    async fn write_json<T: serde::Serialize + ?Sized>(
        &self,
        file: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        let path = self.resolve_path(file)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::IoError(format!("Failed to create directory for {file}: {e}"))
            })?;
        }
        let content = serde_json::to_vec_pretty(value)?;
        fs::write(&path, content)
            .await
            .map_err(|e| StorageError::IoError(format!("Failed to write file {file}: {e}")))
    }

    async fn write_table_list(&self, tables: &[String]) -> Result<(), StorageError> {
        self.write_json(TABLE_LIST_FILE, tables).await
    }
}

#[async_trait]
impl StorageBackend for FileSystemStorageBackend {
    async fn list_tables(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .read_json::<Vec<String>>(TABLE_LIST_FILE)
            .await?
            .unwrap_or_default())
    }

    async fn save_rows(&self, table: &str, rows: &[Row]) -> Result<(), StorageError> {
        let path = self.table_path(table)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::IoError(format!("Failed to create table directory: {e}"))
            })?;
        }

        let mut buffer = Vec::new();
        for row in rows {
            serde_json::to_writer(&mut buffer, row)?;
            buffer.push(b'\n');
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::IoError(format!("Failed to open table {table}: {e}")))?;
        file.write_all(&buffer)
            .await
            .map_err(|e| StorageError::IoError(format!("Failed to write table {table}: {e}")))?;
        file.flush()
            .await
            .map_err(|e| StorageError::IoError(format!("Failed to flush table {table}: {e}")))?;

        let mut tables = self.list_tables().await?;
        if !tables.iter().any(|t| t == table) {
            tables.push(table.to_string());
            self.write_table_list(&tables).await?;
        }

        debug!(table, rows = rows.len(), "Appended rows");
        Ok(())
    }

    async fn load_rows(&self, table: &str) -> Result<Vec<Row>, StorageError> {
        let path = self.table_path(table)?;
        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::IoError(format!(
                    "Failed to read table {table}: {e}"
                )));
            }
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str::<Row>(line).map_err(StorageError::from))
            .collect()
    }

    async fn delete_table(&self, table: &str) -> Result<(), StorageError> {
        let path = self.table_path(table)?;
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(StorageError::IoError(format!(
                    "Failed to delete table {table}: {e}"
                )));
            }
        }

        let mut tables = self.list_tables().await?;
        let before = tables.len();
        tables.retain(|t| t != table);
        if tables.len() != before {
            self.write_table_list(&tables).await?;
        }
        Ok(())
    }

    async fn save_schema_plan(&self, plan: &SchemaPlan) -> Result<(), StorageError> {
        self.write_json(SCHEMA_FILE, plan).await
    }

    async fn load_schema_plan(&self) -> Result<Option<SchemaPlan>, StorageError> {
        self.read_json(SCHEMA_FILE).await
    }

    async fn save_config(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let mut config: Map<String, Value> = self.read_json(CONFIG_FILE).await?.unwrap_or_default();
        config.insert(key.to_string(), value.clone());
        self.write_json(CONFIG_FILE, &config).await
    }

    async fn load_config(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let config: Option<Map<String, Value>> = self.read_json(CONFIG_FILE).await?;
        Ok(config.and_then(|mut c| c.remove(key)))
    }
}
