//! CLI command handlers

pub mod ingest;
pub mod report;
pub mod settings;
pub mod tables;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use data_normalization_sdk::SdkConfig;
use data_normalization_sdk::llm::LlmClient;
use data_normalization_sdk::storage::{FileSystemStorageBackend, StorageBackend};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Configuration and storage shared by every command
pub struct AppContext {
    pub config: SdkConfig,
    pub storage: Arc<dyn StorageBackend>,
}

impl AppContext {
    pub fn open(config_path: &Path, storage_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = SdkConfig::load_or_default(config_path)
            .with_context(|| format!("loading {}", config_path.display()))?;
        if let Some(dir) = storage_dir {
            config.storage_dir = dir;
        }
        debug!(storage_dir = %config.storage_dir.display(), "Opening storage");

        let storage: Arc<dyn StorageBackend> =
            Arc::new(FileSystemStorageBackend::new(&config.storage_dir));
        Ok(Self { config, storage })
    }

    /// The configured model client, if any
    pub async fn llm_client(&self) -> anyhow::Result<Option<Arc<dyn LlmClient>>> {
        let api_key = if self.config.llm.provider.needs_api_key() {
            self.storage.load_api_key().await?
        } else {
            None
        };
        self.config
            .llm
            .build_client(api_key.as_deref())
            .map_err(|e| anyhow::anyhow!(e.user_message()))
    }
}

/// Read a JSON or YAML document, chosen by file extension
pub fn read_document<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let value = if is_yaml {
        serde_yaml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?
    } else {
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?
    };
    Ok(value)
}
