//! SDK configuration file
//!
//! All sections are optional; missing keys take their defaults.
//!
//! ```toml
//! storage_dir = "data"
//!
//! [pipeline]
//! preview_rows = 10
//! ingest_mode = "append"
//! fallback_table = "imported"
//!
//! [report]
//! merge_precedence = "child_wins"
//!
//! [llm]
//! max_retries = 3
//!
//! [llm.provider]
//! kind = "gemini"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::LlmConfig;
use crate::pipeline::PipelineConfig;
use crate::report::ReportConfig;

/// Default directory for the file-system store
pub const DEFAULT_STORAGE_DIR: &str = ".dnorm";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    pub storage_dir: PathBuf,
    pub pipeline: PipelineConfig,
    pub report: ReportConfig,
    pub llm: LlmConfig,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            pipeline: PipelineConfig::default(),
            report: ReportConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl SdkConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load `path` if it exists, defaults otherwise
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
