//! Optional TOML configuration file
//!
//! Every table and key is optional; environment variables take precedence
//! over anything set here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    /// Inference endpoint settings
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Persistence settings
    #[serde(default)]
    pub storage: StorageConfig,
}

impl FileConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig = toml::from_str(content)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Where completion requests are posted
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the SQLite database
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Name of the persisted history entry
    #[serde(default)]
    pub key: Option<String>,

    /// Keep history in memory only
    #[serde(default)]
    pub ephemeral: Option<bool>,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Missing setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}
