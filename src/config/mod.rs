//! Application configuration

pub mod file;

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use file::{ConfigError, FileConfig};

use crate::core::DEFAULT_KEY;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_url: String,
    pub data_dir: PathBuf,
    pub storage_key: String,
    pub ephemeral: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = match env::var("LEETAID_CONFIG") {
            Ok(path) => FileConfig::from_file(Path::new(&path))?,
            Err(_) => FileConfig::default(),
        };

        Self::resolve(|name| env::var(name).ok(), file)
    }

    /// Merge environment lookups over file values and apply defaults.
    pub fn resolve(
        var: impl Fn(&str) -> Option<String>,
        file: FileConfig,
    ) -> Result<Self, ConfigError> {
        let api_url = var("LEETAID_API_URL")
            .or(file.endpoint.url)
            .ok_or(ConfigError::Missing("LEETAID_API_URL"))?;

        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "endpoint url must be http(s): {}",
                api_url
            )));
        }

        let ephemeral = match var("LEETAID_EPHEMERAL") {
            Some(v) => parse_flag(&v)?,
            None => file.storage.ephemeral.unwrap_or(false),
        };

        Ok(Self {
            api_url,
            data_dir: var("LEETAID_DATA_DIR")
                .map(PathBuf::from)
                .or(file.storage.data_dir)
                .unwrap_or_else(|| PathBuf::from("./data")),
            storage_key: var("LEETAID_STORAGE_KEY")
                .or(file.storage.key)
                .unwrap_or_else(|| DEFAULT_KEY.into()),
            ephemeral,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("leetaid.db")
    }
}

fn parse_flag(value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::Invalid(format!(
            "LEETAID_EPHEMERAL must be a boolean, got {}",
            other
        ))),
    }
}
