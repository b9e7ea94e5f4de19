use crate::error::{EtlError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub query: QuerySettings,
    #[serde(default)]
    pub publish: PublishSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// "fs" or "http"
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    #[serde(default = "default_storage_root")]
    pub root: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuerySettings {
    /// "local" or "http"
    #[serde(default = "default_query_backend")]
    pub backend: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_export_timeout")]
    pub export_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishSettings {
    #[serde(default = "default_project")]
    pub project: String,
    #[serde(default = "default_extract_name")]
    pub extract_name: String,
}

fn default_staging_dir() -> String {
    "staging".to_string()
}
fn default_storage_backend() -> String {
    "fs".to_string()
}
fn default_storage_root() -> String {
    "data".to_string()
}
fn default_query_backend() -> String {
    "local".to_string()
}
fn default_database() -> String {
    "db1".to_string()
}
fn default_poll_interval() -> u64 {
    2
}
fn default_export_timeout() -> u64 {
    300
}
fn default_project() -> String {
    "project1".to_string()
}
fn default_extract_name() -> String {
    "health_analysis".to_string()
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self { staging_dir: default_staging_dir() }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { backend: default_storage_backend(), root: default_storage_root() }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            backend: default_query_backend(),
            database: default_database(),
            poll_interval_secs: default_poll_interval(),
            export_timeout_secs: default_export_timeout(),
        }
    }
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self { project: default_project(), extract_name: default_extract_name() }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pipeline: PipelineSettings::default(),
            storage: StorageSettings::default(),
            query: QuerySettings::default(),
            publish: PublishSettings::default(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!("failed to read config file '{}': {}", path.display(), e))
        })?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }
}

/// Fetch a required credential from the environment, failing with a
/// descriptive error before any network work starts.
pub fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(EtlError::Config(format!(
            "required environment variable {name} is not set"
        ))),
    }
}
