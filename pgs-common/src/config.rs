//! Configuration loading and data directory resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "PGS_DATA_DIR";

/// Resolve the daemon data directory, in priority order:
/// 1. Command-line argument
/// 2. `PGS_DATA_DIR` environment variable
/// 3. OS-dependent default
pub fn resolve_data_dir(cli_arg: Option<&str>) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var(DATA_DIR_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    default_data_dir()
}

/// OS-dependent default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("pgs"))
        .unwrap_or_else(|| PathBuf::from("./pgs_data"))
}

/// Path of the SQLite database inside the data directory
pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join("pgs.db")
}

/// Default path of the TOML config file inside the data directory
pub fn default_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

/// Daemon configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub remote: RemoteConfig,
    pub wordpress: WordPressConfig,
    #[serde(default)]
    pub auto_sync: AutoSyncConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Remote gallery API connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the gallery SaaS API
    pub base_url: String,
    /// Tenant credential; also the registry partition key
    pub api_token: String,
    /// Remote property (site) scope
    pub property_id: i64,
}

/// WordPress REST API connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct WordPressConfig {
    /// Site base URL (wp-json is appended)
    pub base_url: String,
    pub username: String,
    /// Application password for basic auth
    pub app_password: String,
}

/// Automatic sync scheduling
#[derive(Debug, Clone, Deserialize)]
pub struct AutoSyncConfig {
    pub enabled: bool,
    /// Seconds between scheduled passes
    pub interval_secs: u64,
    /// Sync log retention window in days
    pub retention_days: u32,
}

impl Default for AutoSyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            retention_days: 90,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address, host:port
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5730".to_string(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: SyncConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("invalid config: {e}")))?;

        if config.remote.base_url.is_empty() {
            return Err(Error::Config("remote.base_url must not be empty".to_string()));
        }
        if config.remote.api_token.is_empty() {
            return Err(Error::Config("remote.api_token must not be empty".to_string()));
        }

        Ok(config)
    }
}
