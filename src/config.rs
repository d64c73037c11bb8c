use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::CHECKPOINT_FILE;
use crate::error::{IndexerError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ord: OrdConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Explorer and crawl settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OrdConfig {
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    /// Listing cursor used when no checkpoint has been written yet.
    #[serde(default)]
    pub inscription_id_start: Option<i64>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_batch_retry_secs")]
    pub batch_retry_secs: u64,
    #[serde(default = "default_idle_poll_secs")]
    pub idle_poll_secs: u64,
    /// Update transitions stay off until collection ownership can be established.
    #[serde(default)]
    pub enable_update: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,
    #[serde(default = "default_database_file")]
    pub database_file: String,
    #[serde(default = "default_checkpoint_file")]
    pub checkpoint_file: String,
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_true")]
    pub json_file: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus exporter port; the exporter is not installed when unset.
    #[serde(default)]
    pub port: Option<u16>,
}

fn default_server_addr() -> String {
    "http://localhost:8080".to_string()
}
fn default_concurrency() -> usize {
    10
}
fn default_fetch_attempts() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_batch_retry_secs() -> u64 {
    10
}
fn default_idle_poll_secs() -> u64 {
    60
}
fn default_data_root() -> PathBuf {
    PathBuf::from("data")
}
fn default_database_file() -> String {
    "indexer.db".to_string()
}
fn default_checkpoint_file() -> String {
    CHECKPOINT_FILE.to_string()
}
fn default_backend() -> StorageBackend {
    StorageBackend::Sqlite
}
fn default_api_port() -> u16 {
    8000
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}
fn default_true() -> bool {
    true
}

impl Default for OrdConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            inscription_id_start: None,
            concurrency: default_concurrency(),
            fetch_attempts: default_fetch_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            batch_retry_secs: default_batch_retry_secs(),
            idle_poll_secs: default_idle_poll_secs(),
            enable_update: false,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            database_file: default_database_file(),
            checkpoint_file: default_checkpoint_file(),
            backend: default_backend(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            json_file: true,
        }
    }
}

impl OrdConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn batch_retry_delay(&self) -> Duration {
        Duration::from_secs(self.batch_retry_secs)
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_secs(self.idle_poll_secs)
    }
}

impl DataConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_root.join(&self.database_file)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.data_root.join(&self.checkpoint_file)
    }
}

impl Config {
    /// Load the config file, falling back to defaults when it does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                IndexerError::Config(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            Self::from_toml(&content)?
        } else {
            Config::default()
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// `ORD_INDEXER_*` variables win over the file.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("ORD_INDEXER_SERVER_ADDR") {
            self.ord.server_addr = v;
        }
        if let Ok(v) = std::env::var("ORD_INDEXER_CONCURRENCY") {
            self.ord.concurrency = parse_env("ORD_INDEXER_CONCURRENCY", &v)?;
        }
        if let Ok(v) = std::env::var("ORD_INDEXER_INSCRIPTION_ID_START") {
            self.ord.inscription_id_start = Some(parse_env("ORD_INDEXER_INSCRIPTION_ID_START", &v)?);
        }
        if let Ok(v) = std::env::var("ORD_INDEXER_DATA_ROOT") {
            self.data.data_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ORD_INDEXER_API_PORT") {
            self.api.port = parse_env("ORD_INDEXER_API_PORT", &v)?;
        }
        if let Ok(v) = std::env::var("ORD_INDEXER_METRICS_PORT") {
            self.metrics.port = Some(parse_env("ORD_INDEXER_METRICS_PORT", &v)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.ord.server_addr.trim().is_empty() {
            return Err(IndexerError::Config("ord.server_addr is empty".into()));
        }
        if self.ord.concurrency == 0 {
            return Err(IndexerError::Config("ord.concurrency must be at least 1".into()));
        }
        if self.ord.fetch_attempts == 0 {
            return Err(IndexerError::Config("ord.fetch_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| IndexerError::Config(format!("{key} has an invalid value: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.ord.server_addr, "http://localhost:8080");
        assert_eq!(config.ord.concurrency, 10);
        assert!(!config.ord.enable_update);
        assert_eq!(config.data.backend, StorageBackend::Sqlite);
        assert_eq!(config.data.checkpoint_path(), PathBuf::from("data/.last_inscription_id"));
        assert!(config.metrics.port.is_none());
    }

    #[test]
    fn test_parses_file_values() {
        let config = Config::from_toml(
            r#"
            [ord]
            server_addr = "http://ord.example:80"
            inscription_id_start = 4984402
            concurrency = 4
            enable_update = true

            [data]
            data_root = "/var/lib/ord"
            backend = "memory"

            [metrics]
            port = 9898
            "#,
        )
        .unwrap();
        assert_eq!(config.ord.server_addr, "http://ord.example:80");
        assert_eq!(config.ord.inscription_id_start, Some(4984402));
        assert_eq!(config.ord.concurrency, 4);
        assert!(config.ord.enable_update);
        assert_eq!(config.data.backend, StorageBackend::Memory);
        assert_eq!(config.data.database_path(), PathBuf::from("/var/lib/ord/indexer.db"));
        assert_eq!(config.metrics.port, Some(9898));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.ord.concurrency = 0;
        assert!(config.validate().is_err());
    }
}
