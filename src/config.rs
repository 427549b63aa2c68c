//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "./data/cq.sqlite"
//! max_connections = 32    # one per open search cursor, plus headroom
//!
//! [server]
//! bind = "0.0.0.0:8080"
//!
//! [store]
//! timeout_secs = 5        # deadline per repository operation
//!
//! [query]
//! max_results = 1000      # ceiling for list responses
//!
//! [session]
//! max_pending_commands = 16
//!
//! [logging]
//! filter = "info"         # RUST_LOG takes precedence
//! ```
//!
//! Only `[db]` is required.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    /// Pool size. Each open search cursor holds a connection until dropped.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    32
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl StoreConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
        }
    }
}

fn default_max_results() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_max_pending_commands")]
    pub max_pending_commands: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_pending_commands: default_max_pending_commands(),
        }
    }
}

fn default_max_pending_commands() -> usize {
    16
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "info".to_string()
}

impl Config {
    /// All defaults, with the database under `./data`.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/cq.sqlite"),
                max_connections: default_max_connections(),
            },
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            query: QueryConfig::default(),
            session: SessionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.db.max_connections < 2 {
        anyhow::bail!("db.max_connections must be >= 2");
    }

    if config.store.timeout_secs == 0 {
        anyhow::bail!("store.timeout_secs must be > 0");
    }

    if config.query.max_results < 1 {
        anyhow::bail!("query.max_results must be >= 1");
    }

    if config.session.max_pending_commands < 1 {
        anyhow::bail!("session.max_pending_commands must be >= 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(tmp: &TempDir, body: &str) -> PathBuf {
        let path = tmp.path().join("cq.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults_apply() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(&tmp, "[db]\npath = \"./x.sqlite\"\n");
        let config = load_config(&path).unwrap();

        assert_eq!(config.db.max_connections, 32);
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.store.deadline(), Duration::from_secs(5));
        assert_eq!(config.query.max_results, 1000);
        assert_eq!(config.session.max_pending_commands, 16);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            "[db]\npath = \"./x.sqlite\"\n\n[store]\ntimeout_secs = 0\n",
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn test_tiny_pool_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(&tmp, "[db]\npath = \"./x.sqlite\"\nmax_connections = 1\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("max_connections"));
    }

    #[test]
    fn test_missing_db_section_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(&tmp, "[server]\nbind = \"127.0.0.1:1\"\n");
        assert!(load_config(&path).is_err());
    }
}
