//! CairnKV Configuration
//!
//! Configuration structures for the CairnKV server daemon, loaded from
//! TOML with per-field defaults so a minimal file (or none at all) works.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main CairnKV configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CairnConfig {
    /// Node-specific configuration
    #[serde(default)]
    pub node: NodeConfig,

    /// TCP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Write-Ahead Log configuration
    #[serde(default)]
    pub wal: WalConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique node identifier
    #[serde(default = "default_node_id")]
    pub id: String,

    /// Data directory for WAL storage
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// TCP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Write-Ahead Log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalConfig {
    /// WAL file path; relative paths resolve under `node.data_dir`
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_node_id() -> String {
    "n1".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./cairnkv_data")
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7411
}

fn default_data_file() -> PathBuf {
    PathBuf::from("data.log")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: default_node_id(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl CairnConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: CairnConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.id.is_empty() {
            return Err(crate::Error::Config("node.id cannot be empty".into()));
        }

        if self.server.host.is_empty() {
            return Err(crate::Error::Config("server.host cannot be empty".into()));
        }

        if self.wal.data_file.as_os_str().is_empty() {
            return Err(crate::Error::Config("wal.data_file cannot be empty".into()));
        }

        Ok(())
    }

    /// Address the TCP server binds
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Resolved WAL file path
    pub fn wal_path(&self) -> PathBuf {
        if self.wal.data_file.is_absolute() {
            self.wal.data_file.clone()
        } else {
            self.node.data_dir.join(&self.wal.data_file)
        }
    }
}
