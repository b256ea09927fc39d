//! Configuration for the agent and the server.
//!
//! Both configurations follow the same precedence:
//! - built-in defaults
//! - a YAML (or JSON) config file
//! - environment variables and CLI flags (applied by [`crate::cli`])
//!
//! The rest of the crate only sees the resolved structs.

use crate::core::{PromLightError, Result};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Header carrying the agent's own address for trusted-subnet checks.
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Transport used between agent and server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// JSON over HTTP
    Http,
    /// Typed RPC over HTTP/2
    Grpc,
}

impl Protocol {
    /// Convert to the configuration string
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Grpc => "grpc",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = PromLightError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "grpc" => Ok(Protocol::Grpc),
            other => Err(PromLightError::config(format!("unknown protocol: {}", other))),
        }
    }
}

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Server address (host:port)
    pub address: String,
    /// How often pollers are sampled
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// How often the buffered snapshot is pushed
    #[serde(with = "humantime_serde")]
    pub report_interval: Duration,
    /// Per-request timeout of the transport client
    #[serde(with = "humantime_serde")]
    pub report_timeout: Duration,
    /// Shared secret for metric signatures
    pub hash_key: Option<String>,
    /// Push the whole snapshot as one request
    pub batch_mode: bool,
    /// Log level
    pub log_level: String,
    /// Path to the server's PEM public key
    pub crypto_key: Option<PathBuf>,
    /// Transport selector
    pub protocol: Protocol,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (host:port)
    pub address: String,
    /// Replay the store file on start up
    pub restore: bool,
    /// Path of the store file, empty disables file storage
    pub store_file: Option<PathBuf>,
    /// Snapshot interval for file storage, zero means synchronous writes
    #[serde(with = "humantime_serde")]
    pub store_interval: Duration,
    /// Shared secret for metric signatures
    pub hash_key: Option<String>,
    /// Relational database connection string
    pub database_dsn: Option<String>,
    /// Database connect timeout
    #[serde(with = "humantime_serde")]
    pub db_conn_timeout: Duration,
    /// Log level
    pub log_level: String,
    /// Path to the PEM private key for batch decryption
    pub crypto_key: Option<PathBuf>,
    /// Only accept pushes from this CIDR
    pub trusted_subnet: Option<IpNet>,
    /// Transport selector
    pub protocol: Protocol,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            address: "localhost:8080".to_string(),
            poll_interval: Duration::from_secs(2),
            report_interval: Duration::from_secs(10),
            report_timeout: Duration::from_secs(1),
            hash_key: None,
            batch_mode: true,
            log_level: "info".to_string(),
            crypto_key: None,
            protocol: Protocol::Http,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: "localhost:8080".to_string(),
            restore: true,
            store_file: Some(PathBuf::from("/tmp/devops-metrics-db.json")),
            store_interval: Duration::from_secs(60),
            hash_key: None,
            database_dsn: None,
            db_conn_timeout: Duration::from_secs(5),
            log_level: "info".to_string(),
            crypto_key: None,
            trusted_subnet: None,
            protocol: Protocol::Http,
        }
    }
}

impl AgentConfig {
    /// Load configuration from a YAML or JSON string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| PromLightError::config(format!("Failed to parse agent config: {}", e)))
    }

    /// Load configuration from a file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = read_config_file(path).await?;
        Self::from_yaml(&content)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.address.is_empty() {
            return Err(PromLightError::config("server address must not be empty"));
        }

        if self.poll_interval.is_zero() {
            return Err(PromLightError::config("poll_interval must be greater than 0"));
        }

        if self.report_interval.is_zero() {
            return Err(PromLightError::config("report_interval must be greater than 0"));
        }

        if self.report_timeout.is_zero() {
            return Err(PromLightError::config("report_timeout must be greater than 0"));
        }

        Ok(())
    }

    /// Shared secret, if a non-empty one is configured
    pub fn key(&self) -> Option<&str> {
        non_empty(self.hash_key.as_deref())
    }
}

impl ServerConfig {
    /// Load configuration from a YAML or JSON string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| PromLightError::config(format!("Failed to parse server config: {}", e)))
    }

    /// Load configuration from a file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = read_config_file(path).await?;
        Self::from_yaml(&content)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.address.is_empty() {
            return Err(PromLightError::config("listen address must not be empty"));
        }

        if self.database_dsn().is_some() && self.db_conn_timeout.is_zero() {
            return Err(PromLightError::config("db_conn_timeout must be greater than 0"));
        }

        Ok(())
    }

    /// Shared secret, if a non-empty one is configured
    pub fn key(&self) -> Option<&str> {
        non_empty(self.hash_key.as_deref())
    }

    /// Database DSN, if a non-empty one is configured
    pub fn database_dsn(&self) -> Option<&str> {
        non_empty(self.database_dsn.as_deref())
    }

    /// Store file, if a non-empty path is configured
    pub fn store_file(&self) -> Option<&Path> {
        self.store_file
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }
}

async fn read_config_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        PromLightError::config(format!("Failed to read config file {:?}: {}", path, e))
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
