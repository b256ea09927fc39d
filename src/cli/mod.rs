//! Command-line interface for the agent and server binaries.
//!
//! Every flag can also be set through the environment variable named next to
//! it. A flag or variable that is set wins over the config file, the config
//! file wins over the built-in defaults.

use crate::agent::Agent;
use crate::core::{AgentConfig, PromLightError, Protocol, Result, ServerConfig};
use crate::receiver::MetricsReceiver;
use clap::Parser;
use humantime_serde::re::humantime::parse_duration;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Collects process and host metrics and pushes them to a prom-light server
#[derive(Parser, Debug, Default)]
#[command(name = "agent")]
#[command(version, about, long_about = None)]
pub struct AgentCli {
    /// Server address (host:port)
    #[arg(short = 'a', long = "addr", env = "ADDRESS")]
    pub address: Option<String>,

    /// Poll interval
    #[arg(short = 'p', long, env = "POLL_INTERVAL", value_parser = parse_duration)]
    pub poll_interval: Option<Duration>,

    /// Report interval
    #[arg(short = 'r', long, env = "REPORT_INTERVAL", value_parser = parse_duration)]
    pub report_interval: Option<Duration>,

    /// Per-request report timeout
    #[arg(short = 't', long, env = "REPORT_TIMEOUT", value_parser = parse_duration)]
    pub report_timeout: Option<Duration>,

    /// Secret key for signing metrics
    #[arg(short = 'k', long, env = "KEY")]
    pub key: Option<String>,

    /// Report metrics in batches
    #[arg(short = 'b', long = "batch", env = "BATCH_MODE")]
    pub batch_mode: Option<bool>,

    /// Log level
    #[arg(short = 'l', long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Path to the server's public key
    #[arg(short = 'e', long, env = "CRYPTO_KEY")]
    pub crypto_key: Option<PathBuf>,

    /// Transport: http or grpc
    #[arg(long, env = "PROTOCOL")]
    pub protocol: Option<Protocol>,

    /// Configuration file path (default: ~/.config/prom-light/agent.yaml)
    #[arg(short, long, env = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

/// Receives metrics from agents and stores them
#[derive(Parser, Debug, Default)]
#[command(name = "server")]
#[command(version, about, long_about = None)]
pub struct ServerCli {
    /// Listen address (host:port)
    #[arg(short = 'a', long = "addr", env = "ADDRESS")]
    pub address: Option<String>,

    /// Restore data on start up
    #[arg(short = 'r', long, env = "RESTORE")]
    pub restore: Option<bool>,

    /// Store interval, 0 enables synchronous writes
    #[arg(short = 'i', long, env = "STORE_INTERVAL", value_parser = parse_duration)]
    pub store_interval: Option<Duration>,

    /// Path for file storage, empty disables file storage
    #[arg(short = 'f', long = "file", env = "STORE_FILE")]
    pub store_file: Option<PathBuf>,

    /// Secret key for verifying metrics
    #[arg(short = 'k', long, env = "KEY")]
    pub key: Option<String>,

    /// Database connection string
    #[arg(short = 'd', long, env = "DATABASE_DSN")]
    pub database_dsn: Option<String>,

    /// Database connect timeout
    #[arg(long, env = "DB_CONN_TIMEOUT", value_parser = parse_duration)]
    pub db_conn_timeout: Option<Duration>,

    /// Log level
    #[arg(short = 'l', long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Path to the private key for batch decryption
    #[arg(short = 'e', long, env = "CRYPTO_KEY")]
    pub crypto_key: Option<PathBuf>,

    /// Only accept metrics from this CIDR
    #[arg(short = 't', long, env = "TRUSTED_SUBNET")]
    pub trusted_subnet: Option<String>,

    /// Transport: http or grpc
    #[arg(long, env = "PROTOCOL")]
    pub protocol: Option<Protocol>,

    /// Configuration file path (default: ~/.config/prom-light/server.yaml)
    #[arg(short, long, env = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

/// Config file named on the command line, or the default one if it exists.
fn config_path(explicit: Option<&Path>, default_name: &str) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    dirs::config_dir()
        .map(|dir| dir.join("prom-light").join(default_name))
        .filter(|path| path.exists())
}

impl AgentCli {
    /// Resolve the agent configuration.
    pub async fn load_config(&self) -> Result<AgentConfig> {
        let config = match config_path(self.config.as_deref(), "agent.yaml") {
            Some(path) => {
                let config = AgentConfig::from_file(&path).await?;
                tracing::info!("Loaded configuration from: {:?}", path);
                config
            },
            None => AgentConfig::default(),
        };
        Ok(self.apply(config))
    }

    fn apply(&self, mut config: AgentConfig) -> AgentConfig {
        if let Some(address) = &self.address {
            config.address.clone_from(address);
        }
        if let Some(interval) = self.poll_interval {
            config.poll_interval = interval;
        }
        if let Some(interval) = self.report_interval {
            config.report_interval = interval;
        }
        if let Some(timeout) = self.report_timeout {
            config.report_timeout = timeout;
        }
        if let Some(key) = &self.key {
            config.hash_key = Some(key.clone());
        }
        if let Some(batch_mode) = self.batch_mode {
            config.batch_mode = batch_mode;
        }
        if let Some(level) = &self.log_level {
            config.log_level.clone_from(level);
        }
        if let Some(path) = &self.crypto_key {
            config.crypto_key = Some(path.clone());
        }
        if let Some(protocol) = self.protocol {
            config.protocol = protocol;
        }
        config
    }
}

impl ServerCli {
    /// Resolve the server configuration.
    pub async fn load_config(&self) -> Result<ServerConfig> {
        let config = match config_path(self.config.as_deref(), "server.yaml") {
            Some(path) => {
                let config = ServerConfig::from_file(&path).await?;
                tracing::info!("Loaded configuration from: {:?}", path);
                config
            },
            None => ServerConfig::default(),
        };
        self.apply(config)
    }

    fn apply(&self, mut config: ServerConfig) -> Result<ServerConfig> {
        if let Some(address) = &self.address {
            config.address.clone_from(address);
        }
        if let Some(restore) = self.restore {
            config.restore = restore;
        }
        if let Some(interval) = self.store_interval {
            config.store_interval = interval;
        }
        if let Some(path) = &self.store_file {
            config.store_file = Some(path.clone());
        }
        if let Some(key) = &self.key {
            config.hash_key = Some(key.clone());
        }
        if let Some(dsn) = &self.database_dsn {
            config.database_dsn = Some(dsn.clone());
        }
        if let Some(timeout) = self.db_conn_timeout {
            config.db_conn_timeout = timeout;
        }
        if let Some(level) = &self.log_level {
            config.log_level.clone_from(level);
        }
        if let Some(path) = &self.crypto_key {
            config.crypto_key = Some(path.clone());
        }
        if let Some(subnet) = self.trusted_subnet.as_deref().map(str::trim) {
            config.trusted_subnet = if subnet.is_empty() {
                None
            } else {
                Some(subnet.parse().map_err(|e| {
                    PromLightError::config(format!("invalid trusted subnet {:?}: {}", subnet, e))
                })?)
            };
        }
        if let Some(protocol) = self.protocol {
            config.protocol = protocol;
        }
        Ok(config)
    }
}

/// Initialize logging.
///
/// `RUST_LOG` wins when set, then `--debug`, then the configured level.
pub fn init_logging(level: &str, debug: bool) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if debug { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(debug)
        .with_line_number(debug)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| PromLightError::config(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

/// Cancel `cancel` on Ctrl+C.
pub fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received shutdown signal, stopping..."),
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
        cancel.cancel();
    });
}

/// Execute the agent.
pub async fn execute_agent(cli: AgentCli) -> Result<()> {
    let config = cli.load_config().await?;
    init_logging(&config.log_level, cli.debug)?;

    if cli.check_config {
        config.validate()?;
        println!("Configuration is valid!");
        println!("  Server: {} ({})", config.address, config.protocol);
        println!("  Poll interval: {:?}", config.poll_interval);
        println!("  Report interval: {:?}", config.report_interval);
        println!("  Batch mode: {}", config.batch_mode);
        return Ok(());
    }

    let agent = Agent::from_config(config).await?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    agent.run(cancel).await
}

/// Execute the server.
pub async fn execute_server(cli: ServerCli) -> Result<()> {
    let config = cli.load_config().await?;
    init_logging(&config.log_level, cli.debug)?;

    if cli.check_config {
        config.validate()?;
        println!("Configuration is valid!");
        println!("  Address: {} ({})", config.address, config.protocol);
        println!("  Store file: {:?}", config.store_file());
        println!("  Store interval: {:?}", config.store_interval);
        println!("  Database: {}", config.database_dsn().is_some());
        return Ok(());
    }

    tracing::info!("Starting {} server on {}", config.protocol, config.address);
    let receiver = MetricsReceiver::from_config(config).await?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    receiver.run(cancel).await
}
