//! Configuration loading and precedence.

use pretty_assertions::assert_eq;
use prom_light::cli::{AgentCli, ServerCli};
use prom_light::core::{AgentConfig, Protocol, ServerConfig};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;

fn config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_default_configs_are_valid() {
    let agent = AgentConfig::default();
    assert!(agent.validate().is_ok());
    assert_eq!(agent.address, "localhost:8080");
    assert_eq!(agent.poll_interval, Duration::from_secs(2));
    assert_eq!(agent.report_interval, Duration::from_secs(10));
    assert_eq!(agent.protocol, Protocol::Http);

    let server = ServerConfig::default();
    assert!(server.validate().is_ok());
    assert!(server.restore);
    assert_eq!(server.store_interval, Duration::from_secs(60));
    assert!(server.database_dsn().is_none());
}

#[test]
fn test_yaml_agent_config() {
    let yaml = r#"
address: "metrics.internal:9000"
poll_interval: 500ms
report_interval: 3s
hash_key: secret
batch_mode: false
protocol: grpc
"#;

    let config = AgentConfig::from_yaml(yaml).unwrap();
    assert_eq!(config.address, "metrics.internal:9000");
    assert_eq!(config.poll_interval, Duration::from_millis(500));
    assert_eq!(config.report_interval, Duration::from_secs(3));
    assert_eq!(config.key(), Some("secret"));
    assert!(!config.batch_mode);
    assert_eq!(config.protocol, Protocol::Grpc);
    // Unset fields keep their defaults.
    assert_eq!(config.report_timeout, Duration::from_secs(1));
}

#[test]
fn test_json_server_config() {
    let json = r#"{"address": "0.0.0.0:8080", "store_interval": "0s", "trusted_subnet": "10.0.0.0/8"}"#;

    let config = ServerConfig::from_yaml(json).unwrap();
    assert_eq!(config.address, "0.0.0.0:8080");
    assert!(config.store_interval.is_zero());
    assert_eq!(config.trusted_subnet, Some("10.0.0.0/8".parse().unwrap()));
}

#[test]
fn test_invalid_configs() {
    assert!(AgentConfig::from_yaml("poll_interval: soon").is_err());
    assert!(ServerConfig::from_yaml("trusted_subnet: not-a-cidr").is_err());

    let agent = AgentConfig {
        report_interval: Duration::ZERO,
        ..AgentConfig::default()
    };
    assert!(agent.validate().is_err());

    let server = ServerConfig {
        address: String::new(),
        ..ServerConfig::default()
    };
    assert!(server.validate().is_err());
}

#[test]
fn test_empty_strings_disable_features() {
    let config = ServerConfig {
        hash_key: Some(String::new()),
        database_dsn: Some(String::new()),
        store_file: Some(PathBuf::new()),
        ..ServerConfig::default()
    };
    assert!(config.key().is_none());
    assert!(config.database_dsn().is_none());
    assert!(config.store_file().is_none());
}

#[tokio::test]
async fn test_agent_flags_override_file() {
    let file = config_file("address: from-file:1\npoll_interval: 5s\nreport_interval: 20s\n");

    let cli = AgentCli {
        config: Some(file.path().to_path_buf()),
        address: Some("from-flag:2".to_string()),
        batch_mode: Some(false),
        ..AgentCli::default()
    };
    let config = cli.load_config().await.unwrap();

    assert_eq!(config.address, "from-flag:2");
    assert_eq!(config.poll_interval, Duration::from_secs(5));
    assert_eq!(config.report_interval, Duration::from_secs(20));
    assert!(!config.batch_mode);
}

#[tokio::test]
async fn test_server_flags_override_file() {
    let file = config_file("address: \":9090\"\nrestore: true\ntrusted_subnet: 10.0.0.0/8\n");

    let cli = ServerCli {
        config: Some(file.path().to_path_buf()),
        restore: Some(false),
        trusted_subnet: Some(String::new()),
        protocol: Some(Protocol::Grpc),
        ..ServerCli::default()
    };
    let config = cli.load_config().await.unwrap();

    assert_eq!(config.address, ":9090");
    assert!(!config.restore);
    assert!(config.trusted_subnet.is_none());
    assert_eq!(config.protocol, Protocol::Grpc);
}

#[tokio::test]
async fn test_bad_subnet_flag_rejected() {
    let file = config_file("{}");
    let cli = ServerCli {
        config: Some(file.path().to_path_buf()),
        trusted_subnet: Some("300.1.1.1/8".to_string()),
        ..ServerCli::default()
    };
    assert!(cli.load_config().await.is_err());
}

#[tokio::test]
async fn test_missing_config_file_is_an_error() {
    let cli = AgentCli {
        config: Some(PathBuf::from("/definitely/not/here.yaml")),
        ..AgentCli::default()
    };
    assert!(cli.load_config().await.is_err());
}
