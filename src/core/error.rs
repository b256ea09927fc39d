use crate::core::types::MetricKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PromLightError {
    #[error("Unknown {kind} metric: {name}")]
    NotFound { kind: MetricKind, name: String },

    #[error("Invalid metric value: {0}")]
    InvalidValue(String),

    #[error("Unknown metric type: {0}")]
    UnknownKind(String),

    #[error("Invalid signature for metric: {0}")]
    InvalidSignature(String),

    #[error("Storage connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server responded with status {status}")]
    BadStatus { status: u16 },

    #[error("Source address {0} is not trusted")]
    Untrusted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("GRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Channel closed")]
    ChannelClosed,
}

/// Result type alias for prom-light operations
pub type Result<T> = std::result::Result<T, PromLightError>;

impl PromLightError {
    /// Creates a not-found error for a metric key
    pub fn not_found<S: Into<String>>(kind: MetricKind, name: S) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Creates a new invalid value error
    pub fn invalid_value<S: Into<String>>(msg: S) -> Self {
        Self::InvalidValue(msg.into())
    }

    /// Creates a new connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a new serialization error
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        Self::Serialization(msg.into())
    }

    /// Creates a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new crypto error
    pub fn crypto<S: Into<String>>(msg: S) -> Self {
        Self::Crypto(msg.into())
    }

    /// Creates a new protocol error
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }

    /// Creates a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidValue(_) | Self::UnknownKind(_) => "validation",
            Self::InvalidSignature(_) | Self::Crypto(_) | Self::Untrusted(_) => "security",
            Self::Connection(_) | Self::Database(_) => "connection",
            Self::Serialization(_) | Self::Json(_) => "serialization",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
            Self::Protocol(_) => "protocol",
            Self::Network(_) | Self::BadStatus { .. } | Self::Grpc(_) => "network",
            Self::Io(_) => "io",
            Self::Join(_) | Self::ChannelClosed => "async",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PromLightError::not_found(MetricKind::Gauge, "Alloc");
        assert_eq!(err.to_string(), "Unknown gauge metric: Alloc");
        assert_eq!(err.category(), "not_found");
    }

    #[test]
    fn test_grpc_status_category() {
        let err = PromLightError::from(tonic::Status::unavailable("down"));
        assert_eq!(err.category(), "network");
        assert_eq!(PromLightError::BadStatus { status: 500 }.category(), "network");
        assert_eq!(PromLightError::InvalidSignature("Alloc".into()).category(), "security");
    }
}
