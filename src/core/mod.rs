//! Core domain model shared by the agent and the server.
//!
//! This module contains the metric types, the crate error and the
//! resolved configuration structs.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{AgentConfig, Protocol, ServerConfig};
pub use error::{PromLightError, Result};
pub use types::{Metric, MetricKind, MetricValue};
