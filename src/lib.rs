//! prom-light - lightweight metrics agent and collector.
//!
//! An agent samples process and host statistics, buffers them in a local
//! store and periodically pushes signed snapshots to a server. The server
//! verifies what it receives and persists it behind one storage contract with
//! three interchangeable backends.
//!
//! # Architecture
//!
//! Modules depend on each other strictly in this order:
//! - `core`: metric model, errors and configuration
//! - `storage`: the storage contract and the memory, file and PostgreSQL backends
//! - `crypto`: HMAC signatures and RSA payload encryption
//! - `pollers`: metric producers
//! - `rpc`, `client`, `receiver`: transports and server ingestion
//! - `agent`, `cli`: orchestration
//!
//! # Example
//!
//! ```no_run
//! use prom_light::core::ServerConfig;
//! use prom_light::receiver::MetricsReceiver;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> prom_light::Result<()> {
//!     let receiver = MetricsReceiver::from_config(ServerConfig::default()).await?;
//!     receiver.run(CancellationToken::new()).await
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod agent;
pub mod cli;
pub mod client;
pub mod core;
pub mod crypto;
pub mod pollers;
pub mod receiver;
pub mod rpc;
pub mod storage;

// Re-export core types for convenience
pub use crate::core::{Metric, MetricKind, MetricValue, PromLightError, Result};
