//! Typed RPC messages and the generated `metrics.Metrics` service.
//!
//! The wire messages mirror the JSON record: the metric kind is an
//! enumeration and both payload fields are always present, only the one
//! matching the kind is meaningful.

#![allow(missing_docs, clippy::derive_partial_eq_without_eq)]

use crate::core::{self as model, MetricKind, PromLightError};

include!(concat!(env!("OUT_DIR"), "/metrics.Metrics.rs"));

pub use metrics_client::MetricsClient as RpcClient;
pub use metrics_server::{Metrics as MetricsService, MetricsServer};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MetricType {
    Gauge = 0,
    Counter = 1,
}

impl From<MetricKind> for MetricType {
    fn from(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Gauge => MetricType::Gauge,
            MetricKind::Counter => MetricType::Counter,
        }
    }
}

impl From<MetricType> for MetricKind {
    fn from(kind: MetricType) -> Self {
        match kind {
            MetricType::Gauge => MetricKind::Gauge,
            MetricType::Counter => MetricKind::Counter,
        }
    }
}

/// Decode the raw enumeration value of a message.
pub fn kind_from_i32(raw: i32) -> model::Result<MetricKind> {
    MetricType::try_from(raw)
        .map(MetricKind::from)
        .map_err(|_| PromLightError::UnknownKind(raw.to_string()))
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Metric {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(enumeration = "MetricType", tag = "2")]
    pub r#type: i32,
    #[prost(int64, tag = "3")]
    pub delta: i64,
    #[prost(double, tag = "4")]
    pub value: f64,
    #[prost(string, tag = "5")]
    pub hash: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateMetricRequest {
    #[prost(message, optional, tag = "1")]
    pub metric: Option<Metric>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateMetricResponse {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateMetricsBatchRequest {
    #[prost(message, repeated, tag = "1")]
    pub metrics: Vec<Metric>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateMetricsBatchResponse {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetMetricRequest {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(enumeration = "MetricType", tag = "2")]
    pub r#type: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetMetricResponse {
    #[prost(message, optional, tag = "1")]
    pub metric: Option<Metric>,
}

impl From<&model::Metric> for Metric {
    fn from(metric: &model::Metric) -> Self {
        Metric {
            name: metric.id.clone(),
            r#type: MetricType::from(metric.kind) as i32,
            delta: metric.delta.unwrap_or_default(),
            value: metric.value.unwrap_or_default(),
            hash: metric.hash.clone().unwrap_or_default(),
        }
    }
}

impl TryFrom<Metric> for model::Metric {
    type Error = PromLightError;

    fn try_from(metric: Metric) -> model::Result<Self> {
        let mut converted = match kind_from_i32(metric.r#type)? {
            MetricKind::Gauge => model::Metric::gauge(metric.name, metric.value),
            MetricKind::Counter => model::Metric::counter(metric.name, metric.delta),
        };
        converted.hash = Some(metric.hash).filter(|h| !h.is_empty());
        Ok(converted)
    }
}

/// Convert a batch for the wire.
pub fn batch_to_rpc(metrics: &[model::Metric]) -> Vec<Metric> {
    metrics.iter().map(Metric::from).collect()
}
