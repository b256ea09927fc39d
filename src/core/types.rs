use crate::core::error::{PromLightError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a metric. Together with the name it forms the storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Last-write-wins sample
    Gauge,
    /// Accumulating integer delta
    Counter,
}

impl MetricKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = PromLightError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(PromLightError::UnknownKind(other.to_string())),
        }
    }
}

/// Validated payload of a metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    /// Gauge value
    Gauge(f64),
    /// Counter delta or accumulated total
    Counter(i64),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Gauge(value) => write!(f, "{:.3}", value),
            MetricValue::Counter(delta) => write!(f, "{}", delta),
        }
    }
}

/// A single metric as it travels over the wire and into storage.
///
/// Exactly one of `value` (gauges) and `delta` (counters) is expected to be
/// present. The struct keeps both optional so that a record with a missing
/// payload can be represented and rejected with [`PromLightError::InvalidValue`]
/// by whoever tries to apply it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Metric name
    pub id: String,
    /// Metric kind
    #[serde(rename = "type")]
    pub kind: MetricKind,
    /// Counter delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    /// Gauge value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Integrity hash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Metric {
    /// Creates a gauge metric
    pub fn gauge<S: Into<String>>(id: S, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
            hash: None,
        }
    }

    /// Creates a counter metric
    pub fn counter<S: Into<String>>(id: S, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
            hash: None,
        }
    }

    /// Creates a metric with a payload of the matching kind
    pub fn from_value<S: Into<String>>(id: S, value: MetricValue) -> Self {
        match value {
            MetricValue::Gauge(v) => Self::gauge(id, v),
            MetricValue::Counter(d) => Self::counter(id, d),
        }
    }

    /// Returns the payload for the declared kind
    pub fn payload(&self) -> Result<MetricValue> {
        match self.kind {
            MetricKind::Gauge => {
                let value = self.value.ok_or_else(|| {
                    PromLightError::invalid_value(format!("gauge {} has no value", self.id))
                })?;
                finite_gauge(&self.id, value)
            },
            MetricKind::Counter => self.delta.map(MetricValue::Counter).ok_or_else(|| {
                PromLightError::invalid_value(format!("counter {} has no delta", self.id))
            }),
        }
    }

    /// Returns true if this metric is a counter
    pub fn is_counter(&self) -> bool {
        self.kind == MetricKind::Counter
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.payload() {
            Ok(value) => write!(f, "{}", value),
            Err(_) => f.write_str("unknown"),
        }
    }
}

/// JSON has no encoding for NaN or infinities, so they never enter a store.
pub(crate) fn finite_gauge(id: &str, value: f64) -> Result<MetricValue> {
    if value.is_finite() {
        Ok(MetricValue::Gauge(value))
    } else {
        Err(PromLightError::invalid_value(format!("gauge {} is not finite: {}", id, value)))
    }
}

/// Parses the textual value of a path-encoded update.
pub fn parse_value(kind: MetricKind, raw: &str) -> Result<MetricValue> {
    match kind {
        MetricKind::Gauge => {
            let value = raw
                .parse::<f64>()
                .map_err(|e| PromLightError::invalid_value(format!("bad gauge value {:?}: {}", raw, e)))?;
            finite_gauge(raw, value)
        },
        MetricKind::Counter => raw
            .parse::<i64>()
            .map(MetricValue::Counter)
            .map_err(|e| PromLightError::invalid_value(format!("bad counter value {:?}: {}", raw, e))),
    }
}
