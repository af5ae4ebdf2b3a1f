//! Metric value model.

use chrono::DateTime;
use chrono::Utc;
use derive_more::Display;
use serde::Serialize;

/// Kind of value carried by a [`Metric`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum MetricType {
    #[display("int")]
    Int,
    #[display("double")]
    Double,
    #[display("string")]
    String,
    #[display("uint64")]
    UInt64,
}

/// Typed value of a metric. The variant is fixed when the metric is built.
#[derive(Debug, Clone, PartialEq, Display, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    #[display("{_0}")]
    Int(i64),
    #[display("{_0}")]
    Double(f64),
    #[display("{_0}")]
    String(String),
    #[display("{_0}")]
    UInt64(u64),
}

impl MetricValue {
    pub fn metric_type(&self) -> MetricType {
        match self {
            MetricValue::Int(_) => MetricType::Int,
            MetricValue::Double(_) => MetricType::Double,
            MetricValue::String(_) => MetricType::String,
            MetricValue::UInt64(_) => MetricType::UInt64,
        }
    }

    /// Numeric view of the value, `None` for strings.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Int(i) => Some(*i as f64),
            MetricValue::Double(d) => Some(*d),
            MetricValue::UInt64(u) => Some(*u as f64),
            MetricValue::String(_) => None,
        }
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Int(value)
    }
}

impl From<i32> for MetricValue {
    fn from(value: i32) -> Self {
        MetricValue::Int(value.into())
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Double(value)
    }
}

impl From<u64> for MetricValue {
    fn from(value: u64) -> Self {
        MetricValue::UInt64(value)
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::String(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::String(value.to_string())
    }
}

/// A single named, typed and timestamped measurement.
///
/// The timestamp defaults to the creation instant and can be overridden
/// with [`Metric::set_timestamp`] before the metric is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    name: String,
    value: MetricValue,
    timestamp: DateTime<Utc>,
    tags: Vec<(String, String)>,
}

impl Metric {
    pub fn new(value: impl Into<MetricValue>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            timestamp: Utc::now(),
            tags: Vec::new(),
        }
    }

    pub fn set_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attaches a tag, replacing the value of an existing key in place.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.tags.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => self.tags.push((key, value)),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &MetricValue {
        &self.value
    }

    pub fn metric_type(&self) -> MetricType {
        self.value.metric_type()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }
}
