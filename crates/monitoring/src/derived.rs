//! Derived metrics computed from a bounded per-name history.
//!
//! `Rate` looks at the two most recent samples only, `Average` at the whole
//! retained window.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::str::FromStr;

use derive_more::Display;
use thiserror::Error;

use crate::metric::Metric;
use crate::metric::MetricValue;

/// History bound used by the collector.
pub const DEFAULT_HISTORY_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum DerivedMetricMode {
    #[display("rate")]
    Rate,
    #[display("average")]
    Average,
}

impl FromStr for DerivedMetricMode {
    type Err = DerivedMetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rate" => Ok(DerivedMetricMode::Rate),
            "average" | "avg" => Ok(DerivedMetricMode::Average),
            _ => Err(DerivedMetricError::UnsupportedMode(s.to_string())),
        }
    }
}

/// Time unit of the value produced by `Rate`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
pub enum RateUnit {
    #[default]
    #[display("ms")]
    PerMillisecond,
    #[display("s")]
    PerSecond,
}

impl RateUnit {
    fn scale(self) -> f64 {
        match self {
            RateUnit::PerMillisecond => 1.0,
            RateUnit::PerSecond => 1000.0,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DerivedMetricError {
    #[error("not enough values to derive `{name}`")]
    InsufficientHistory { name: String },

    #[error("the two latest `{name}` samples share a timestamp")]
    DivisionByZero { name: String },

    #[error("`{name}` carries a string value")]
    UnsupportedValueType { name: String },

    #[error("derived metric mode `{0}` is not supported")]
    UnsupportedMode(String),

    #[error("`{name}` is not registered for derivation")]
    NotRegistered { name: String },
}

/// Computes rate and average metrics for registered names.
#[derive(Debug)]
pub struct DerivedMetrics {
    registered: HashMap<String, DerivedMetricMode>,
    cache: HashMap<String, VecDeque<Metric>>,
    max_history: usize,
    rate_unit: RateUnit,
}

impl Default for DerivedMetrics {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

impl DerivedMetrics {
    /// Creates an engine keeping at most `max_history` samples per name
    /// (at least one).
    pub fn new(max_history: usize) -> Self {
        Self {
            registered: HashMap::new(),
            cache: HashMap::new(),
            max_history: max_history.max(1),
            rate_unit: RateUnit::default(),
        }
    }

    pub fn with_rate_unit(mut self, unit: RateUnit) -> Self {
        self.rate_unit = unit;
        self
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Registers `name` for derivation, replacing any previous mode.
    pub fn register_metric(&mut self, name: impl Into<String>, mode: DerivedMetricMode) {
        let name = name.into();
        tracing::info!("Metric {name} added to derived metrics ({mode})");
        self.registered.insert(name, mode);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registered.contains_key(name)
    }

    pub fn mode(&self, name: &str) -> Option<DerivedMetricMode> {
        self.registered.get(name).copied()
    }

    /// Retained samples for `name`, oldest first.
    pub fn history(&self, name: &str) -> Option<&VecDeque<Metric>> {
        self.cache.get(name)
    }

    /// Caches `metric` and computes the derived metric for its name.
    pub fn process_metric(&mut self, metric: &Metric) -> Result<Metric, DerivedMetricError> {
        let name = metric.name();
        let Some(mode) = self.mode(name) else {
            return Err(DerivedMetricError::NotRegistered {
                name: name.to_string(),
            });
        };
        if let MetricValue::String(_) = metric.value() {
            return Err(DerivedMetricError::UnsupportedValueType {
                name: name.to_string(),
            });
        }

        let history = self.cache.entry(name.to_string()).or_default();
        history.push_back(metric.clone());
        while history.len() > self.max_history {
            history.pop_front();
        }

        match mode {
            DerivedMetricMode::Rate => self.calculate_rate(name),
            DerivedMetricMode::Average => self.calculate_average(name),
        }
    }

    fn calculate_rate(&self, name: &str) -> Result<Metric, DerivedMetricError> {
        let insufficient = || DerivedMetricError::InsufficientHistory {
            name: name.to_string(),
        };
        let history = self.cache.get(name).ok_or_else(insufficient)?;
        let (previous, current) = match history.len() {
            len if len >= 2 => (&history[len - 2], &history[len - 1]),
            _ => return Err(insufficient()),
        };

        let delta_ms = (current.timestamp() - previous.timestamp()).num_milliseconds();
        if delta_ms == 0 {
            return Err(DerivedMetricError::DivisionByZero {
                name: name.to_string(),
            });
        }

        let (Some(current_value), Some(previous_value)) =
            (current.value().as_f64(), previous.value().as_f64())
        else {
            return Err(DerivedMetricError::UnsupportedValueType {
                name: name.to_string(),
            });
        };

        let rate = (current_value - previous_value) / delta_ms as f64 * self.rate_unit.scale();
        Ok(Metric::new(rate, format!("{name}Rate")).with_tag("unit", self.rate_unit.to_string()))
    }

    fn calculate_average(&self, name: &str) -> Result<Metric, DerivedMetricError> {
        let history = self
            .cache
            .get(name)
            .filter(|history| !history.is_empty())
            .ok_or_else(|| DerivedMetricError::InsufficientHistory {
                name: name.to_string(),
            })?;

        let mut total = 0.0;
        for sample in history {
            total += sample
                .value()
                .as_f64()
                .ok_or_else(|| DerivedMetricError::UnsupportedValueType {
                    name: name.to_string(),
                })?;
        }
        Ok(Metric::new(total / history.len() as f64, format!("{name}Average")))
    }
}
