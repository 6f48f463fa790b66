//! Metric Record - time-series metrics for trials

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single metric data point emitted by a trial's training job.
///
/// `trial_name` + `key` partition the series; `step` orders it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRecord {
    trial_name: String,
    key: String,
    step: u64,
    value: f64,
    timestamp: DateTime<Utc>,
}

impl MetricRecord {
    /// Create a new metric record with the current timestamp.
    ///
    /// # Arguments
    ///
    /// * `trial_name` - Trial the metric belongs to
    /// * `key` - Metric name (e.g., "train:loss")
    /// * `step` - Position in the series
    /// * `value` - Metric value
    #[must_use]
    pub fn new(trial_name: impl Into<String>, key: impl Into<String>, step: u64, value: f64) -> Self {
        Self {
            trial_name: trial_name.into(),
            key: key.into(),
            step,
            value,
            timestamp: Utc::now(),
        }
    }

    /// Same as [`new`](Self::new) with an explicit timestamp.
    #[must_use]
    pub fn at(
        trial_name: impl Into<String>,
        key: impl Into<String>,
        step: u64,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            ..Self::new(trial_name, key, step, value)
        }
    }

    /// Get the trial name.
    #[must_use]
    pub fn trial_name(&self) -> &str {
        &self.trial_name
    }

    /// Get the metric key/name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the step.
    #[must_use]
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Get the metric value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Get the timestamp when the metric was recorded.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
