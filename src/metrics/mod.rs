//! Metric definitions and log extraction
//!
//! A metric definition pairs a name with a regular expression whose first
//! capture group matches the numeric value in a training log line, e.g.
//!
//! ```text
//! Name:  train:loss
//! Regex: loss: ([0-9\.]+)
//! Line:  Epoch 3/10 - loss: 0.4213 - accuracy: 0.8710
//! Value: 0.4213
//! ```

use crate::experiment::MetricRecord;
use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named pattern for pulling one numeric value out of log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Metric name
    #[serde(rename = "Name", alias = "name")]
    pub name: String,
    /// Pattern; the first capture group is the value
    #[serde(rename = "Regex", alias = "regex")]
    pub regex: String,
}

impl MetricDefinition {
    /// Create a metric definition.
    #[must_use]
    pub fn new(name: impl Into<String>, regex: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            regex: regex.into(),
        }
    }
}

struct CompiledMetric {
    name: String,
    regex: Regex,
}

/// Compiled set of metric definitions applied to log lines.
pub struct MetricExtractor {
    metrics: Vec<CompiledMetric>,
}

impl MetricExtractor {
    /// Compile every definition.
    ///
    /// # Errors
    /// Returns `Error::Config` if a name is empty, a pattern does not compile,
    /// or a pattern has no capture group
    pub fn new(definitions: &[MetricDefinition]) -> Result<Self> {
        let mut metrics = Vec::with_capacity(definitions.len());
        for def in definitions {
            if def.name.trim().is_empty() {
                return Err(Error::Config("metric definition has an empty name".to_string()));
            }
            let regex = Regex::new(&def.regex).map_err(|e| {
                Error::Config(format!("invalid regex for metric '{}': {e}", def.name))
            })?;
            if regex.captures_len() < 2 {
                return Err(Error::Config(format!(
                    "regex for metric '{}' needs a capture group around the value",
                    def.name
                )));
            }
            metrics.push(CompiledMetric {
                name: def.name.clone(),
                regex,
            });
        }
        Ok(Self { metrics })
    }

    /// Number of compiled definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Whether there are no definitions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Values found in one line, in definition order.
    ///
    /// A definition contributes at most one value per line; captures that do
    /// not parse as `f64` are ignored.
    #[must_use]
    pub fn extract(&self, line: &str) -> Vec<(String, f64)> {
        self.metrics
            .iter()
            .filter_map(|metric| {
                let captured = metric.regex.captures(line)?.get(1)?.as_str();
                match captured.trim().parse::<f64>() {
                    Ok(value) => Some((metric.name.clone(), value)),
                    Err(_) => {
                        tracing::trace!(metric = %metric.name, captured, "non-numeric capture skipped");
                        None
                    }
                }
            })
            .collect()
    }

    /// Turn a log into metric records for `trial_name`.
    ///
    /// Each metric's step counts its own occurrences from 0, in log order.
    pub fn scan<'a, I>(&self, trial_name: &str, lines: I) -> Vec<MetricRecord>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut steps: HashMap<String, u64> = HashMap::new();
        let mut records = Vec::new();
        for line in lines {
            for (name, value) in self.extract(line) {
                let step = steps.entry(name.clone()).or_insert(0);
                records.push(MetricRecord::new(trial_name, name, *step, value));
                *step += 1;
            }
        }
        tracing::debug!(trial = trial_name, points = records.len(), "log scanned");
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definitions() -> Vec<MetricDefinition> {
        vec![
            MetricDefinition::new("train:loss", r"loss: ([0-9\.]+)"),
            MetricDefinition::new("train:accuracy", r"accuracy: ([0-9\.]+)"),
        ]
    }

    #[test]
    fn test_extract_multiple_metrics_from_line() {
        let extractor = MetricExtractor::new(&definitions()).unwrap();
        let values = extractor.extract("Epoch 1/2 - loss: 0.5312 - accuracy: 0.8100");
        assert_eq!(
            values,
            vec![
                ("train:loss".to_string(), 0.5312),
                ("train:accuracy".to_string(), 0.81)
            ]
        );
    }

    #[test]
    fn test_extract_no_match() {
        let extractor = MetricExtractor::new(&definitions()).unwrap();
        assert!(extractor.extract("starting training").is_empty());
    }

    #[test]
    fn test_non_numeric_capture_skipped() {
        let extractor =
            MetricExtractor::new(&[MetricDefinition::new("phase", r"phase: (\w+)")]).unwrap();
        assert!(extractor.extract("phase: warmup").is_empty());
    }

    #[test]
    fn test_bad_regex_rejected() {
        let err = MetricExtractor::new(&[MetricDefinition::new("loss", "loss: ([0-9")])
            .err()
            .unwrap();
        assert!(err.to_string().contains("invalid regex"));
    }

    #[test]
    fn test_regex_without_group_rejected() {
        assert!(MetricExtractor::new(&[MetricDefinition::new("loss", "loss: [0-9]+")]).is_err());
    }

    #[test]
    fn test_scan_assigns_per_metric_steps() {
        let extractor = MetricExtractor::new(&definitions()).unwrap();
        let log = "loss: 0.9\nnoise\nloss: 0.7 - accuracy: 0.6\nloss: 0.5";
        let records = extractor.scan("trial-1", log.lines());

        let loss: Vec<(u64, f64)> = records
            .iter()
            .filter(|r| r.key() == "train:loss")
            .map(|r| (r.step(), r.value()))
            .collect();
        assert_eq!(loss, vec![(0, 0.9), (1, 0.7), (2, 0.5)]);

        let accuracy: Vec<u64> = records
            .iter()
            .filter(|r| r.key() == "train:accuracy")
            .map(MetricRecord::step)
            .collect();
        assert_eq!(accuracy, vec![0]);
    }

    #[test]
    fn test_definition_wire_format() {
        let def: MetricDefinition =
            serde_json::from_str(r#"{"Name": "val:loss", "Regex": "val_loss: ([0-9\\.]+)"}"#)
                .unwrap();
        assert_eq!(def.name, "val:loss");
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["Regex"], "val_loss: ([0-9\\.]+)");
    }
}
