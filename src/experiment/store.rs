//! Experiment Store - in-memory tables for experiment tracking data
//!
//! Holds experiments, trials and metric series. Used directly as a local
//! store and as the snapshot type handed to analytics.

use std::collections::{BTreeSet, HashMap};

use super::{ExperimentRecord, MetricRecord, TrialRecord};

/// In-memory store for experiment tracking data.
///
/// Hash maps give O(1) lookups by name; metrics live in one vector that is
/// filtered and sorted by step for time-series queries.
#[derive(Debug, Default, Clone)]
pub struct ExperimentStore {
    experiments: HashMap<String, ExperimentRecord>,
    trials: HashMap<String, TrialRecord>,
    metrics: Vec<MetricRecord>,
}

impl ExperimentStore {
    /// Create a new empty experiment store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the store is empty (no experiments, trials, or metrics).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty() && self.trials.is_empty() && self.metrics.is_empty()
    }

    /// Get the number of experiments in the store.
    #[must_use]
    pub fn experiment_count(&self) -> usize {
        self.experiments.len()
    }

    /// Get the number of trials in the store.
    #[must_use]
    pub fn trial_count(&self) -> usize {
        self.trials.len()
    }

    /// Get the number of metrics in the store.
    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.metrics.len()
    }

    /// Add or replace an experiment.
    pub fn add_experiment(&mut self, experiment: ExperimentRecord) {
        self.experiments
            .insert(experiment.experiment_name().to_string(), experiment);
    }

    /// Get an experiment by name.
    #[must_use]
    pub fn get_experiment(&self, experiment_name: &str) -> Option<&ExperimentRecord> {
        self.experiments.get(experiment_name)
    }

    /// Add or replace a trial.
    pub fn add_trial(&mut self, trial: TrialRecord) {
        self.trials.insert(trial.trial_name().to_string(), trial);
    }

    /// Get a trial by name.
    #[must_use]
    pub fn get_trial(&self, trial_name: &str) -> Option<&TrialRecord> {
        self.trials.get(trial_name)
    }

    /// All trials, sorted by creation time then name.
    #[must_use]
    pub fn trials(&self) -> Vec<&TrialRecord> {
        let mut trials: Vec<&TrialRecord> = self.trials.values().collect();
        trials.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.trial_name().cmp(b.trial_name()))
        });
        trials
    }

    /// Trials belonging to one experiment, in creation order.
    #[must_use]
    pub fn trials_for_experiment(&self, experiment_name: &str) -> Vec<&TrialRecord> {
        self.trials()
            .into_iter()
            .filter(|trial| trial.experiment_name() == experiment_name)
            .collect()
    }

    /// Add a metric to the store.
    pub fn add_metric(&mut self, metric: MetricRecord) {
        self.metrics.push(metric);
    }

    /// Add many metrics at once.
    pub fn extend_metrics(&mut self, metrics: impl IntoIterator<Item = MetricRecord>) {
        self.metrics.extend(metrics);
    }

    /// Metric keys logged for a trial, sorted.
    #[must_use]
    pub fn metric_keys(&self, trial_name: &str) -> BTreeSet<&str> {
        self.metrics
            .iter()
            .filter(|m| m.trial_name() == trial_name)
            .map(MetricRecord::key)
            .collect()
    }

    /// Metric keys across every trial, sorted.
    #[must_use]
    pub fn all_metric_keys(&self) -> BTreeSet<&str> {
        self.metrics.iter().map(MetricRecord::key).collect()
    }

    /// Every metric series in one pass, keyed by `(trial_name, key)`, each
    /// ordered by step.
    #[must_use]
    pub fn metric_series(&self) -> HashMap<(&str, &str), Vec<&MetricRecord>> {
        let mut series: HashMap<(&str, &str), Vec<&MetricRecord>> = HashMap::new();
        for metric in &self.metrics {
            series
                .entry((metric.trial_name(), metric.key()))
                .or_default()
                .push(metric);
        }
        for points in series.values_mut() {
            points.sort_by_key(|m| m.step());
        }
        series
    }

    /// Get metrics for a specific trial and key, ordered by step.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use pipemode::experiment::{ExperimentStore, MetricRecord};
    ///
    /// let mut store = ExperimentStore::new();
    /// for step in 0..100 {
    ///     let loss = 1.0 / (step as f64 + 1.0);
    ///     store.add_metric(MetricRecord::new("trial-001", "train:loss", step, loss));
    /// }
    ///
    /// let loss_curve = store.get_metrics_for_trial("trial-001", "train:loss");
    /// assert_eq!(loss_curve.len(), 100);
    /// ```
    #[must_use]
    pub fn get_metrics_for_trial(&self, trial_name: &str, key: &str) -> Vec<MetricRecord> {
        let mut metrics: Vec<MetricRecord> = self
            .metrics
            .iter()
            .filter(|m| m.trial_name() == trial_name && m.key() == key)
            .cloned()
            .collect();

        // Stable sort keeps arrival order for equal steps
        metrics.sort_by_key(MetricRecord::step);

        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_default() {
        let store = ExperimentStore::new();
        assert!(store.is_empty());
        assert_eq!(store.experiment_count(), 0);
        assert_eq!(store.trial_count(), 0);
        assert_eq!(store.metric_count(), 0);
    }

    #[test]
    fn test_store_add_and_get() {
        let mut store = ExperimentStore::new();
        store.add_experiment(ExperimentRecord::new("exp-1"));
        store.add_trial(TrialRecord::new("trial-1", "exp-1"));
        store.add_metric(MetricRecord::new("trial-1", "loss", 0, 0.5));

        assert!(!store.is_empty());
        assert!(store.get_experiment("exp-1").is_some());
        assert!(store.get_trial("trial-1").is_some());
        assert_eq!(store.trials_for_experiment("exp-1").len(), 1);
        assert!(store.trials_for_experiment("exp-2").is_empty());
    }

    #[test]
    fn test_get_metrics_for_trial_ordering() {
        let mut store = ExperimentStore::new();
        store.add_metric(MetricRecord::new("trial-1", "loss", 2, 0.2));
        store.add_metric(MetricRecord::new("trial-1", "loss", 0, 0.0));
        store.add_metric(MetricRecord::new("trial-1", "loss", 1, 0.1));
        store.add_metric(MetricRecord::new("trial-2", "loss", 0, 9.0));

        let metrics = store.get_metrics_for_trial("trial-1", "loss");

        assert_eq!(metrics.len(), 3);
        assert_eq!(metrics[0].step(), 0);
        assert_eq!(metrics[1].step(), 1);
        assert_eq!(metrics[2].step(), 2);
    }

    #[test]
    fn test_metric_keys() {
        let mut store = ExperimentStore::new();
        store.extend_metrics([
            MetricRecord::new("trial-1", "loss", 0, 0.2),
            MetricRecord::new("trial-1", "accuracy", 0, 0.7),
            MetricRecord::new("trial-2", "auc", 0, 0.9),
        ]);
        let keys: Vec<&str> = store.metric_keys("trial-1").into_iter().collect();
        assert_eq!(keys, vec!["accuracy", "loss"]);
        assert_eq!(store.all_metric_keys().len(), 3);
    }

    #[test]
    fn test_metric_series_groups_and_orders() {
        let mut store = ExperimentStore::new();
        store.extend_metrics([
            MetricRecord::new("trial-1", "loss", 1, 0.1),
            MetricRecord::new("trial-2", "loss", 0, 9.0),
            MetricRecord::new("trial-1", "loss", 0, 0.5),
            MetricRecord::new("trial-1", "accuracy", 0, 0.7),
        ]);

        let series = store.metric_series();
        assert_eq!(series.len(), 3);
        let steps: Vec<u64> = series[&("trial-1", "loss")].iter().map(|m| m.step()).collect();
        assert_eq!(steps, vec![0, 1]);
        assert_eq!(series[&("trial-2", "loss")].len(), 1);
        assert!(!series.contains_key(&("trial-2", "accuracy")));
    }
}
