//! Tracking service: create/load experiments, create trials, record metrics

use super::{ExperimentRecord, ExperimentStore, MetricRecord, TrialRecord, TrialStatus};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Maximum length of experiment and trial names
pub const MAX_NAME_LEN: usize = 120;

/// Unique trial name derived from the current time.
///
/// `trial_name("training-job", now)` gives
/// `"training-job-2024-03-09-14-05-07-042"`.
#[must_use]
pub fn trial_name(prefix: &str, now: DateTime<Utc>) -> String {
    crate::naming::timestamped(prefix, now, MAX_NAME_LEN)
}

/// Experiment identifiers attached to a training job submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExperimentConfig {
    /// Experiment the job reports into
    pub experiment_name: String,
    /// Trial the job's metrics are grouped under
    pub trial_name: String,
    /// Display name of the job's trial component
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_component_display_name: Option<String>,
}

/// Handle returned by [`TrackingService::create_or_load_experiment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentHandle {
    experiment_name: String,
    created: bool,
}

impl ExperimentHandle {
    /// Experiment name.
    #[must_use]
    pub fn experiment_name(&self) -> &str {
        &self.experiment_name
    }

    /// `true` if this call created the experiment, `false` if it already existed.
    #[must_use]
    pub const fn created(&self) -> bool {
        self.created
    }
}

/// Handle returned by [`TrackingService::create_trial`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialHandle {
    trial_name: String,
    experiment_name: String,
}

impl TrialHandle {
    /// Trial name.
    #[must_use]
    pub fn trial_name(&self) -> &str {
        &self.trial_name
    }

    /// Parent experiment name.
    #[must_use]
    pub fn experiment_name(&self) -> &str {
        &self.experiment_name
    }

    /// Experiment config to attach to a job submission for this trial.
    #[must_use]
    pub fn experiment_config(&self, display_name: Option<&str>) -> ExperimentConfig {
        ExperimentConfig {
            experiment_name: self.experiment_name.clone(),
            trial_name: self.trial_name.clone(),
            trial_component_display_name: display_name.map(str::to_string),
        }
    }
}

/// Remote experiment-tracking API.
///
/// Every call is a one-shot mutation or read; callers do not retry.
pub trait TrackingService: Send + Sync {
    /// Create an experiment, or load it if one with this name exists.
    fn create_or_load_experiment(
        &self,
        experiment_name: &str,
        description: Option<&str>,
    ) -> impl Future<Output = Result<ExperimentHandle>> + Send;

    /// Create a uniquely named trial under an existing experiment.
    fn create_trial(
        &self,
        trial_name: &str,
        experiment_name: &str,
    ) -> impl Future<Output = Result<TrialHandle>> + Send;

    /// Record that `job_name` runs on behalf of a trial.
    fn attach_job(
        &self,
        trial_name: &str,
        job_name: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Move a trial to a new status.
    fn update_trial_status(
        &self,
        trial_name: &str,
        status: TrialStatus,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Append metric points for a trial.
    fn log_metrics(
        &self,
        trial_name: &str,
        metrics: Vec<MetricRecord>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Point-in-time copy of everything tracked, for analytics.
    fn snapshot(&self) -> impl Future<Output = Result<ExperimentStore>> + Send;
}

fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidInput(format!(
            "{kind} name must be 1..={MAX_NAME_LEN} characters, got {}",
            name.len()
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(Error::InvalidInput(format!(
            "{kind} name '{name}' may only contain letters, digits and hyphens"
        )));
    }
    Ok(())
}

/// In-process tracking service backed by `DashMap` tables.
#[derive(Debug, Default)]
pub struct LocalTracking {
    experiments: DashMap<String, ExperimentRecord>,
    trials: DashMap<String, TrialRecord>,
    metrics: DashMap<String, Vec<MetricRecord>>,
}

impl LocalTracking {
    /// Create an empty tracking service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_trial<F>(&self, trial_name: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut TrialRecord),
    {
        let mut trial = self
            .trials
            .get_mut(trial_name)
            .ok_or_else(|| Error::NotFound(format!("trial '{trial_name}'")))?;
        f(trial.value_mut());
        Ok(())
    }
}

impl TrackingService for LocalTracking {
    async fn create_or_load_experiment(
        &self,
        experiment_name: &str,
        description: Option<&str>,
    ) -> Result<ExperimentHandle> {
        validate_name("experiment", experiment_name)?;
        let created = match self.experiments.entry(experiment_name.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let mut builder = ExperimentRecord::builder(experiment_name);
                if let Some(description) = description {
                    builder = builder.description(description);
                }
                slot.insert(builder.build());
                true
            }
        };
        tracing::info!(experiment = experiment_name, created, "experiment ready");
        Ok(ExperimentHandle {
            experiment_name: experiment_name.to_string(),
            created,
        })
    }

    async fn create_trial(&self, trial_name: &str, experiment_name: &str) -> Result<TrialHandle> {
        validate_name("trial", trial_name)?;
        if !self.experiments.contains_key(experiment_name) {
            return Err(Error::NotFound(format!("experiment '{experiment_name}'")));
        }
        match self.trials.entry(trial_name.to_string()) {
            Entry::Occupied(_) => {
                return Err(Error::Conflict(format!("trial '{trial_name}'")));
            }
            Entry::Vacant(slot) => {
                slot.insert(TrialRecord::new(trial_name, experiment_name));
            }
        }
        tracing::info!(trial = trial_name, experiment = experiment_name, "trial created");
        Ok(TrialHandle {
            trial_name: trial_name.to_string(),
            experiment_name: experiment_name.to_string(),
        })
    }

    async fn attach_job(&self, trial_name: &str, job_name: &str) -> Result<()> {
        self.with_trial(trial_name, |trial| trial.attach_job(job_name))
    }

    async fn update_trial_status(&self, trial_name: &str, status: TrialStatus) -> Result<()> {
        self.with_trial(trial_name, |trial| trial.set_status(status))?;
        tracing::debug!(trial = trial_name, %status, "trial status updated");
        Ok(())
    }

    async fn log_metrics(&self, trial_name: &str, metrics: Vec<MetricRecord>) -> Result<()> {
        if !self.trials.contains_key(trial_name) {
            return Err(Error::NotFound(format!("trial '{trial_name}'")));
        }
        if let Some(stray) = metrics.iter().find(|m| m.trial_name() != trial_name) {
            return Err(Error::InvalidInput(format!(
                "metric for trial '{}' logged against '{trial_name}'",
                stray.trial_name()
            )));
        }
        let count = metrics.len();
        self.metrics
            .entry(trial_name.to_string())
            .or_default()
            .extend(metrics);
        tracing::debug!(trial = trial_name, count, "metrics logged");
        Ok(())
    }

    async fn snapshot(&self) -> Result<ExperimentStore> {
        let mut store = ExperimentStore::new();
        for experiment in &self.experiments {
            store.add_experiment(experiment.value().clone());
        }
        for trial in &self.trials {
            store.add_trial(trial.value().clone());
        }
        for series in &self.metrics {
            store.extend_metrics(series.value().iter().cloned());
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_trial_name_is_timestamped() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(trial_name("training-job", now), "training-job-2024-01-02-03-04-05-000");
    }

    #[tokio::test]
    async fn test_create_or_load_is_idempotent() {
        let tracking = LocalTracking::new();
        let first = tracking
            .create_or_load_experiment("pipe-demo", Some("demo"))
            .await
            .unwrap();
        let second = tracking
            .create_or_load_experiment("pipe-demo", None)
            .await
            .unwrap();
        assert!(first.created());
        assert!(!second.created());

        let store = tracking.snapshot().await.unwrap();
        assert_eq!(store.experiment_count(), 1);
        assert_eq!(
            store.get_experiment("pipe-demo").unwrap().description(),
            Some("demo")
        );
    }

    #[tokio::test]
    async fn test_create_trial_requires_experiment() {
        let tracking = LocalTracking::new();
        let err = tracking.create_trial("t-1", "missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_trial_conflicts() {
        let tracking = LocalTracking::new();
        tracking.create_or_load_experiment("exp", None).await.unwrap();
        tracking.create_trial("t-1", "exp").await.unwrap();
        let err = tracking.create_trial("t-1", "exp").await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_invalid_names_rejected() {
        let tracking = LocalTracking::new();
        assert!(tracking.create_or_load_experiment("", None).await.is_err());
        assert!(tracking
            .create_or_load_experiment("has_underscore", None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_log_metrics_and_status() {
        let tracking = LocalTracking::new();
        tracking.create_or_load_experiment("exp", None).await.unwrap();
        let trial = tracking.create_trial("t-1", "exp").await.unwrap();

        tracking.attach_job("t-1", "job-1").await.unwrap();
        tracking
            .log_metrics("t-1", vec![MetricRecord::new("t-1", "loss", 0, 0.4)])
            .await
            .unwrap();
        tracking
            .update_trial_status("t-1", TrialStatus::Completed)
            .await
            .unwrap();

        let store = tracking.snapshot().await.unwrap();
        let record = store.get_trial(trial.trial_name()).unwrap();
        assert_eq!(record.status(), TrialStatus::Completed);
        assert_eq!(record.job_name(), Some("job-1"));
        assert_eq!(store.metric_count(), 1);
    }

    #[tokio::test]
    async fn test_log_metrics_rejects_foreign_trial() {
        let tracking = LocalTracking::new();
        tracking.create_or_load_experiment("exp", None).await.unwrap();
        tracking.create_trial("t-1", "exp").await.unwrap();
        let err = tracking
            .log_metrics("t-1", vec![MetricRecord::new("t-2", "loss", 0, 0.4)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_experiment_config_serializes_pascal_case() {
        let handle = TrialHandle {
            trial_name: "t-1".to_string(),
            experiment_name: "exp".to_string(),
        };
        let json = serde_json::to_value(handle.experiment_config(Some("Training"))).unwrap();
        assert_eq!(json["ExperimentName"], "exp");
        assert_eq!(json["TrialName"], "t-1");
        assert_eq!(json["TrialComponentDisplayName"], "Training");
    }
}
