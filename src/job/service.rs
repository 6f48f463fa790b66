//! Training job service: submit and describe jobs

use super::config::{job_name, InputMode, TrainingJobConfig};
use crate::experiment::ExperimentConfig;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

/// Hyperparameter key carrying the entry point script
const PROGRAM_HYPERPARAMETER: &str = "sagemaker_program";

/// A fully assembled submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJobRequest {
    job_name: String,
    config: TrainingJobConfig,
    experiment_config: Option<ExperimentConfig>,
}

impl TrainingJobRequest {
    /// Request with a time-derived job name.
    ///
    /// # Errors
    /// Returns `Error::Config` if the job configuration is invalid
    pub fn new(config: TrainingJobConfig) -> Result<Self> {
        let name = job_name(&config.base_job_name, Utc::now());
        Self::named(name, config)
    }

    /// Request with an explicit job name.
    ///
    /// # Errors
    /// Returns `Error::Config` if the job configuration is invalid
    pub fn named(job_name: impl Into<String>, config: TrainingJobConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            job_name: job_name.into(),
            config,
            experiment_config: None,
        })
    }

    /// Tag the job with experiment and trial identifiers.
    #[must_use]
    pub fn with_experiment(mut self, experiment_config: ExperimentConfig) -> Self {
        self.experiment_config = Some(experiment_config);
        self
    }

    /// Job name.
    #[must_use]
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Job configuration.
    #[must_use]
    pub const fn config(&self) -> &TrainingJobConfig {
        &self.config
    }

    /// Attached experiment config, if any.
    #[must_use]
    pub const fn experiment_config(&self) -> Option<&ExperimentConfig> {
        self.experiment_config.as_ref()
    }

    /// Request body in the training service's wire shape.
    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        let config = &self.config;
        let input_data: Vec<serde_json::Value> = config
            .channels
            .iter()
            .map(|(name, channel)| {
                serde_json::json!({
                    "ChannelName": name,
                    "DataSource": {
                        "S3DataSource": {
                            "S3DataType": "S3Prefix",
                            "S3Uri": channel.location,
                            "S3DataDistributionType": "FullyReplicated",
                        }
                    },
                    "InputMode": channel.input_mode.unwrap_or(config.input_mode),
                    "RecordFormat": channel.format,
                })
            })
            .collect();

        let mut hyperparameters = config.hyperparameter_strings();
        hyperparameters.insert(PROGRAM_HYPERPARAMETER.to_string(), config.entry_point.clone());

        let mut payload = serde_json::json!({
            "TrainingJobName": self.job_name,
            "AlgorithmSpecification": {
                "TrainingInputMode": config.input_mode,
                "FrameworkVersion": config.framework_version,
                "MetricDefinitions": config.metric_definitions,
            },
            "RoleArn": config.role,
            "InputDataConfig": input_data,
            "ResourceConfig": {
                "InstanceType": config.resources.instance_type,
                "InstanceCount": config.resources.instance_count,
                "VolumeSizeInGB": config.resources.volume_size_gb,
            },
            "HyperParameters": hyperparameters,
        });
        if let Some(experiment) = &self.experiment_config {
            let mut tags = serde_json::json!({
                "ExperimentName": experiment.experiment_name,
                "TrialName": experiment.trial_name,
            });
            if let Some(display_name) = &experiment.trial_component_display_name {
                tags["TrialComponentDisplayName"] = serde_json::json!(display_name);
            }
            payload["ExperimentConfig"] = tags;
        }
        payload
    }
}

/// Lifecycle of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Accepted and running
    InProgress,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Stopped on request
    Stopped,
}

impl JobStatus {
    /// Whether the job has finished.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Handle to a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    job_name: String,
    submitted_at: DateTime<Utc>,
}

impl JobHandle {
    /// Job name.
    #[must_use]
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Submission time.
    #[must_use]
    pub const fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

/// What the service reports about a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescription {
    /// Job name
    pub job_name: String,
    /// Current status
    pub status: JobStatus,
    /// Default input mode
    pub input_mode: InputMode,
    /// Declared channel names
    pub channels: Vec<String>,
    /// Experiment tags, if any
    pub experiment_config: Option<ExperimentConfig>,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// Time the job reached a terminal status
    pub ended_at: Option<DateTime<Utc>>,
    /// Submitted request body
    pub request: serde_json::Value,
}

/// Remote training-job API.
pub trait TrainingService: Send + Sync {
    /// Submit a job.
    fn submit(&self, request: TrainingJobRequest) -> impl Future<Output = Result<JobHandle>> + Send;

    /// Describe a submitted job.
    fn describe(&self, job_name: &str) -> impl Future<Output = Result<JobDescription>> + Send;
}

/// In-process training service backed by a `DashMap`.
///
/// Jobs are recorded as `InProgress`; a local harness finishes them with
/// [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct LocalTrainingService {
    jobs: DashMap<String, JobDescription>,
}

impl LocalTrainingService {
    /// Create an empty service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs submitted so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether no job was submitted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Move a running job to a terminal status.
    ///
    /// # Errors
    /// Returns error if the job is unknown, already finished, or `status` is
    /// not terminal
    pub fn finish(&self, job_name: &str, status: JobStatus) -> Result<()> {
        if !status.is_terminal() {
            return Err(Error::InvalidInput(format!(
                "cannot finish job with non-terminal status {status}"
            )));
        }
        let mut job = self
            .jobs
            .get_mut(job_name)
            .ok_or_else(|| Error::NotFound(format!("training job '{job_name}'")))?;
        if job.status.is_terminal() {
            return Err(Error::InvalidInput(format!(
                "training job '{job_name}' already {}",
                job.status
            )));
        }
        job.status = status;
        job.ended_at = Some(Utc::now());
        tracing::info!(job = job_name, %status, "training job finished");
        Ok(())
    }
}

impl TrainingService for LocalTrainingService {
    async fn submit(&self, request: TrainingJobRequest) -> Result<JobHandle> {
        let submitted_at = Utc::now();
        let description = JobDescription {
            job_name: request.job_name.clone(),
            status: JobStatus::InProgress,
            input_mode: request.config.input_mode,
            channels: request.config.channels.keys().cloned().collect(),
            experiment_config: request.experiment_config.clone(),
            created_at: submitted_at,
            ended_at: None,
            request: request.to_payload(),
        };
        match self.jobs.entry(request.job_name.clone()) {
            Entry::Occupied(_) => {
                return Err(Error::Conflict(format!("training job '{}'", request.job_name)));
            }
            Entry::Vacant(slot) => {
                slot.insert(description);
            }
        }
        tracing::info!(
            job = %request.job_name,
            input_mode = %request.config.input_mode,
            channels = request.config.channels.len(),
            "training job submitted"
        );
        Ok(JobHandle {
            job_name: request.job_name,
            submitted_at,
        })
    }

    async fn describe(&self, job_name: &str) -> Result<JobDescription> {
        self.jobs
            .get(job_name)
            .map(|job| job.value().clone())
            .ok_or_else(|| Error::NotFound(format!("training job '{job_name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ChannelConfig;
    use crate::metrics::MetricDefinition;

    fn config() -> TrainingJobConfig {
        TrainingJobConfig::new("pipe-mode", "train.py", "2.3", "arn:aws:iam::1:role/R")
            .channel("training", ChannelConfig::new("s3://bucket/train"))
            .metric(MetricDefinition::new("train:loss", r"loss: ([0-9\.]+)"))
            .hyperparameter("epochs", 2)
    }

    #[test]
    fn test_payload_shape() {
        let experiment = ExperimentConfig {
            experiment_name: "exp".to_string(),
            trial_name: "trial".to_string(),
            trial_component_display_name: None,
        };
        let request = TrainingJobRequest::named("job-1", config())
            .unwrap()
            .with_experiment(experiment);
        let payload = request.to_payload();

        assert_eq!(payload["TrainingJobName"], "job-1");
        assert_eq!(payload["AlgorithmSpecification"]["TrainingInputMode"], "Pipe");
        assert_eq!(
            payload["AlgorithmSpecification"]["MetricDefinitions"][0]["Name"],
            "train:loss"
        );
        assert_eq!(payload["InputDataConfig"][0]["ChannelName"], "training");
        assert_eq!(
            payload["InputDataConfig"][0]["DataSource"]["S3DataSource"]["S3Uri"],
            "s3://bucket/train"
        );
        assert_eq!(payload["HyperParameters"]["epochs"], "2");
        assert_eq!(payload["HyperParameters"]["sagemaker_program"], "train.py");
        assert_eq!(payload["ExperimentConfig"]["TrialName"], "trial");
    }

    #[test]
    fn test_payload_experiment_tags() {
        let untagged = TrainingJobRequest::named("job-2", config()).unwrap().to_payload();
        assert!(untagged.get("ExperimentConfig").is_none());

        let bare = TrainingJobRequest::named("job-3", config())
            .unwrap()
            .with_experiment(ExperimentConfig {
                experiment_name: "exp".to_string(),
                trial_name: "trial".to_string(),
                trial_component_display_name: None,
            })
            .to_payload();
        assert_eq!(bare["ExperimentConfig"]["ExperimentName"], "exp");
        assert!(bare["ExperimentConfig"].get("TrialComponentDisplayName").is_none());

        let named = TrainingJobRequest::named("job-4", config())
            .unwrap()
            .with_experiment(ExperimentConfig {
                experiment_name: "exp".to_string(),
                trial_name: "trial".to_string(),
                trial_component_display_name: Some("Training".to_string()),
            })
            .to_payload();
        assert_eq!(
            named["ExperimentConfig"],
            serde_json::json!({
                "ExperimentName": "exp",
                "TrialName": "trial",
                "TrialComponentDisplayName": "Training",
            })
        );
    }

    #[test]
    fn test_invalid_config_not_submittable() {
        let bad = TrainingJobConfig::new("pipe-mode", "train.py", "2.3", "");
        assert!(TrainingJobRequest::new(bad).is_err());
    }

    #[tokio::test]
    async fn test_submit_and_describe() {
        let service = LocalTrainingService::new();
        let request = TrainingJobRequest::new(config()).unwrap();
        let handle = service.submit(request).await.unwrap();
        assert!(handle.job_name().starts_with("pipe-mode-"));

        let job = service.describe(handle.job_name()).await.unwrap();
        assert_eq!(job.status, JobStatus::InProgress);
        assert_eq!(job.channels, vec!["training".to_string()]);

        service.finish(handle.job_name(), JobStatus::Completed).unwrap();
        let job = service.describe(handle.job_name()).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.ended_at.is_some());
        assert!(service.finish(handle.job_name(), JobStatus::Failed).is_err());
    }

    #[tokio::test]
    async fn test_duplicate_job_name_conflicts() {
        let service = LocalTrainingService::new();
        service
            .submit(TrainingJobRequest::named("job-1", config()).unwrap())
            .await
            .unwrap();
        let err = service
            .submit(TrainingJobRequest::named("job-1", config()).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(service.len(), 1);
    }

    #[tokio::test]
    async fn test_describe_unknown_job() {
        let service = LocalTrainingService::new();
        assert!(matches!(
            service.describe("nope").await,
            Err(Error::NotFound(_))
        ));
    }
}
