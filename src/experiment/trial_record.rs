//! Trial Record - one tracked attempt within an experiment

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    /// Created, no job attached yet.
    Pending,
    /// A training job for this trial is running.
    Running,
    /// The job finished successfully.
    Completed,
    /// The job failed.
    Failed,
    /// The job was stopped.
    Stopped,
}

impl TrialStatus {
    /// Whether no further transitions are expected.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }
}

impl fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A trial groups the metrics of one training job under an experiment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrialRecord {
    trial_name: String,
    experiment_name: String,
    status: TrialStatus,
    job_name: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl TrialRecord {
    /// Create a new trial record in Pending status.
    #[must_use]
    pub fn new(trial_name: impl Into<String>, experiment_name: impl Into<String>) -> Self {
        Self {
            trial_name: trial_name.into(),
            experiment_name: experiment_name.into(),
            status: TrialStatus::Pending,
            job_name: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    /// Get the trial name.
    #[must_use]
    pub fn trial_name(&self) -> &str {
        &self.trial_name
    }

    /// Get the parent experiment name.
    #[must_use]
    pub fn experiment_name(&self) -> &str {
        &self.experiment_name
    }

    /// Get the current status.
    #[must_use]
    pub const fn status(&self) -> TrialStatus {
        self.status
    }

    /// Get the attached training job name, if any.
    #[must_use]
    pub fn job_name(&self) -> Option<&str> {
        self.job_name.as_deref()
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the start timestamp, if a job has started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Get the end timestamp, if the trial reached a terminal status.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Attach a training job and move to Running.
    pub fn attach_job(&mut self, job_name: impl Into<String>) {
        self.job_name = Some(job_name.into());
        self.set_status(TrialStatus::Running);
    }

    /// Move to `status`, stamping start/end times on the way.
    pub fn set_status(&mut self, status: TrialStatus) {
        let now = Utc::now();
        if status == TrialStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if status.is_terminal() {
            self.started_at.get_or_insert(now);
            self.ended_at = Some(now);
        }
        self.status = status;
    }
}
