//! Experiment tracking
//!
//! Experiments group trials; each trial is tied to one training job and owns
//! the metric series extracted from that job's logs.
//!
//! ## Schema Overview
//!
//! ```text
//! ExperimentRecord (1) ──< TrialRecord (N) ──< MetricRecord (N) [time-series]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use pipemode::experiment::{trial_name, LocalTracking, TrackingService};
//!
//! # async fn example() -> pipemode::Result<()> {
//! let tracking = LocalTracking::new();
//! let experiment = tracking
//!     .create_or_load_experiment("pipe-mode-demo", Some("TFRecord streaming"))
//!     .await?;
//!
//! let name = trial_name("training-job", chrono::Utc::now());
//! let trial = tracking.create_trial(&name, experiment.experiment_name()).await?;
//!
//! // Attach to the job submission
//! let experiment_config = trial.experiment_config(Some("Training"));
//! assert_eq!(experiment_config.trial_name, name);
//! # Ok(())
//! # }
//! ```

mod experiment_record;
mod metric_record;
mod store;
mod tracking;
mod trial_record;

pub use experiment_record::{ExperimentRecord, ExperimentRecordBuilder};
pub use metric_record::MetricRecord;
pub use store::ExperimentStore;
pub use tracking::{
    trial_name, ExperimentConfig, ExperimentHandle, LocalTracking, TrackingService, TrialHandle,
    MAX_NAME_LEN,
};
pub use trial_record::{TrialRecord, TrialStatus};
