//! Training job configuration and submission
//!
//! A job declares its compute shape, the channels it reads, how each channel
//! is delivered (streamed in Pipe mode or downloaded up front in File mode),
//! and the metric definitions used to scrape its logs. Submission is a single
//! call to a [`TrainingService`]; nothing is retried locally.
//!
//! ## Config file
//!
//! ```toml
//! base_job_name = "pipe-mode"
//! entry_point = "train.py"
//! framework_version = "2.3"
//! role = "arn:aws:iam::111122223333:role/TrainingRole"
//! input_mode = "Pipe"
//!
//! [resources]
//! instance_type = "ml.p3.2xlarge"
//! instance_count = 1
//!
//! [channels.training]
//! location = "s3://example-bucket/pipe-mode/train"
//!
//! [[metric_definitions]]
//! Name = "train:loss"
//! Regex = "loss: ([0-9\\.]+)"
//! ```

mod config;
mod service;

pub use config::{job_name, ChannelConfig, InputMode, ResourceConfig, TrainingJobConfig, MAX_JOB_NAME_LEN};
pub use service::{
    JobDescription, JobHandle, JobStatus, LocalTrainingService, TrainingJobRequest,
    TrainingService,
};
