//! Pipe-mode training walkthrough
//!
//! Runs the whole flow in-process:
//! 1. write a TFRecord channel laid out as per-pass pipes
//! 2. create an experiment and trial, submit a job tagged with them
//! 3. stream the channel (repeat, prefetch, parallel decode, batch)
//! 4. scrape metrics from the training log and query the trials table
//!
//! Run with: `cargo run --example pipe_mode_training`

use anyhow::{Context, Result};
use pipemode::analytics::{write_parquet, SearchExpression, SortOrder, TrialAnalytics};
use pipemode::channel::PipeChannel;
use pipemode::config::SessionConfig;
use pipemode::dataset::{RecordStreamExt, StreamingDataset};
use pipemode::experiment::{trial_name, LocalTracking, TrackingService, TrialStatus};
use pipemode::job::{
    ChannelConfig, JobStatus, LocalTrainingService, TrainingJobConfig, TrainingJobRequest,
    TrainingService,
};
use pipemode::metrics::{MetricDefinition, MetricExtractor};
use pipemode::record::RecordWriter;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

const EPOCHS: usize = 2;
const RECORDS: usize = 1_000;

/// Each record holds one `(x, y)` sample as two little-endian f32s.
fn write_pass_files(root: &Path, channel: &str) -> Result<()> {
    let pipes = PipeChannel::new(root);
    for pass in 0..EPOCHS {
        let file = File::create(pipes.pass_path(channel, pass))?;
        let mut writer = RecordWriter::new(BufWriter::new(file));
        for i in 0..RECORDS {
            #[allow(clippy::cast_precision_loss)]
            let x = i as f32 / RECORDS as f32;
            let y = 2.0f32.mul_add(x, 0.5);
            let mut record = Vec::with_capacity(8);
            record.extend_from_slice(&x.to_le_bytes());
            record.extend_from_slice(&y.to_le_bytes());
            writer.write_record(&record)?;
        }
        writer.finish()?;
    }
    Ok(())
}

fn decode(record: Vec<u8>) -> pipemode::Result<(f32, f32)> {
    let bytes: [u8; 8] = record
        .try_into()
        .map_err(|r: Vec<u8>| pipemode::Error::Decode(format!("expected 8 bytes, got {}", r.len())))?;
    let x = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let y = f32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    Ok((x, y))
}

#[tokio::main]
async fn main() -> Result<()> {
    let session = SessionConfig::load(None)?;
    pipemode::init_tracing(&session.log_filter)?;

    let workdir = tempfile::tempdir()?;
    write_pass_files(workdir.path(), "training")?;

    let config = TrainingJobConfig::new(
        "pipe-mode-demo",
        "train.py",
        "2.3",
        session
            .role
            .clone()
            .unwrap_or_else(|| "arn:aws:iam::111122223333:role/TrainingRole".to_string()),
    )
    .channel(
        "training",
        ChannelConfig::new(session.output_location("pipe-mode/train")),
    )
    .metric(MetricDefinition::new("train:loss", r"loss: ([0-9\.]+)"))
    .hyperparameter("epochs", EPOCHS)
    .hyperparameter("batch_size", 64);
    config.validate()?;

    // Experiment bookkeeping
    let tracking = LocalTracking::new();
    let experiment = tracking
        .create_or_load_experiment("pipe-mode-demo", Some("TFRecord streaming demo"))
        .await?;
    let trial = tracking
        .create_trial(
            &trial_name("training-job", chrono::Utc::now()),
            experiment.experiment_name(),
        )
        .await?;

    // Submission
    let service = LocalTrainingService::new();
    let request = TrainingJobRequest::new(config.clone())?
        .with_experiment(trial.experiment_config(Some("Training")));
    let job = service.submit(request).await?;
    tracking.attach_job(trial.trial_name(), job.job_name()).await?;
    info!(job = job.job_name(), trial = trial.trial_name(), "job submitted");

    // Training side: stream the channel off the async workers
    let dataset = StreamingDataset::from_job(&config, "training", PipeChannel::new(workdir.path()))?
        .repeat(EPOCHS)?;
    let (log, seen) = tokio::task::spawn_blocking(move || -> Result<(Vec<String>, usize)> {
        let mut log = Vec::new();
        let mut seen = 0usize;
        for (step, batch) in dataset
            .records()
            .prefetch(256)
            .map_parallel(decode, 4)?
            .batch(64)?
            .enumerate()
        {
            let batch = batch.context("training input failed")?;
            seen += batch.len();
            #[allow(clippy::cast_precision_loss)]
            let loss = batch
                .iter()
                .map(|(x, y)| (y - 2.0 * x).powi(2))
                .sum::<f32>()
                / batch.len() as f32;
            log.push(format!("step={step} loss: {loss:.6}"));
        }
        Ok((log, seen))
    })
    .await??;
    info!(records = seen, "training input exhausted");

    // Metrics from the job log
    let extractor = MetricExtractor::new(&config.metric_definitions)?;
    let metrics = extractor.scan(trial.trial_name(), log.iter().map(String::as_str));
    tracking.log_metrics(trial.trial_name(), metrics).await?;
    tracking
        .update_trial_status(trial.trial_name(), TrialStatus::Completed)
        .await?;
    service.finish(job.job_name(), JobStatus::Completed)?;

    let description = service.describe(job.job_name()).await?;
    println!("{} -> {:?}", description.job_name, description.status);

    // Analytics
    let store = tracking.snapshot().await?;
    let expr = SearchExpression::parse("ExperimentName = 'pipe-mode-demo' AND Status = 'Completed'")?
        .sort_by("train:loss - Last", SortOrder::Ascending)
        .max_results(10);
    let table = TrialAnalytics::table(&store, &expr)?;
    println!(
        "{} trial(s), {} column(s): {:?}",
        table.num_rows(),
        table.num_columns(),
        table
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect::<Vec<_>>()
    );

    let output = workdir.path().join("trials.parquet");
    write_parquet(&table, &output)?;
    println!("trials table written to {}", output.display());

    Ok(())
}
