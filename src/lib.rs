//! # pipemode: streaming datasets for pipe-mode training jobs
//!
//! **Version**: 0.1.0
//!
//! Building blocks for a managed training job that streams its input instead
//! of downloading it first:
//!
//! - [`record`]: TFRecord framing (length + masked CRC-32C) reader and writer
//! - [`channel`]: named input channels backed by memory, files or per-pass FIFOs
//! - [`dataset`]: lazy repeat / prefetch / parallel map / batch over a channel
//! - [`job`]: training job configuration, naming and submission
//! - [`experiment`]: experiment and trial bookkeeping with metric series
//! - [`metrics`]: regex metric extraction from training logs
//! - [`analytics`]: filter tracked trials into an Arrow table, export to Parquet
//!
//! Remote services are async traits; `Local*` implementations run everything
//! in-process.
//!
//! ## Example Usage
//!
//! ```rust
//! use pipemode::channel::{ChannelRef, MemoryChannel};
//! use pipemode::dataset::{RecordStreamExt, StreamingDataset};
//! use pipemode::record::RecordFormat;
//!
//! # fn main() -> pipemode::Result<()> {
//! let source = MemoryChannel::from_records([b"x1", b"x2", b"x3"])?;
//! let channel = ChannelRef::new("train", RecordFormat::TfRecord)?;
//!
//! let mut total = 0;
//! for batch in StreamingDataset::new(channel, source)
//!     .repeat(2)?
//!     .records()
//!     .prefetch(4)
//!     .batch(2)?
//! {
//!     total += batch?.len();
//! }
//! assert_eq!(total, 6);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod analytics;
pub mod channel;
pub mod config;
pub mod dataset;
pub mod error;
pub mod experiment;
pub mod job;
pub mod metrics;
mod naming;
pub mod record;

pub use error::{Error, Result};

/// Install a global `tracing` subscriber writing to stderr.
///
/// `RUST_LOG` wins over `default_filter` when set. Calling this twice is
/// harmless; the second call leaves the first subscriber in place.
///
/// # Errors
/// `Error::Config` if `default_filter` is not a valid filter directive.
pub fn init_tracing(default_filter: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .map_err(|e| Error::Config(format!("invalid log filter '{default_filter}': {e}")))?,
    };

    if tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .is_err()
    {
        tracing::debug!("tracing subscriber already installed");
    }
    Ok(())
}
