//! Named input channels
//!
//! A channel is a logical input stream declared to a training job. Each pass
//! over a dataset reopens the channel from the start, so a source only has to
//! hand out a fresh reader per pass.

mod file;
mod memory;
mod pipe;

pub use file::FileChannel;
pub use memory::MemoryChannel;
pub use pipe::PipeChannel;

use crate::record::RecordFormat;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Boxed byte stream for one pass over a channel
pub type PassReader = Box<dyn Read + Send>;

/// Name and record format of a logical input channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRef {
    name: String,
    format: RecordFormat,
}

impl ChannelRef {
    /// Create a channel reference.
    ///
    /// # Errors
    /// Returns error if the name is empty or contains characters outside
    /// `[A-Za-z0-9._-]`
    pub fn new(name: impl Into<String>, format: RecordFormat) -> Result<Self> {
        let name = name.into();
        validate_channel_name(&name)?;
        Ok(Self { name, format })
    }

    /// Channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record format.
    #[must_use]
    pub const fn format(&self) -> RecordFormat {
        self.format
    }
}

/// Check a channel name against the characters a job may declare.
///
/// # Errors
/// Returns `Error::Config` for empty names or disallowed characters
pub fn validate_channel_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Config("channel name must not be empty".to_string()));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(Error::Config(format!(
            "channel name '{name}' contains invalid character '{bad}'"
        )));
    }
    Ok(())
}

/// Something that can deliver the bytes of a channel, one pass at a time.
pub trait ChannelSource: Send + Sync {
    /// Open pass number `pass` (0-based) from the beginning of the channel.
    ///
    /// # Errors
    /// Returns `Error::DataDelivery` if the pass cannot be opened
    fn open_pass(&self, channel: &str, pass: usize) -> Result<PassReader>;
}

impl<S: ChannelSource + ?Sized> ChannelSource for std::sync::Arc<S> {
    fn open_pass(&self, channel: &str, pass: usize) -> Result<PassReader> {
        (**self).open_pass(channel, pass)
    }
}
