//! In-memory channel source

use super::{ChannelSource, PassReader};
use crate::record::RecordWriter;
use crate::Result;
use std::io::Cursor;
use std::sync::Arc;

/// Channel backed by a shared byte buffer; every pass replays the same bytes.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    bytes: Arc<[u8]>,
}

impl MemoryChannel {
    /// Wrap already-framed bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Frame `records` as TFRecord and wrap the result.
    ///
    /// # Errors
    /// Returns error if framing fails
    pub fn from_records<I, B>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let mut writer = RecordWriter::new(Vec::new());
        for record in records {
            writer.write_record(record.as_ref())?;
        }
        Ok(Self::new(writer.finish()?))
    }

    /// Total framed size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the channel carries no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl ChannelSource for MemoryChannel {
    fn open_pass(&self, _channel: &str, _pass: usize) -> Result<PassReader> {
        Ok(Box::new(Cursor::new(Arc::clone(&self.bytes))))
    }
}
