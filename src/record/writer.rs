//! TFRecord frame writer

use super::crc::masked_crc32c;
use crate::Result;
use std::io::Write;

/// Writes length-prefixed, checksummed record frames.
pub struct RecordWriter<W: Write> {
    inner: W,
    records: u64,
}

impl<W: Write> RecordWriter<W> {
    /// Wrap a writer.
    pub const fn new(inner: W) -> Self {
        Self { inner, records: 0 }
    }

    /// Append one record frame.
    ///
    /// # Errors
    /// Returns error if the underlying writer fails
    pub fn write_record(&mut self, data: &[u8]) -> Result<()> {
        let len = (data.len() as u64).to_le_bytes();
        self.inner.write_all(&len)?;
        self.inner.write_all(&masked_crc32c(&len).to_le_bytes())?;
        self.inner.write_all(data)?;
        self.inner.write_all(&masked_crc32c(data).to_le_bytes())?;
        self.records += 1;
        Ok(())
    }

    /// Number of records written so far.
    #[must_use]
    pub const fn records_written(&self) -> u64 {
        self.records
    }

    /// Flush and return the inner writer.
    ///
    /// # Errors
    /// Returns error if flushing fails
    pub fn finish(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FOOTER_BYTES, HEADER_BYTES};

    #[test]
    fn test_frame_layout() {
        let mut writer = RecordWriter::new(Vec::new());
        writer.write_record(b"hello").unwrap();
        assert_eq!(writer.records_written(), 1);
        let bytes = writer.finish().unwrap();

        assert_eq!(bytes.len(), HEADER_BYTES + 5 + FOOTER_BYTES);
        assert_eq!(&bytes[..8], &5u64.to_le_bytes());
        assert_eq!(&bytes[HEADER_BYTES..HEADER_BYTES + 5], b"hello");
    }
}
