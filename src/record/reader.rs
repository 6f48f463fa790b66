//! Pull-based TFRecord frame reader

use super::crc::masked_crc32c;
use super::{FOOTER_BYTES, HEADER_BYTES};
use crate::{Error, Result};
use std::io::{ErrorKind, Read};

/// Default upper bound for a single record payload (256 MiB)
pub const DEFAULT_MAX_RECORD_BYTES: u64 = 256 * 1024 * 1024;

/// Iterator over the raw records of one framed byte stream.
///
/// Yields one `Vec<u8>` per record in stream order. The first error is
/// yielded once and the reader then reports end of stream; a bad frame is
/// never skipped.
pub struct RecordReader<R> {
    inner: R,
    channel: String,
    offset: u64,
    verify_payload: bool,
    max_record_bytes: u64,
    done: bool,
}

impl<R: Read> RecordReader<R> {
    /// Create a reader over `inner`. `channel` is only used in error messages.
    pub fn new(inner: R, channel: impl Into<String>) -> Self {
        Self {
            inner,
            channel: channel.into(),
            offset: 0,
            verify_payload: true,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
            done: false,
        }
    }

    /// Enable or disable payload checksum verification.
    ///
    /// The length checksum is always verified.
    #[must_use]
    pub const fn verify_payload(mut self, verify: bool) -> Self {
        self.verify_payload = verify;
        self
    }

    /// Reject frames whose declared length exceeds `max` bytes.
    #[must_use]
    pub const fn max_record_bytes(mut self, max: u64) -> Self {
        self.max_record_bytes = max;
        self
    }

    /// Bytes consumed so far (always on a frame boundary between records).
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Read until `buf` is full or the stream ends; returns bytes read.
    fn read_full(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn fail(&mut self, err: Error) -> Option<Result<Vec<u8>>> {
        self.done = true;
        tracing::warn!(channel = %self.channel, offset = self.offset, error = %err, "record stream failed");
        Some(Err(err))
    }

    fn truncated(&self, what: &str, got: usize, want: u64) -> Error {
        Error::delivery(
            &self.channel,
            format!(
                "stream ended inside record {what} at offset {} ({got} of {want} bytes)",
                self.offset
            ),
        )
    }

    fn malformed(&self, reason: impl Into<String>) -> Error {
        Error::MalformedRecord {
            offset: self.offset,
            reason: reason.into(),
        }
    }

    fn read_record(&mut self) -> Option<Result<Vec<u8>>> {
        let mut header = [0u8; HEADER_BYTES];
        match self.read_full(&mut header) {
            Ok(0) => {
                self.done = true;
                return None;
            }
            Ok(n) if n < HEADER_BYTES => {
                let err = self.truncated("header", n, HEADER_BYTES as u64);
                return self.fail(err);
            }
            Ok(_) => {}
            Err(e) => {
                let err = Error::delivery(&self.channel, e.to_string());
                return self.fail(err);
            }
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&header[..8]);
        let mut len_crc_bytes = [0u8; 4];
        len_crc_bytes.copy_from_slice(&header[8..]);

        if masked_crc32c(&len_bytes) != u32::from_le_bytes(len_crc_bytes) {
            let err = self.malformed("length checksum mismatch");
            return self.fail(err);
        }

        let len = u64::from_le_bytes(len_bytes);
        if len > self.max_record_bytes {
            let err = self.malformed(format!(
                "declared length {len} exceeds limit of {} bytes",
                self.max_record_bytes
            ));
            return self.fail(err);
        }
        let Ok(len_usize) = usize::try_from(len) else {
            let err = self.malformed(format!("declared length {len} does not fit in memory"));
            return self.fail(err);
        };

        let mut data = vec![0u8; len_usize];
        match self.read_full(&mut data) {
            Ok(n) if n < len_usize => {
                let err = self.truncated("payload", n, len);
                return self.fail(err);
            }
            Ok(_) => {}
            Err(e) => {
                let err = Error::delivery(&self.channel, e.to_string());
                return self.fail(err);
            }
        }

        let mut footer = [0u8; FOOTER_BYTES];
        match self.read_full(&mut footer) {
            Ok(n) if n < FOOTER_BYTES => {
                let err = self.truncated("footer", n, FOOTER_BYTES as u64);
                return self.fail(err);
            }
            Ok(_) => {}
            Err(e) => {
                let err = Error::delivery(&self.channel, e.to_string());
                return self.fail(err);
            }
        }

        if self.verify_payload && masked_crc32c(&data) != u32::from_le_bytes(footer) {
            let err = self.malformed("payload checksum mismatch");
            return self.fail(err);
        }

        self.offset += (HEADER_BYTES + FOOTER_BYTES) as u64 + len;
        Some(Ok(data))
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.read_record()
    }
}

impl<R: Read> std::iter::FusedIterator for RecordReader<R> {}
