//! Record framing
//!
//! Channels carry a sequence of opaque records in a length-prefixed binary
//! framing. The only framing currently supported is TFRecord:
//!
//! ```text
//! [8 bytes]  payload length (u64, little-endian)
//! [4 bytes]  masked CRC-32C of the length bytes
//! [N bytes]  payload
//! [4 bytes]  masked CRC-32C of the payload
//! ```
//!
//! ## Example
//!
//! ```rust
//! use pipemode::record::{RecordReader, RecordWriter};
//!
//! # fn main() -> pipemode::Result<()> {
//! let mut writer = RecordWriter::new(Vec::new());
//! writer.write_record(b"first")?;
//! writer.write_record(b"second")?;
//! let bytes = writer.finish()?;
//!
//! let records = RecordReader::new(bytes.as_slice(), "training")
//!     .collect::<pipemode::Result<Vec<_>>>()?;
//! assert_eq!(records[1], b"second");
//! # Ok(())
//! # }
//! ```

mod crc;
mod reader;
mod writer;

pub use crc::{crc32c, masked_crc32c};
pub use reader::{RecordReader, DEFAULT_MAX_RECORD_BYTES};
pub use writer::RecordWriter;

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Frame header size: length + length checksum
pub(crate) const HEADER_BYTES: usize = 12;

/// Frame footer size: payload checksum
pub(crate) const FOOTER_BYTES: usize = 4;

/// Record serialization format carried by a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RecordFormat {
    /// Length-prefixed, CRC-32C checked frames
    #[default]
    #[serde(rename = "TFRecord", alias = "tfrecord")]
    TfRecord,
}

impl RecordFormat {
    /// Build a reader for this format over `inner`.
    pub fn reader<R: std::io::Read>(self, inner: R, channel: &str) -> RecordReader<R> {
        match self {
            Self::TfRecord => RecordReader::new(inner, channel),
        }
    }
}

impl fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TfRecord => f.write_str("TFRecord"),
        }
    }
}

impl FromStr for RecordFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tfrecord" => Ok(Self::TfRecord),
            other => Err(Error::Config(format!(
                "unknown record format '{other}' (supported: TFRecord)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_format_parse() {
        assert_eq!("TFRecord".parse::<RecordFormat>().unwrap(), RecordFormat::TfRecord);
        assert_eq!("tfrecord".parse::<RecordFormat>().unwrap(), RecordFormat::TfRecord);
        assert!("RecordIO".parse::<RecordFormat>().is_err());
    }

    #[test]
    fn test_record_format_display_matches_serde() {
        let json = serde_json::to_string(&RecordFormat::TfRecord).unwrap();
        assert_eq!(json, format!("\"{}\"", RecordFormat::TfRecord));
    }
}
