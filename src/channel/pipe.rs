//! Streaming-mode channel source
//!
//! In streaming ("Pipe") input mode the training service exposes each pass of
//! a channel as a separate named pipe under the input data directory:
//!
//! ```text
//! /opt/ml/input/data/training_0
//! /opt/ml/input/data/training_1
//! ...
//! ```
//!
//! Pass `n` reads `<root>/<channel>_<n>`. Regular files with the same names
//! work too, which is how the layout is exercised locally.

use super::{ChannelSource, PassReader};
use crate::{Error, Result};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Default input data directory inside a training container
pub const DEFAULT_INPUT_DIR: &str = "/opt/ml/input/data";

/// Channel delivered as one pipe per pass.
#[derive(Debug, Clone)]
pub struct PipeChannel {
    root: PathBuf,
}

impl PipeChannel {
    /// Pipes live under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the pipe for `channel` on pass `pass`.
    #[must_use]
    pub fn pass_path(&self, channel: &str, pass: usize) -> PathBuf {
        self.root.join(format!("{channel}_{pass}"))
    }

    /// Input data directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for PipeChannel {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_DIR)
    }
}

impl ChannelSource for PipeChannel {
    fn open_pass(&self, channel: &str, pass: usize) -> Result<PassReader> {
        let path = self.pass_path(channel, pass);
        tracing::debug!(channel, pass, path = %path.display(), "opening pipe");
        let file = File::open(&path).map_err(|e| {
            Error::delivery(channel, format!("cannot open {}: {e}", path.display()))
        })?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RecordReader, RecordWriter};

    #[test]
    fn test_pass_path_layout() {
        let pipe = PipeChannel::default();
        assert_eq!(
            pipe.pass_path("training", 3),
            PathBuf::from("/opt/ml/input/data/training_3")
        );
    }

    #[test]
    fn test_each_pass_opens_its_own_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = PipeChannel::new(dir.path());
        for (pass, payload) in [b"p0", b"p1"].iter().enumerate() {
            let mut writer = RecordWriter::new(File::create(pipe.pass_path("eval", pass)).unwrap());
            writer.write_record(*payload).unwrap();
            writer.finish().unwrap();
        }

        for (pass, payload) in [b"p0", b"p1"].iter().enumerate() {
            let reader = pipe.open_pass("eval", pass).unwrap();
            let record = RecordReader::new(reader, "eval").next().unwrap().unwrap();
            assert_eq!(record, *payload);
        }
    }

    #[test]
    fn test_missing_pass_is_delivery_error() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = PipeChannel::new(dir.path());
        let err = pipe.open_pass("training", 0).err().unwrap();
        assert!(matches!(err, Error::DataDelivery { .. }));
    }
}
