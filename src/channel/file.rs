//! File-backed channel source (full-download input mode)

use super::{ChannelSource, PassReader};
use crate::{Error, Result};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Channel whose bytes live in local files, read back to back in order.
///
/// A directory argument expands to its regular files sorted by name, which is
/// how a downloaded channel directory is laid out.
#[derive(Debug, Clone)]
pub struct FileChannel {
    files: Vec<PathBuf>,
}

impl FileChannel {
    /// Build from a file or a directory of files.
    ///
    /// # Errors
    /// Returns error if the path does not exist or cannot be listed
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_paths([path.as_ref()])
    }

    /// Build from several files and/or directories, kept in argument order.
    ///
    /// # Errors
    /// Returns error if any path does not exist or cannot be listed
    pub fn from_paths<I, P>(paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut files = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let meta = std::fs::metadata(path).map_err(|e| {
                Error::Config(format!("channel path {} is not readable: {e}", path.display()))
            })?;
            if meta.is_dir() {
                let mut entries = Vec::new();
                for entry in std::fs::read_dir(path)? {
                    let entry = entry?;
                    if entry.file_type()?.is_file() {
                        entries.push(entry.path());
                    }
                }
                entries.sort();
                files.extend(entries);
            } else {
                files.push(path.to_path_buf());
            }
        }
        Ok(Self { files })
    }

    /// Files read on every pass, in order.
    #[must_use]
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

/// Reads a list of files back to back, opening each one only when reached.
struct ConcatFiles {
    pending: std::vec::IntoIter<PathBuf>,
    current: Option<File>,
}

impl Read for ConcatFiles {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            if let Some(file) = self.current.as_mut() {
                let n = file.read(buf)?;
                if n > 0 || buf.is_empty() {
                    return Ok(n);
                }
                self.current = None;
            }
            match self.pending.next() {
                Some(path) => self.current = Some(File::open(path)?),
                None => return Ok(0),
            }
        }
    }
}

impl ChannelSource for FileChannel {
    fn open_pass(&self, channel: &str, pass: usize) -> Result<PassReader> {
        tracing::debug!(channel, pass, files = self.files.len(), "opening file channel");
        if let Some(missing) = self.files.iter().find(|p| !p.is_file()) {
            return Err(Error::delivery(
                channel,
                format!("file {} disappeared before pass {pass}", missing.display()),
            ));
        }
        Ok(Box::new(ConcatFiles {
            pending: self.files.clone().into_iter(),
            current: None,
        }))
    }
}
