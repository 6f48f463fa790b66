//! Streaming record dataset
//!
//! Presents the records of a channel as a lazy pull-based sequence that can be
//! replayed, read ahead, decoded and batched before it reaches a training
//! loop. Nothing is materialized on local disk; each pass streams from the
//! channel source.
//!
//! ## Pipeline
//!
//! ```text
//! ChannelSource ──open_pass──> RecordReader ──> Records (repeat)
//!                                                  │
//!                        prefetch(k) ─> map_records / map_parallel ─> batch(m)
//! ```
//!
//! Every stage yields `Result` items. The first error is yielded once and the
//! stage then ends; a failed pass is fatal, not retried mid-stream.
//!
//! ## Example
//!
//! ```rust
//! use pipemode::channel::{ChannelRef, MemoryChannel};
//! use pipemode::dataset::{RecordStreamExt, StreamingDataset};
//! use pipemode::record::RecordFormat;
//!
//! # fn main() -> pipemode::Result<()> {
//! let source = MemoryChannel::from_records([b"ab", b"cd", b"ef"])?;
//! let channel = ChannelRef::new("training", RecordFormat::TfRecord)?;
//!
//! let batches = StreamingDataset::new(channel, source)
//!     .repeat(2)?
//!     .records()
//!     .prefetch(4)
//!     .map_records(|raw| Ok(raw.len()))
//!     .batch(2)?
//!     .collect::<pipemode::Result<Vec<_>>>()?;
//!
//! assert_eq!(batches, vec![vec![2, 2], vec![2, 2], vec![2, 2]]);
//! # Ok(())
//! # }
//! ```

mod batch;
mod map;
mod prefetch;

pub use batch::Batch;
pub use map::{MapParallel, MapRecords};
pub use prefetch::Prefetch;

use crate::channel::{ChannelRef, ChannelSource, PassReader};
use crate::job::TrainingJobConfig;
use crate::record::{RecordReader, DEFAULT_MAX_RECORD_BYTES};
use crate::{Error, Result};

/// How many passes to make over the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Passes {
    /// Exactly this many passes (at least one)
    Finite(usize),
    /// Keep reopening the channel until a pass delivers no records
    Forever,
}

/// Streaming dataset over one named channel.
///
/// Configuration only; call [`records`](Self::records) to start streaming.
#[derive(Debug)]
pub struct StreamingDataset<S> {
    channel: ChannelRef,
    source: S,
    passes: Passes,
    verify_payload: bool,
    max_record_bytes: u64,
}

impl<S: ChannelSource> StreamingDataset<S> {
    /// Dataset reading `channel` from `source`, one pass.
    pub fn new(channel: ChannelRef, source: S) -> Self {
        Self {
            channel,
            source,
            passes: Passes::Finite(1),
            verify_payload: true,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
        }
    }

    /// Dataset for a channel the job configuration declares.
    ///
    /// # Errors
    /// Returns `Error::Config` if `config` has no channel named `name`
    pub fn from_job(config: &TrainingJobConfig, name: &str, source: S) -> Result<Self> {
        let channel = config.channel_ref(name)?;
        Ok(Self::new(channel, source))
    }

    /// Make `passes` full passes over the channel, reopening it each time.
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` if `passes` is zero
    pub fn repeat(mut self, passes: usize) -> Result<Self> {
        if passes == 0 {
            return Err(Error::InvalidInput(
                "repeat count must be at least 1".to_string(),
            ));
        }
        self.passes = Passes::Finite(passes);
        Ok(self)
    }

    /// Reopen the channel indefinitely.
    ///
    /// The sequence ends at the first pass that delivers no records, so an
    /// empty channel does not spin.
    #[must_use]
    pub fn repeat_forever(mut self) -> Self {
        self.passes = Passes::Forever;
        self
    }

    /// Enable or disable payload checksum verification.
    #[must_use]
    pub fn verify_payload(mut self, verify: bool) -> Self {
        self.verify_payload = verify;
        self
    }

    /// Upper bound for a single record payload.
    #[must_use]
    pub fn max_record_bytes(mut self, max: u64) -> Self {
        self.max_record_bytes = max;
        self
    }

    /// Channel being read.
    #[must_use]
    pub const fn channel(&self) -> &ChannelRef {
        &self.channel
    }

    /// Configured pass count.
    #[must_use]
    pub const fn passes(&self) -> Passes {
        self.passes
    }

    /// Start streaming raw records.
    #[must_use]
    pub fn records(self) -> Records<S> {
        Records {
            dataset: self,
            pass: 0,
            pass_records: 0,
            current: None,
            done: false,
        }
    }
}

/// Raw record iterator across all passes of a [`StreamingDataset`].
pub struct Records<S> {
    dataset: StreamingDataset<S>,
    pass: usize,
    pass_records: u64,
    current: Option<RecordReader<PassReader>>,
    done: bool,
}

impl<S: ChannelSource> Records<S> {
    /// Pass currently being read (0-based).
    #[must_use]
    pub const fn pass(&self) -> usize {
        self.pass
    }

    fn open_next_pass(&mut self) -> Result<()> {
        let name = self.dataset.channel.name();
        let reader = self.dataset.source.open_pass(name, self.pass)?;
        tracing::debug!(channel = name, pass = self.pass, "pass opened");
        self.current = Some(
            self.dataset
                .channel
                .format()
                .reader(reader, name)
                .verify_payload(self.dataset.verify_payload)
                .max_record_bytes(self.dataset.max_record_bytes),
        );
        self.pass_records = 0;
        Ok(())
    }

    fn more_passes(&self) -> bool {
        match self.dataset.passes {
            Passes::Finite(total) => self.pass < total,
            Passes::Forever => true,
        }
    }
}

impl<S: ChannelSource> Iterator for Records<S> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if self.current.is_none() {
                if !self.more_passes() {
                    self.done = true;
                    return None;
                }
                if let Err(err) = self.open_next_pass() {
                    tracing::warn!(
                        channel = self.dataset.channel.name(),
                        pass = self.pass,
                        error = %err,
                        "failed to open pass"
                    );
                    self.done = true;
                    return Some(Err(err));
                }
            }

            let reader = self.current.as_mut()?;
            match reader.next() {
                Some(Ok(record)) => {
                    self.pass_records += 1;
                    return Some(Ok(record));
                }
                Some(Err(err)) => {
                    self.done = true;
                    self.current = None;
                    return Some(Err(err));
                }
                None => {
                    tracing::debug!(
                        channel = self.dataset.channel.name(),
                        pass = self.pass,
                        records = self.pass_records,
                        "pass finished"
                    );
                    if self.dataset.passes == Passes::Forever && self.pass_records == 0 {
                        self.done = true;
                    }
                    self.current = None;
                    self.pass += 1;
                }
            }
        }
    }
}

impl<S: ChannelSource> std::iter::FusedIterator for Records<S> {}

/// Composition helpers for any stream of `Result` items.
pub trait RecordStreamExt<T>: Iterator<Item = Result<T>> + Sized {
    /// Read up to `depth` items ahead on a background thread.
    ///
    /// `depth == 0` disables read-ahead. Order and count are unchanged.
    /// At most `depth` items are pulled ahead of the consumer. The returned
    /// iterator blocks while waiting; inside a tokio runtime prefer driving
    /// it under `spawn_blocking`.
    fn prefetch(self, depth: usize) -> Prefetch<Self, T>
    where
        Self: Send + 'static,
        T: Send + 'static,
    {
        Prefetch::new(self, depth)
    }

    /// Apply a decode function to every item.
    fn map_records<U, F>(self, f: F) -> MapRecords<Self, F>
    where
        F: FnMut(T) -> Result<U>,
    {
        MapRecords::new(self, f)
    }

    /// Apply a decode function on a pool of `workers` threads, preserving order.
    ///
    /// # Errors
    /// Returns error if `workers` is zero or the thread pool cannot be built
    fn map_parallel<U, F>(self, f: F, workers: usize) -> Result<MapParallel<Self, F, U>>
    where
        F: Fn(T) -> Result<U> + Send + Sync,
        T: Send,
        U: Send,
    {
        MapParallel::new(self, f, workers)
    }

    /// Group `size` consecutive items into one `Vec`.
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` if `size` is zero
    fn batch(self, size: usize) -> Result<Batch<Self, T>> {
        Batch::new(self, size)
    }
}

impl<I, T> RecordStreamExt<T> for I where I: Iterator<Item = Result<T>> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::record::RecordFormat;

    fn dataset(records: &[&[u8]]) -> StreamingDataset<MemoryChannel> {
        let source = MemoryChannel::from_records(records).unwrap();
        let channel = ChannelRef::new("training", RecordFormat::TfRecord).unwrap();
        StreamingDataset::new(channel, source)
    }

    #[test]
    fn test_single_pass() {
        let records: Vec<Vec<u8>> = dataset(&[b"a", b"b"])
            .records()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn test_repeat_replays_in_order() {
        let records: Vec<Vec<u8>> = dataset(&[b"a", b"b", b"c"])
            .repeat(3)
            .unwrap()
            .records()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 9);
        assert_eq!(records[3], b"a".to_vec());
        assert_eq!(records[8], b"c".to_vec());
    }

    #[test]
    fn test_repeat_zero_rejected() {
        assert!(matches!(
            dataset(&[b"a"]).repeat(0),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_repeat_forever_takes_as_needed() {
        let records: Vec<Vec<u8>> = dataset(&[b"x", b"y"])
            .repeat_forever()
            .records()
            .take(7)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 7);
        assert_eq!(records[6], b"x".to_vec());
    }

    #[test]
    fn test_repeat_forever_empty_channel_terminates() {
        let source = MemoryChannel::new(Vec::new());
        let channel = ChannelRef::new("training", RecordFormat::TfRecord).unwrap();
        let count = StreamingDataset::new(channel, source)
            .repeat_forever()
            .records()
            .count();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_pass_counter_advances() {
        let mut records = dataset(&[b"a"]).repeat(2).unwrap().records();
        assert_eq!(records.pass(), 0);
        records.next().unwrap().unwrap();
        records.next().unwrap().unwrap();
        assert_eq!(records.pass(), 1);
        assert!(records.next().is_none());
    }

    #[test]
    fn test_malformed_header_fails_once() {
        let clean = MemoryChannel::from_records([&b"ok"[..], &b"bad"[..]]).unwrap();
        let mut raw = Vec::new();
        std::io::Read::read_to_end(&mut clean.open_pass("training", 0).unwrap(), &mut raw)
            .unwrap();
        // Corrupt the length checksum of the second frame
        raw[18 + 8] ^= 0x55;
        let corrupt = MemoryChannel::new(raw);

        let channel = ChannelRef::new("training", RecordFormat::TfRecord).unwrap();
        let mut records = StreamingDataset::new(channel, corrupt)
            .repeat(2)
            .unwrap()
            .records();
        assert_eq!(records.next().unwrap().unwrap(), b"ok".to_vec());
        assert!(matches!(
            records.next(),
            Some(Err(Error::MalformedRecord { offset: 18, .. }))
        ));
        assert!(records.next().is_none());
    }
}
