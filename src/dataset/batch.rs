//! Batching

use crate::{Error, Result};

/// Groups consecutive items into `Vec`s of a fixed size.
///
/// The stream is flat once repeated, so batches span pass boundaries and only
/// the very last batch can be short. With `drop_remainder(true)` that short
/// batch is discarded. An upstream error is yielded in place of the batch it
/// interrupted, and the stage ends.
pub struct Batch<I, T> {
    inner: I,
    size: usize,
    drop_remainder: bool,
    done: bool,
    _item: std::marker::PhantomData<fn() -> T>,
}

impl<I, T> Batch<I, T> {
    pub(crate) fn new(inner: I, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidInput(
                "batch size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            inner,
            size,
            drop_remainder: false,
            done: false,
            _item: std::marker::PhantomData,
        })
    }

    /// Discard a final batch smaller than the batch size.
    #[must_use]
    pub fn drop_remainder(mut self, drop: bool) -> Self {
        self.drop_remainder = drop;
        self
    }

    /// Configured batch size.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }
}

impl<I, T> Iterator for Batch<I, T>
where
    I: Iterator<Item = Result<T>>,
{
    type Item = Result<Vec<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut batch = Vec::with_capacity(self.size);
        while batch.len() < self.size {
            match self.inner.next() {
                Some(Ok(item)) => batch.push(item),
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if batch.is_empty() || (self.drop_remainder && batch.len() < self.size) {
            return None;
        }
        Some(Ok(batch))
    }
}
