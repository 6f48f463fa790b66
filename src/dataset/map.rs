//! Per-record transformation

use crate::{Error, Result};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::collections::VecDeque;

/// Sequential decode stage. Fuses after the first error.
pub struct MapRecords<I, F> {
    inner: I,
    f: F,
    done: bool,
}

impl<I, F> MapRecords<I, F> {
    pub(crate) const fn new(inner: I, f: F) -> Self {
        Self {
            inner,
            f,
            done: false,
        }
    }
}

impl<I, F, T, U> Iterator for MapRecords<I, F>
where
    I: Iterator<Item = Result<T>>,
    F: FnMut(T) -> Result<U>,
{
    type Item = Result<U>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = match self.inner.next()? {
            Ok(value) => (self.f)(value),
            Err(err) => Err(err),
        };
        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }
}

/// Bounded-parallel decode stage.
///
/// Pulls windows of `workers` items, decodes a window on a dedicated rayon
/// pool and hands results back in input order. At most one window is in
/// flight, which bounds memory to `workers` decoded items.
pub struct MapParallel<I, F, U> {
    inner: I,
    f: F,
    pool: ThreadPool,
    workers: usize,
    ready: VecDeque<Result<U>>,
    done: bool,
}

impl<I, F, U> MapParallel<I, F, U> {
    pub(crate) fn new(inner: I, f: F, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::InvalidInput(
                "parallel decode needs at least one worker".to_string(),
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("pipemode-decode-{i}"))
            .build()
            .map_err(|e| Error::Other(format!("failed to build decode pool: {e}")))?;
        Ok(Self {
            inner,
            f,
            pool,
            workers,
            ready: VecDeque::with_capacity(workers),
            done: false,
        })
    }

    /// Number of decode threads.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }
}

impl<I, F, T, U> MapParallel<I, F, U>
where
    I: Iterator<Item = Result<T>>,
    F: Fn(T) -> Result<U> + Send + Sync,
    T: Send,
    U: Send,
{
    fn fill(&mut self) {
        let mut window = Vec::with_capacity(self.workers);
        let mut upstream_err = None;
        while window.len() < self.workers {
            match self.inner.next() {
                Some(Ok(value)) => window.push(value),
                Some(Err(err)) => {
                    upstream_err = Some(err);
                    break;
                }
                None => break,
            }
        }

        if !window.is_empty() {
            let f = &self.f;
            let decoded: Vec<Result<U>> = self
                .pool
                .install(|| window.into_par_iter().map(f).collect());
            for item in decoded {
                let failed = item.is_err();
                self.ready.push_back(item);
                if failed {
                    self.done = true;
                    return;
                }
            }
        }

        if let Some(err) = upstream_err {
            self.ready.push_back(Err(err));
            self.done = true;
        } else if self.ready.is_empty() {
            self.done = true;
        }
    }
}

impl<I, F, T, U> Iterator for MapParallel<I, F, U>
where
    I: Iterator<Item = Result<T>>,
    F: Fn(T) -> Result<U> + Send + Sync,
    T: Send,
    U: Send,
{
    type Item = Result<U>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.ready.is_empty() && !self.done {
            self.fill();
        }
        self.ready.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::RecordStreamExt;

    fn numbers(n: u32) -> impl Iterator<Item = Result<u32>> {
        (0..n).map(Ok)
    }

    #[test]
    fn test_map_records_applies_function() {
        let doubled: Vec<u32> = numbers(4)
            .map_records(|v| Ok(v * 2))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(doubled, vec![0, 2, 4, 6]);
    }

    #[test]
    fn test_map_records_decode_error_fuses() {
        let mut mapped = numbers(5).map_records(|v| {
            if v == 1 {
                Err(Error::Decode(format!("bad record {v}")))
            } else {
                Ok(v)
            }
        });
        assert_eq!(mapped.next().unwrap().unwrap(), 0);
        assert!(mapped.next().unwrap().is_err());
        assert!(mapped.next().is_none());
    }

    #[test]
    fn test_map_parallel_preserves_order() {
        let out: Vec<u32> = numbers(103)
            .map_parallel(|v| Ok(v + 1), 4)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(out, (1..104).collect::<Vec<_>>());
    }

    #[test]
    fn test_map_parallel_zero_workers_rejected() {
        assert!(numbers(3).map_parallel(Ok, 0).is_err());
    }

    #[test]
    fn test_map_parallel_stops_at_first_failure() {
        let out: Vec<Result<u32>> = numbers(20)
            .map_parallel(
                |v| {
                    if v == 5 {
                        Err(Error::Decode("five".to_string()))
                    } else {
                        Ok(v)
                    }
                },
                3,
            )
            .unwrap()
            .collect();
        assert_eq!(out.len(), 6);
        assert!(out[..5].iter().all(Result::is_ok));
        assert!(out[5].is_err());
    }

    #[test]
    fn test_map_parallel_forwards_upstream_error() {
        let upstream = numbers(2).chain(std::iter::once(Err(Error::QueueClosed)));
        let out: Vec<Result<u32>> = upstream.map_parallel(Ok, 8).unwrap().collect();
        assert_eq!(out.len(), 3);
        assert!(matches!(out[2], Err(Error::QueueClosed)));
    }
}
