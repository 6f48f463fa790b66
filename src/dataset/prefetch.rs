//! Bounded read-ahead
//!
//! A producer thread pulls from the upstream iterator and pushes into a
//! bounded `tokio` channel of capacity `depth`. The producer reserves a queue
//! slot before it pulls, so at most `depth` items are ever read ahead of the
//! consumer.
//!
//! The consumer waits with a plain thread-parking executor, so the stage works
//! on ordinary threads, under `spawn_blocking`, and inside a tokio runtime. On
//! a multi-thread runtime the wait runs under `block_in_place`; on a
//! current-thread runtime it stalls that runtime's other tasks until an item
//! arrives.

use crate::{Error, Result};
use std::thread::JoinHandle;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc;

enum State<I, T> {
    Direct(I),
    Buffered {
        receiver: mpsc::Receiver<Result<T>>,
        producer: Option<JoinHandle<()>>,
    },
    Finished,
}

/// Iterator that reads ahead of its consumer.
///
/// Dropping it closes the queue. The producer thread notices on its next
/// slot reservation and exits; it is not joined, so a producer blocked inside
/// a read (e.g. on a FIFO whose writer has not closed) stays parked until that
/// read returns.
pub struct Prefetch<I, T> {
    state: State<I, T>,
    depth: usize,
}

impl<I, T> Prefetch<I, T>
where
    I: Iterator<Item = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    pub(crate) fn new(inner: I, depth: usize) -> Self {
        if depth == 0 {
            return Self {
                state: State::Direct(inner),
                depth,
            };
        }

        let (sender, receiver) = mpsc::channel(depth);
        let producer = std::thread::Builder::new()
            .name("pipemode-prefetch".to_string())
            .spawn(move || produce(inner, &sender));

        let state = match producer {
            Ok(handle) => State::Buffered {
                receiver,
                producer: Some(handle),
            },
            Err(e) => {
                tracing::warn!(error = %e, "prefetch thread unavailable");
                // Upstream iterator was moved into the closure that failed to spawn
                let (sender, receiver) = mpsc::channel(1);
                let _ = sender.try_send(Err(Error::Other(format!(
                    "failed to spawn prefetch thread: {e}"
                ))));
                State::Buffered {
                    receiver,
                    producer: None,
                }
            }
        };

        Self { state, depth }
    }

    /// Configured read-ahead depth.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }
}

fn produce<I, T>(mut inner: I, sender: &mpsc::Sender<Result<T>>)
where
    I: Iterator<Item = Result<T>>,
{
    loop {
        // Reservation fails once the consumer has dropped the stage
        let Ok(permit) = futures::executor::block_on(sender.reserve()) else {
            return;
        };
        let Some(item) = inner.next() else {
            return;
        };
        let failed = item.is_err();
        permit.send(item);
        if failed {
            return;
        }
    }
}

/// Block the calling thread until the next queued item (or queue close).
fn recv_blocking<T>(receiver: &mut mpsc::Receiver<T>) -> Option<T> {
    // `unconstrained` keeps tokio's cooperative budget from parking the wait
    let mut recv = || futures::executor::block_on(tokio::task::unconstrained(receiver.recv()));
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(recv)
        }
        _ => recv(),
    }
}

impl<I, T> Iterator for Prefetch<I, T>
where
    I: Iterator<Item = Result<T>>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.state {
            State::Direct(inner) => inner.next(),
            State::Buffered { receiver, producer } => {
                if let Some(item) = recv_blocking(receiver) {
                    return Some(item);
                }
                let panicked = producer.take().is_some_and(|handle| handle.join().is_err());
                self.state = State::Finished;
                panicked.then_some(Err(Error::QueueClosed))
            }
            State::Finished => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::RecordStreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn numbers(n: u32) -> impl Iterator<Item = Result<u32>> + Send + 'static {
        (0..n).map(Ok)
    }

    #[test]
    fn test_prefetch_preserves_order() {
        let items: Vec<u32> = numbers(100).prefetch(4).collect::<Result<_>>().unwrap();
        assert_eq!(items, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_prefetch_zero_is_passthrough() {
        let prefetch = numbers(5).prefetch(0);
        assert_eq!(prefetch.depth(), 0);
        assert_eq!(prefetch.count(), 5);
    }

    #[test]
    fn test_prefetch_stops_after_error() {
        let upstream = (0..10u32).map(|i| {
            if i == 3 {
                Err(Error::Decode("boom".to_string()))
            } else {
                Ok(i)
            }
        });
        let mut prefetch = upstream.prefetch(2);
        let mut seen = Vec::new();
        for item in prefetch.by_ref() {
            match item {
                Ok(v) => seen.push(v),
                Err(e) => {
                    assert!(e.to_string().contains("boom"));
                    break;
                }
            }
        }
        assert_eq!(seen, vec![0, 1, 2]);
        assert!(prefetch.next().is_none());
    }

    #[test]
    fn test_producer_panic_reported() {
        let upstream = (0..5u32).map(|i| {
            assert!(i < 2, "decoder bug");
            Ok(i)
        });
        let items: Vec<Result<u32>> = upstream.prefetch(1).collect();
        assert_eq!(items.len(), 3);
        assert!(matches!(items[2], Err(Error::QueueClosed)));
    }

    #[test]
    fn test_dropping_consumer_releases_producer() {
        let mut prefetch = numbers(1_000_000).prefetch(2);
        assert_eq!(prefetch.next().unwrap().unwrap(), 0);
        drop(prefetch);
    }

    #[tokio::test]
    async fn test_prefetch_inside_current_thread_runtime() {
        let items: Vec<u32> = numbers(300).prefetch(4).collect::<Result<_>>().unwrap();
        assert_eq!(items, (0..300).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_prefetch_inside_multi_thread_runtime() {
        let items: Vec<u32> = numbers(300).prefetch(4).collect::<Result<_>>().unwrap();
        assert_eq!(items, (0..300).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_prefetch_under_spawn_blocking() {
        let count = tokio::task::spawn_blocking(|| numbers(50).prefetch(2).count())
            .await
            .unwrap();
        assert_eq!(count, 50);
    }

    #[test]
    fn test_read_ahead_bounded_by_depth() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulled);
        let upstream = (0..100u32).map(move |i| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(i)
        });

        let mut prefetch = upstream.prefetch(3);
        let deadline = Instant::now() + Duration::from_secs(5);
        while pulled.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(pulled.load(Ordering::SeqCst), 3);

        assert_eq!(prefetch.next().unwrap().unwrap(), 0);
        std::thread::sleep(Duration::from_millis(50));
        assert!(pulled.load(Ordering::SeqCst) <= 4);
    }
}
