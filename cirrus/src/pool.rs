//! Bounded concurrency for per-item and per-resource work.

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use tokio::sync::Semaphore;

/// Runs asynchronous operations with at most `limit` in flight.
///
/// Operations are started in input order as slots free up; completion order
/// is not preserved by [`WorkerPool::try_run`].
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    limit: usize,
}

impl WorkerPool {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    /// Run `op` over every item, stopping at the first failure.
    ///
    /// Once an operation fails no new operation is started. Operations
    /// already in flight are driven to completion and their results
    /// dropped, then the first error is returned.
    pub async fn try_run<I, F, Fut, T, E>(&self, items: I, mut op: F) -> Result<Vec<T>, E>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut pending = items.into_iter();
        let mut in_flight = FuturesUnordered::new();
        let mut done = Vec::new();
        let mut first_error = None;

        loop {
            while first_error.is_none() && in_flight.len() < self.limit {
                match pending.next() {
                    Some(item) => in_flight.push(op(item)),
                    None => break,
                }
            }

            match in_flight.next().await {
                Some(Ok(value)) => {
                    if first_error.is_none() {
                        done.push(value);
                    }
                }
                Some(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                None => break,
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(done),
        }
    }

    /// Run `op` over every item and keep every output, in input order.
    ///
    /// Nothing is aborted: outputs carry their own success or failure.
    pub async fn collect<I, F, Fut, T>(&self, items: I, mut op: F) -> Vec<T>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = T>,
    {
        let semaphore = Semaphore::new(self.limit);
        let semaphore = &semaphore;

        let tasks = items.into_iter().map(|item| {
            let task = op(item);
            async move {
                // Permits are handed out in request order
                let _permit = semaphore.acquire().await;
                task.await
            }
        });
        join_all(tasks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
        started: AtomicUsize,
    }

    impl Gauge {
        fn enter(&self) {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_limit_is_respected() {
        let gauge = Gauge::default();
        let g = &gauge;
        let pool = WorkerPool::new(3);

        let out = pool
            .try_run(0..20u64, |i| async move {
                g.enter();
                tokio::time::sleep(Duration::from_millis(1 + i % 4)).await;
                g.exit();
                Ok::<_, String>(i)
            })
            .await
            .unwrap();

        assert_eq!(out.len(), 20);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(gauge.started.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn test_no_new_starts_after_failure() {
        let gauge = Gauge::default();
        let g = &gauge;
        let pool = WorkerPool::new(2);

        let result = pool
            .try_run(0..10u64, |i| async move {
                g.enter();
                if i == 1 {
                    g.exit();
                    return Err(format!("item {i} failed"));
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
                g.exit();
                Ok(i)
            })
            .await;

        assert_eq!(result.unwrap_err(), "item 1 failed");
        assert_eq!(gauge.started.load(Ordering::SeqCst), 2);
        // The in-flight sibling was drained
        assert_eq!(gauge.current.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_collect_keeps_order_and_failures() {
        let pool = WorkerPool::new(2);
        let out = pool
            .collect(vec![3u64, 1, 2], |i| async move {
                tokio::time::sleep(Duration::from_millis(i)).await;
                if i == 1 {
                    Err(i)
                } else {
                    Ok(i)
                }
            })
            .await;
        assert_eq!(out, vec![Ok(3), Err(1), Ok(2)]);
    }

    #[tokio::test]
    async fn test_collect_respects_limit() {
        let gauge = Gauge::default();
        let g = &gauge;
        let pool = WorkerPool::new(2);

        let out = pool
            .collect(0..8u64, |i| async move {
                g.enter();
                tokio::time::sleep(Duration::from_millis(2)).await;
                g.exit();
                i
            })
            .await;

        assert_eq!(out, (0..8).collect::<Vec<_>>());
        assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_zero_limit_runs_one_at_a_time() {
        let gauge = Gauge::default();
        let g = &gauge;

        let out = WorkerPool::new(0)
            .try_run(0..4u64, |i| async move {
                g.enter();
                tokio::time::sleep(Duration::from_millis(1)).await;
                g.exit();
                Ok::<_, String>(i)
            })
            .await
            .unwrap();

        assert_eq!(out.len(), 4);
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
    }
}
