//! Bounded worker pool.
//!
//! Purpose:
//!     Run a per-item async task over a list with at most `parallelism`
//!     items in flight. Lanes are plain futures joined on the caller's task,
//!     so they interleave at await points instead of running on threads.
//!
//! Notes:
//!     - One shared FIFO queue; each lane pops until empty or shutdown.
//!     - `shutdown` is polled before every pop. Items already started
//!       always run to completion (soft stop).
//!     - The first task error fails the whole run; retries belong inside
//!       the task (see `exec::retry`).
//!     - Results come back concatenated in lane order, not input order.

use anyhow::Result;
use futures::future::try_join_all;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

pub async fn run_bounded<T, R, S, F, Fut>(
    parallelism: usize,
    shutdown: S,
    items: Vec<T>,
    task: F,
) -> Result<Vec<R>>
where
    S: Fn() -> bool,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let lanes_count = parallelism.max(1);
    let total = items.len();
    let queue = Mutex::new(VecDeque::from(items));

    let queue = &queue;
    let shutdown = &shutdown;
    let task = &task;

    let lanes = (0..lanes_count).map(|lane| async move {
        let mut lane_results = Vec::new();
        loop {
            if shutdown() {
                debug!("lane {} stopping: shutdown requested", lane);
                break;
            }
            // Guard is dropped before the task is awaited.
            let next = queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(item) = next else {
                break;
            };
            lane_results.push(task(item).await?);
        }
        Ok::<_, anyhow::Error>(lane_results)
    });

    let per_lane = try_join_all(lanes).await?;
    let results: Vec<R> = per_lane.into_iter().flatten().collect();
    debug!("pool finished: {}/{} items over {} lanes", results.len(), total, lanes_count);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_parallelism_above_item_count_processes_each_once() {
        let seen = Mutex::new(Vec::new());
        let results = run_bounded(10, || false, vec![1, 2, 3], |x: u32| {
            seen.lock().unwrap().push(x);
            async move { Ok(x * 10) }
        })
        .await
        .unwrap();

        let mut sorted = results.clone();
        sorted.sort();
        assert_eq!(sorted, vec![10, 20, 30]);
        let mut seen = seen.into_inner().unwrap();
        seen.sort();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_empty_items() {
        let results: Vec<u32> = run_bounded(4, || false, Vec::<u32>::new(), |x| async move { Ok(x) })
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_single_lane_preserves_order() {
        let results = run_bounded(1, || false, vec![3, 1, 2], |x: u32| async move { Ok(x) })
            .await
            .unwrap();
        assert_eq!(results, vec![3, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_bounded_by_parallelism() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let items: Vec<u32> = (0..20).collect();

        let results = run_bounded(3, || false, items, |x| {
            let in_flight = &in_flight;
            let peak = &peak;
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(x)
            }
        })
        .await
        .unwrap();

        assert_eq!(results.len(), 20);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_shutdown_after_first_item_keeps_its_result() {
        let stop = AtomicBool::new(false);
        let results = run_bounded(1, || stop.load(Ordering::SeqCst), vec![1, 2, 3], |x: u32| {
            stop.store(true, Ordering::SeqCst);
            async move { Ok(x) }
        })
        .await
        .unwrap();

        assert_eq!(results, vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_never_drops_in_flight_items() {
        let stop = AtomicBool::new(false);
        let started = AtomicUsize::new(0);
        let results = run_bounded(4, || stop.load(Ordering::SeqCst), (0..10).collect(), |x: u32| {
            let stop = &stop;
            let started = &started;
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                stop.store(true, Ordering::SeqCst);
                Ok(x)
            }
        })
        .await
        .unwrap();

        // Every started item produced a result; nothing new started after stop.
        assert!(!results.is_empty());
        assert_eq!(results.len(), started.load(Ordering::SeqCst));
        assert!(results.len() < 10);
    }

    #[tokio::test]
    async fn test_task_error_fails_the_run() {
        let result = run_bounded(2, || false, vec![1, 2, 3, 4], |x: u32| async move {
            if x == 3 {
                Err(anyhow!("item {} failed", x))
            } else {
                Ok(x)
            }
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("item 3 failed"));
    }
}
