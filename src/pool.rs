//! Bounded-concurrency worker pool with ordered results.
//!
//! Items run on a dedicated rayon pool of `workers` threads. Each slot of the
//! output corresponds to the same index of the input regardless of
//! completion order. A failing or panicking item is recorded in its own slot
//! and never stops the others.

use rayon::prelude::*;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};

use crate::cancel::CancellationToken;
use crate::error::TaskError;

/// Result of one pool slot
pub type TaskResult<R, E> = Result<R, TaskError<E>>;

/// Fixed-size pool for running an item function over a slice
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl WorkerPool {
    /// Create a pool with `workers` threads (at least one)
    pub fn new(workers: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("extract-{}", i))
            .build()?;
        Ok(Self { pool, workers })
    }

    /// Number of worker threads
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `f` once per item and collect the outcomes in input order.
    ///
    /// `progress(completed, total)` is called after every finished item.
    /// Calls are serialized so `completed` strictly increases from one call
    /// to the next. Once `cancel` fires no new item is started; those slots
    /// hold [`TaskError::Cancelled`], while items already running finish
    /// normally.
    pub fn run<T, R, E, F, P>(
        &self,
        items: &[T],
        cancel: &CancellationToken,
        f: F,
        progress: P,
    ) -> Vec<TaskResult<R, E>>
    where
        T: Sync,
        R: Send,
        E: Send,
        F: Fn(&T) -> Result<R, E> + Sync,
        P: Fn(usize, usize) + Sync,
    {
        let total = items.len();
        let completed = Mutex::new(0usize);

        self.pool.install(|| {
            items
                .par_iter()
                .map(|item| {
                    if cancel.is_cancelled() {
                        return Err(TaskError::Cancelled);
                    }

                    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| f(item))) {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(e)) => Err(TaskError::Failed(e)),
                        Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
                    };

                    let mut done = completed.lock().unwrap_or_else(PoisonError::into_inner);
                    *done += 1;
                    progress(*done, total);

                    outcome
                })
                .collect()
        })
    }
}

/// Extract the message from a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_results_follow_input_order() {
        let pool = WorkerPool::new(4).unwrap();
        let items: Vec<u64> = (0..32).collect();

        // Later items finish first
        let results = pool.run(
            &items,
            &CancellationToken::new(),
            |&n| -> Result<u64, String> {
                thread::sleep(Duration::from_millis((32 - n) % 7));
                Ok(n * 10)
            },
            |_, _| {},
        );

        let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        let expected: Vec<u64> = items.iter().map(|n| n * 10).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn test_progress_counts_each_item_once() {
        let pool = WorkerPool::new(3).unwrap();
        let items: Vec<usize> = (0..20).collect();
        let seen = Mutex::new(Vec::new());

        pool.run(
            &items,
            &CancellationToken::new(),
            |&n| -> Result<usize, String> { Ok(n) },
            |done, total| {
                assert_eq!(total, 20);
                seen.lock().unwrap().push(done);
            },
        );

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen, (1..=20).collect::<Vec<_>>());
    }

    #[test]
    fn test_failures_and_panics_are_isolated() {
        let pool = WorkerPool::new(2).unwrap();
        let items = vec![1, 2, 3, 4];
        let calls = AtomicUsize::new(0);

        let results = pool.run(
            &items,
            &CancellationToken::new(),
            |&n| {
                calls.fetch_add(1, Ordering::SeqCst);
                match n {
                    2 => Err("bad file".to_string()),
                    3 => panic!("native fault"),
                    _ => Ok(n),
                }
            },
            |_, _| {},
        );

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(results[0], Ok(1));
        assert_eq!(results[1], Err(TaskError::Failed("bad file".to_string())));
        assert_eq!(
            results[2],
            Err(TaskError::Panicked("native fault".to_string()))
        );
        assert_eq!(results[3], Ok(4));
    }

    #[test]
    fn test_cancelled_before_start_runs_nothing() {
        let pool = WorkerPool::new(2).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicUsize::new(0);
        let progress_calls = AtomicUsize::new(0);

        let results = pool.run(
            &[1, 2, 3],
            &cancel,
            |&n: &i32| -> Result<i32, String> {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(n)
            },
            |_, _| {
                progress_calls.fetch_add(1, Ordering::SeqCst);
            },
        );

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(progress_calls.load(Ordering::SeqCst), 0);
        assert!(results.iter().all(|r| *r == Err(TaskError::Cancelled)));
    }

    #[test]
    fn test_cancel_mid_run_keeps_completed_slots() {
        let pool = WorkerPool::new(1).unwrap();
        let cancel = CancellationToken::new();
        let items: Vec<usize> = (0..10).collect();

        let results = pool.run(
            &items,
            &cancel,
            |&n| -> Result<usize, String> {
                if n == 2 {
                    cancel.cancel();
                }
                Ok(n)
            },
            |_, _| {},
        );

        let finished: Vec<usize> = results.iter().filter_map(|r| r.clone().ok()).collect();
        assert!(finished.contains(&2));
        assert!(finished.len() < items.len());
        for (i, r) in results.iter().enumerate() {
            if let Ok(v) = r {
                assert_eq!(*v, i);
            }
        }
    }

    #[test]
    fn test_zero_workers_is_clamped() {
        let pool = WorkerPool::new(0).unwrap();
        assert_eq!(pool.workers(), 1);
        let results = pool.run(
            &[7],
            &CancellationToken::new(),
            |&n: &i32| -> Result<i32, String> { Ok(n) },
            |_, _| {},
        );
        assert_eq!(results, vec![Ok(7)]);
    }

    #[test]
    fn test_empty_input() {
        let pool = WorkerPool::new(2).unwrap();
        let results = pool.run(
            &[] as &[i32],
            &CancellationToken::new(),
            |&n| -> Result<i32, String> { Ok(n) },
            |_, _| panic!("no progress expected"),
        );
        assert!(results.is_empty());
    }
}
