//! Cooperative cancellation shared by the API client, the worker pool and
//! the interrupt handler.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// How often [`CancellationToken::run_until_cancelled`] re-checks the token
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A token that can be used to signal cancellation across threads.
///
/// Clones share state: cancelling any clone cancels all of them and wakes
/// every thread blocked in [`CancellationToken::sleep`].
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    /// Creates a new, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the token and wakes all sleepers.
    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        let mut cancelled = lock.lock().unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        cvar.notify_all();
    }

    /// Returns `true` if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks for `duration` unless cancelled first.
    ///
    /// Returns `true` if the full duration elapsed, `false` if the token was
    /// (or already is) cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let (lock, cvar) = &*self.inner;
        let mut cancelled = lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if *cancelled {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let (guard, _) = cvar
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            cancelled = guard;
        }
    }

    /// Runs a blocking call on a helper thread and waits for it unless the
    /// token is cancelled first.
    ///
    /// Returns `None` once cancellation is observed; the helper thread is
    /// left to finish on its own and its result is dropped. A panic in `f`
    /// is resumed on the calling thread.
    pub fn run_until_cancelled<T, F>(&self, f: F) -> Option<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_cancelled() {
            return None;
        }

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(panic::catch_unwind(AssertUnwindSafe(f)));
        });

        loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(value)) => return Some(value),
                Ok(Err(payload)) => panic::resume_unwind(payload),
                Err(RecvTimeoutError::Timeout) => {
                    if self.is_cancelled() {
                        return None;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}
