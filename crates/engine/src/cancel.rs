use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// A cancellation signal shared between the caller and the engine's
/// workers.
///
/// Cancelling is one-way and idempotent. Workers observe the token at
/// their suspension points: the traversal's take loop, the hardlink
/// coordination set, and retry backoff. An in-flight backend I/O call is
/// never interrupted; the worker stops at its next suspension point.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: Mutex<bool>,
    cond: Condvar,
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation and wakes every waiter.
    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock().unwrap_or_else(|e| e.into_inner());
        if !*cancelled {
            *cancelled = true;
            self.inner.cond.notify_all();
        }
    }

    /// Returns whether cancellation has been signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleeps for up to `dur`, waking early on cancellation. Returns
    /// whether the token was cancelled.
    #[must_use]
    pub fn wait_timeout(&self, dur: Duration) -> bool {
        let mut cancelled = self.inner.cancelled.lock().unwrap_or_else(|e| e.into_inner());
        let deadline = std::time::Instant::now() + dur;
        while !*cancelled {
            let now = std::time::Instant::now();
            let Some(remaining) = deadline.checked_duration_since(now).filter(|d| !d.is_zero())
            else {
                return false;
            };
            let (guard, _) = self
                .inner
                .cond
                .wait_timeout(cancelled, remaining)
                .unwrap_or_else(|e| e.into_inner());
            cancelled = guard;
        }
        true
    }
}
