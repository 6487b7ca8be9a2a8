//! Parallel depth-first traversal over file pairs.
//!
//! A single shared LIFO stack feeds up to `nconc` workers. Each worker
//! loops take → work → give/fail. A worker that finds the stack empty must
//! not exit while other workers are still active, because they may give
//! more work; it blocks on the condition variable instead. The traversal
//! terminates when the stack is empty and nothing is in flight, or
//! promptly after the first failure or cancellation.

use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::{EngineError, Result};
use crate::pair::FilePair;

/// How often a blocked worker rechecks for cancellation. The cancel
/// watcher broadcasts immediately; this bounds the window in which the
/// watcher itself has not yet observed the token.
const CANCEL_POLL: Duration = Duration::from_millis(100);

struct DfsState {
    stack: Vec<FilePair>,
    in_flight: usize,
    failed: bool,
}

struct PairDfs {
    state: Mutex<DfsState>,
    cond: Condvar,
}

impl PairDfs {
    fn new(roots: Vec<FilePair>) -> Self {
        Self {
            state: Mutex::new(DfsState {
                stack: roots,
                in_flight: 0,
                failed: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Pops the next pair and marks it in-flight. Returns `None` if the
    /// traversal should stop. Either `give` or `fail` must be called
    /// exactly once after a successful take.
    fn take(&self, token: &CancelToken) -> Option<FilePair> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        // Even with an empty stack we must wait until the other workers
        // have gone idle, since they may still give more work.
        while state.stack.is_empty() && state.in_flight > 0 && !state.failed {
            if token.is_cancelled() {
                break;
            }
            let (guard, _) = self
                .cond
                .wait_timeout(state, CANCEL_POLL)
                .unwrap_or_else(|e| e.into_inner());
            state = guard;
        }

        if state.failed || token.is_cancelled() {
            return None;
        }

        let pair = state.stack.pop()?;
        state.in_flight += 1;
        Some(pair)
    }

    /// Pushes new pairs onto the stack and releases the previous one.
    fn give(&self, pairs: Vec<FilePair>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let went_nonempty = state.stack.is_empty() && !pairs.is_empty();
        state.stack.extend(pairs);
        state.in_flight -= 1;

        if went_nonempty || (state.stack.is_empty() && state.in_flight == 0) {
            self.cond.notify_all();
        }
    }

    /// Marks the traversal as failed and releases the previous pair. The
    /// remaining workers stop at their next take.
    fn fail(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_flight -= 1;
        if !state.failed {
            state.failed = true;
            self.cond.notify_all();
        }
    }

    /// Marks the traversal as failed without releasing a pair. Used by
    /// the cancellation watcher.
    fn abort(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.failed {
            state.failed = true;
            self.cond.notify_all();
        }
    }

    fn worker<F>(&self, token: &CancelToken, fun: &F) -> Option<EngineError>
    where
        F: Fn(&CancelToken, FilePair) -> Result<Vec<FilePair>> + Sync,
    {
        loop {
            let Some(pair) = self.take(token) else {
                return token.is_cancelled().then_some(EngineError::Cancelled);
            };
            match fun(token, pair) {
                Ok(children) => self.give(children),
                Err(err) => {
                    self.fail();
                    return Some(err);
                }
            }
        }
    }
}

/// Runs a parallel depth-first traversal over a set of roots.
///
/// `fun` performs the action for one pair and returns the children to be
/// processed next. There are no guarantees that deep entries are
/// processed first, so `fun` must do all preparations needed for its
/// returned children to succeed. `nconc` bounds the parallel invocations
/// of `fun`.
pub(crate) fn run<F>(
    token: &CancelToken,
    roots: Vec<FilePair>,
    nconc: usize,
    fun: F,
) -> Result<()>
where
    F: Fn(&CancelToken, FilePair) -> Result<Vec<FilePair>> + Sync,
{
    let dfs = PairDfs::new(roots);
    let fun = &fun;
    let dfs_ref = &dfs;

    let results = thread::scope(|scope| {
        let watcher_stop = CancelToken::new();
        let watcher = {
            let watcher_stop = watcher_stop.clone();
            scope.spawn(move || {
                loop {
                    if token.wait_timeout(CANCEL_POLL) {
                        dfs_ref.abort();
                        return;
                    }
                    if watcher_stop.is_cancelled() {
                        return;
                    }
                }
            })
        };

        let handles: Vec<_> = (0..nconc)
            .map(|_| scope.spawn(move || dfs_ref.worker(token, fun)))
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join()).collect();

        watcher_stop.cancel();
        let _ = watcher.join();
        results
    });

    let mut cancelled = false;
    for result in results {
        match result.expect("traversal worker panicked") {
            None => {}
            Some(EngineError::Cancelled) => cancelled = true,
            Some(err) => return Err(err),
        }
    }
    if cancelled || token.is_cancelled() {
        return Err(EngineError::Cancelled);
    }
    Ok(())
}
