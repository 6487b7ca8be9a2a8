//! Retry of idempotent operations on transient transport errors.

use std::time::Duration;

use tracing::warn;

use crate::cancel::CancelToken;
use crate::error::{EngineError, Result};

const INITIAL_DELAY: Duration = Duration::from_millis(300);
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Runs `fun` until it succeeds or fails with a non-retriable error.
///
/// Retriable errors back off exponentially from 300 ms, doubling up to a
/// one-minute cap. Cancellation during a back-off aborts with
/// [`EngineError::Cancelled`]; `fun` itself is never interrupted.
pub(crate) fn idempotent<F>(token: &CancelToken, mut fun: F) -> Result<()>
where
    F: FnMut() -> Result<()>,
{
    let mut delay = INITIAL_DELAY;
    loop {
        let err = match fun() {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        if !err.is_retriable() {
            return Err(err);
        }

        warn!(error = %err, backoff = ?delay, "retriable transfer error");
        if token.wait_timeout(delay) {
            return Err(EngineError::Cancelled);
        }

        delay = (delay * 2).min(MAX_DELAY);
    }
}
