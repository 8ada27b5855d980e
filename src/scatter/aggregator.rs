//! Driver-side result aggregation
//!
//! Reads the result channel until one completion signal per expected worker
//! has been seen. Completion signals are counted, everything else goes to
//! the caller's handler.

use crate::channel::{ResultReceiver, ResultTuple};
use crate::error::{FleetError, Result};
use std::time::{Duration, Instant};
use tracing::debug;

/// What a collection pass observed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    /// Tuples handed to the handler
    pub results: u64,

    /// Completion signals counted
    pub completions: usize,
}

/// Drain `results` until `expected_completions` completion signals arrive.
///
/// Blocks while the channel is empty. Asking for more completions than
/// there are workers blocks until every sender is gone, at which point
/// [`ChannelError::Closed`](crate::error::ChannelError::Closed) is returned.
pub fn collect<T, H>(
    mut handler: H,
    results: &ResultReceiver<T>,
    expected_completions: usize,
) -> Result<CollectStats>
where
    H: FnMut(ResultTuple<T>),
{
    let mut stats = CollectStats::default();
    let mut remaining = expected_completions;

    while remaining > 0 {
        let tuple = results.recv()?;
        if record(&mut stats, &mut remaining, &tuple) {
            handler(tuple);
        }
    }

    Ok(stats)
}

/// Like [`collect`], but gives up once `timeout` has elapsed.
///
/// Fails with [`FleetError::Timeout`] carrying the number of completion
/// signals still outstanding. Results handled before the deadline stay
/// handled.
pub fn collect_timeout<T, H>(
    mut handler: H,
    results: &ResultReceiver<T>,
    expected_completions: usize,
    timeout: Duration,
) -> Result<CollectStats>
where
    H: FnMut(ResultTuple<T>),
{
    let start = Instant::now();
    let deadline = start + timeout;
    let mut stats = CollectStats::default();
    let mut remaining = expected_completions;

    while remaining > 0 {
        let Some(tuple) = results.recv_deadline(deadline)? else {
            return Err(FleetError::Timeout {
                waited: start.elapsed(),
                remaining,
            });
        };
        if record(&mut stats, &mut remaining, &tuple) {
            handler(tuple);
        }
    }

    Ok(stats)
}

/// Count a tuple; returns true when it should go to the handler
fn record<T>(stats: &mut CollectStats, remaining: &mut usize, tuple: &ResultTuple<T>) -> bool {
    if tuple.is_completion() {
        *remaining -= 1;
        stats.completions += 1;
        debug!(
            host = %tuple.host,
            process = %tuple.process,
            remaining = *remaining,
            "Worker finished"
        );
        false
    } else {
        stats.results += 1;
        true
    }
}
