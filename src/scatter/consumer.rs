//! Job consumer, run by every worker (leaders included)
//!
//! Each consumer:
//! - Takes jobs from its host's job channel
//! - Runs the work function on every path, isolating failures
//! - Forwards non-empty results to the shared result channel
//! - Sends exactly one completion signal when it stops, whatever the reason

use crate::channel::{Job, JobReceiver, ResultSender, ResultTuple};
use crate::error::ChannelResult;
use crate::scatter::isolate;
use crate::topology::WorkerContext;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, trace, warn};

/// Statistics collected by a consumer
#[derive(Debug, Default)]
pub struct ConsumerStats {
    /// Path jobs taken from the channel
    pub jobs: AtomicU64,

    /// Results forwarded to the driver
    pub results: AtomicU64,

    /// Work calls that returned the empty marker
    pub empty: AtomicU64,

    /// Work calls that failed or panicked
    pub work_errors: AtomicU64,
}

impl ConsumerStats {
    fn record_job(&self) {
        self.jobs.fetch_add(1, Ordering::Relaxed);
    }

    fn record_result(&self) {
        self.results.fetch_add(1, Ordering::Relaxed);
    }

    fn record_empty(&self) {
        self.empty.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.work_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Jobs processed so far
    pub fn jobs_count(&self) -> u64 {
        self.jobs.load(Ordering::Relaxed)
    }

    /// Results forwarded so far
    pub fn results_count(&self) -> u64 {
        self.results.load(Ordering::Relaxed)
    }
}

/// Sends the worker's completion signal when dropped
struct CompletionGuard<'a, T> {
    ctx: &'a WorkerContext,
    results: &'a ResultSender<T>,
}

impl<T> Drop for CompletionGuard<'_, T> {
    fn drop(&mut self) {
        let signal = ResultTuple::completion(self.ctx.host.clone(), self.ctx.process);
        if let Err(e) = self.results.send(signal) {
            error!(
                host = %self.ctx.host,
                process = %self.ctx.process,
                error = %e,
                "Failed to send completion signal"
            );
        }
    }
}

/// Drain the job channel until `stop_after` sentinels have been taken.
///
/// With `stop_after == 1` the consumer stops on the first sentinel it sees.
/// The completion signal is sent on every exit path, including errors.
pub fn consume<T, F>(
    ctx: &WorkerContext,
    work: &F,
    jobs: &JobReceiver,
    results: &ResultSender<T>,
    stop_after: usize,
    stats: &ConsumerStats,
) -> ChannelResult<()>
where
    F: Fn(&str) -> anyhow::Result<Option<T>> + ?Sized,
{
    let _guard = CompletionGuard { ctx, results };
    let mut remaining = stop_after.max(1);

    debug!(host = %ctx.host, process = %ctx.process, "Consumer starting");

    loop {
        let path = match jobs.recv()? {
            Job::Sentinel => {
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
                continue;
            }
            Job::Path(path) => path,
        };

        stats.record_job();

        match isolate(|| work(&path)) {
            Ok(Some(value)) => {
                results.send(ResultTuple::output(ctx.host.clone(), ctx.process, path, value))?;
                stats.record_result();
            }
            Ok(None) => {
                trace!(process = %ctx.process, path = %path, "No result");
                stats.record_empty();
            }
            Err(e) => {
                stats.record_error();
                warn!(
                    host = %ctx.host,
                    process = %ctx.process,
                    path = %path,
                    error = %e,
                    "Work failed"
                );
            }
        }
    }

    debug!(
        host = %ctx.host,
        process = %ctx.process,
        jobs = stats.jobs_count(),
        results = stats.results_count(),
        "Consumer finished"
    );

    Ok(())
}
