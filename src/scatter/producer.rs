//! Job producer, run by a host's leader once per top directory
//!
//! Walks the directory, filters every file through the predicate and feeds
//! matches into the host's job channel. When the walk is over it posts one
//! sentinel per local consumer.

use crate::channel::{Job, JobSender};
use crate::error::ChannelResult;
use crate::scatter::isolate;
use crate::scatter::traversal::Traversal;
use crate::topology::WorkerContext;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Statistics collected by a producer
#[derive(Debug, Default)]
pub struct ProducerStats {
    /// Directories listed
    pub dirs: AtomicU64,

    /// Files offered to the predicate
    pub files_seen: AtomicU64,

    /// Paths accepted and queued
    pub matched: AtomicU64,

    /// Predicate calls that failed or panicked
    pub predicate_errors: AtomicU64,

    /// Files skipped because their path is not valid UTF-8
    pub non_utf8: AtomicU64,
}

impl ProducerStats {
    fn record_dir(&self) {
        self.dirs.fetch_add(1, Ordering::Relaxed);
    }

    fn record_file(&self) {
        self.files_seen.fetch_add(1, Ordering::Relaxed);
    }

    fn record_match(&self) {
        self.matched.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.predicate_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn record_non_utf8(&self) {
        self.non_utf8.fetch_add(1, Ordering::Relaxed);
    }

    /// Paths queued so far
    pub fn matched_count(&self) -> u64 {
        self.matched.load(Ordering::Relaxed)
    }

    /// Files seen so far
    pub fn files_count(&self) -> u64 {
        self.files_seen.load(Ordering::Relaxed)
    }
}

/// Walk `top_dir` and queue every file the predicate accepts.
///
/// Posts `sentinels` sentinels once the walk completes. Returns an error
/// only if the job channel closes underneath the producer, which happens
/// when every consumer on the host has already stopped.
pub fn produce<P, W>(
    ctx: &WorkerContext,
    predicate: &P,
    traversal: &W,
    top_dir: &Path,
    jobs: &JobSender,
    sentinels: usize,
    stats: &ProducerStats,
) -> ChannelResult<()>
where
    P: Fn(&str) -> anyhow::Result<bool> + ?Sized,
    W: Traversal + ?Sized,
{
    debug!(
        host = %ctx.host,
        process = %ctx.process,
        dir = %top_dir.display(),
        "Producer starting"
    );

    for listing in traversal.walk(top_dir) {
        stats.record_dir();

        for path in listing.paths() {
            let path = match path.into_os_string().into_string() {
                Ok(path) => path,
                Err(raw) => {
                    stats.record_non_utf8();
                    warn!(
                        host = %ctx.host,
                        process = %ctx.process,
                        path = ?raw,
                        "Skipping file with a non-UTF-8 path"
                    );
                    continue;
                }
            };
            stats.record_file();

            match isolate(|| predicate(&path)) {
                Ok(true) => {
                    if let Err(e) = jobs.send(Job::Path(path)) {
                        warn!(
                            host = %ctx.host,
                            process = %ctx.process,
                            dir = %top_dir.display(),
                            queued = stats.matched_count(),
                            "Job channel closed before the walk finished, remaining paths dropped"
                        );
                        return Err(e);
                    }
                    stats.record_match();
                }
                Ok(false) => {}
                Err(e) => {
                    stats.record_error();
                    warn!(
                        host = %ctx.host,
                        process = %ctx.process,
                        path = %path,
                        error = %e,
                        "Predicate failed"
                    );
                }
            }
        }
    }

    if let Err(e) = jobs.send_sentinels(sentinels) {
        // Every consumer already left; nothing was queued after them.
        debug!(host = %ctx.host, process = %ctx.process, error = %e, "Sentinels not delivered");
    }

    info!(
        host = %ctx.host,
        process = %ctx.process,
        dir = %top_dir.display(),
        files = stats.files_count(),
        matched = stats.matched_count(),
        "Producer finished"
    );

    Ok(())
}
