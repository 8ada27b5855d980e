//! Launcher - wires channels and starts producers and consumers
//!
//! The launcher is responsible for:
//! - Building the per-host job channels and the result channel
//! - Spawning one consumer thread per target worker
//! - Spawning one producer thread per (host leader, top directory)
//! - Handing the result channel back to the caller without blocking

use crate::builtin::not_symlink;
use crate::channel::{
    make_job_channels, JobChannelStats, JobReceiver, JobSender, ResultChannel, ResultReceiver,
    ResultSender, ResultTuple,
};
use crate::config::LaunchConfig;
use crate::error::{
    ChannelError, ChannelResult, ConfigError, FleetError, Result, TopologyError, WorkerError,
};
use crate::scatter::aggregator::{self, CollectStats};
use crate::scatter::consumer::{consume, ConsumerStats};
use crate::scatter::panic_message;
use crate::scatter::producer::{produce, ProducerStats};
use crate::scatter::traversal::{LocalTraversal, Traversal};
use crate::topology::{ProcessId, Topology, WorkerContext};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Starts scatter-gather runs over a fixed topology
pub struct Launcher {
    /// Fleet snapshot
    topology: Arc<Topology>,

    /// Channel capacities and termination policy
    config: LaunchConfig,

    /// Target workers (all workers when None)
    targets: Option<Vec<ProcessId>>,

    /// Directory walker used by producers
    traversal: Arc<dyn Traversal>,
}

impl Launcher {
    /// Create a launcher for `topology`
    pub fn new(topology: Topology, config: LaunchConfig) -> Self {
        let traversal = LocalTraversal::new()
            .follow_links(config.follow_links)
            .max_depth(config.max_depth);

        Self {
            topology: Arc::new(topology),
            config,
            targets: None,
            traversal: Arc::new(traversal),
        }
    }

    /// Restrict the run to these worker processes
    pub fn targets(mut self, targets: impl IntoIterator<Item = ProcessId>) -> Self {
        self.targets = Some(targets.into_iter().collect());
        self
    }

    /// Walk directories with a custom traversal
    pub fn traversal(mut self, traversal: impl Traversal + 'static) -> Self {
        self.traversal = Arc::new(traversal);
        self
    }

    /// Fleet snapshot
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Launch settings
    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    /// Launch with the default predicate (skip symbolic links)
    pub fn launch<T, W>(&self, work: W, top_dirs: &[PathBuf]) -> Result<Launch<T>>
    where
        T: Send + 'static,
        W: Fn(&str) -> anyhow::Result<Option<T>> + Send + Sync + 'static,
    {
        self.launch_with(work, not_symlink, top_dirs)
    }

    /// Launch with a custom predicate
    ///
    /// Returns as soon as every thread is started; results are read from the
    /// returned [`Launch`].
    pub fn launch_with<T, W, P>(&self, work: W, predicate: P, top_dirs: &[PathBuf]) -> Result<Launch<T>>
    where
        T: Send + 'static,
        W: Fn(&str) -> anyhow::Result<Option<T>> + Send + Sync + 'static,
        P: Fn(&str) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        if top_dirs.is_empty() {
            return Err(ConfigError::NoDirectories.into());
        }

        let started = Instant::now();
        let targets = self.resolve_targets()?;
        let top_dirs: Vec<PathBuf> = top_dirs.iter().map(|d| absolute(d)).collect();
        let stop_after = self.config.termination.sentinels_to_stop(top_dirs.len());

        let channels = make_job_channels(&self.topology, self.config.job_capacity)?;
        let result_channel = ResultChannel::new(self.config.result_capacity)?;

        // Consumers per host, keyed by the host's leader
        let mut consumers_per_leader: BTreeMap<ProcessId, usize> = BTreeMap::new();
        for ctx in &targets {
            *consumers_per_leader.entry(ctx.leader).or_default() += 1;
        }

        let work = Arc::new(work);
        let predicate = Arc::new(predicate);

        let mut workers = Vec::with_capacity(targets.len());
        for ctx in targets {
            let channel = channels.for_process(&self.topology, ctx.process)?;
            let worker = WorkerHandle::spawn(
                ctx,
                Arc::clone(&work),
                channel.receiver(),
                result_channel.sender(),
                stop_after,
            )?;
            workers.push(worker);
        }

        let mut producers = Vec::with_capacity(consumers_per_leader.len() * top_dirs.len());
        for (&leader, &consumers) in &consumers_per_leader {
            let channel = channels
                .get(leader)
                .ok_or(ChannelError::NoJobChannel { leader })?;
            let ctx = WorkerContext::resolve(&self.topology, leader)?;

            for (index, dir) in top_dirs.iter().enumerate() {
                let producer = ProducerHandle::spawn(
                    ctx.clone(),
                    index,
                    dir.clone(),
                    Arc::clone(&predicate),
                    Arc::clone(&self.traversal),
                    channel.sender(),
                    consumers,
                )?;
                producers.push(producer);
            }
        }

        let channel_stats = channels.iter().map(|c| c.stats()).collect();
        // Workers and producers now hold the only channel handles
        drop(channels);

        info!(
            workers = workers.len(),
            leaders = consumers_per_leader.len(),
            producers = producers.len(),
            dirs = top_dirs.len(),
            "Launch started"
        );

        Ok(Launch {
            results: result_channel.into_receiver(),
            expected_completions: workers.len(),
            workers,
            producers,
            channel_stats,
            started,
        })
    }

    /// Target workers with their resolved contexts, deduplicated, sorted
    fn resolve_targets(&self) -> Result<Vec<WorkerContext>> {
        let requested: BTreeSet<ProcessId> = match &self.targets {
            Some(targets) => targets.iter().copied().collect(),
            None => self.topology.workers().into_iter().collect(),
        };

        if requested.is_empty() {
            return Err(TopologyError::NoWorkers { host: None }.into());
        }

        requested
            .into_iter()
            .map(|p| WorkerContext::resolve(&self.topology, p).map_err(FleetError::from))
            .collect()
    }
}

fn absolute(dir: &Path) -> PathBuf {
    std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf())
}

/// A consumer thread
struct WorkerHandle {
    process: ProcessId,
    name: String,
    handle: Option<JoinHandle<ChannelResult<()>>>,
    stats: Arc<ConsumerStats>,
}

impl WorkerHandle {
    fn spawn<T, W>(
        ctx: WorkerContext,
        work: Arc<W>,
        jobs: JobReceiver,
        results: ResultSender<T>,
        stop_after: usize,
    ) -> std::result::Result<Self, WorkerError>
    where
        T: Send + 'static,
        W: Fn(&str) -> anyhow::Result<Option<T>> + Send + Sync + 'static,
    {
        let stats = Arc::new(ConsumerStats::default());
        let stats_clone = Arc::clone(&stats);
        let process = ctx.process;
        let name = format!("worker-{}", process);

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || consume(&ctx, &*work, &jobs, &results, stop_after, &stats_clone))
            .map_err(|e| WorkerError::SpawnFailed {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            process,
            name,
            handle: Some(handle),
            stats,
        })
    }

    fn join(mut self) -> std::result::Result<ChannelResult<()>, WorkerError> {
        join_thread(&self.name, self.handle.take())
    }
}

/// A producer thread for one top directory
struct ProducerHandle {
    dir: PathBuf,
    name: String,
    handle: Option<JoinHandle<ChannelResult<()>>>,
    stats: Arc<ProducerStats>,
}

impl ProducerHandle {
    fn spawn<P>(
        ctx: WorkerContext,
        index: usize,
        dir: PathBuf,
        predicate: Arc<P>,
        traversal: Arc<dyn Traversal>,
        jobs: JobSender,
        sentinels: usize,
    ) -> std::result::Result<Self, WorkerError>
    where
        P: Fn(&str) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        let stats = Arc::new(ProducerStats::default());
        let stats_clone = Arc::clone(&stats);
        let name = format!("producer-{}-{}", ctx.process, index);
        let thread_dir = dir.clone();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                produce(
                    &ctx,
                    &*predicate,
                    &*traversal,
                    &thread_dir,
                    &jobs,
                    sentinels,
                    &stats_clone,
                )
            })
            .map_err(|e| WorkerError::SpawnFailed {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            dir,
            name,
            handle: Some(handle),
            stats,
        })
    }

    fn join(mut self) -> std::result::Result<ChannelResult<()>, WorkerError> {
        join_thread(&self.name, self.handle.take())
    }
}

fn join_thread(
    name: &str,
    handle: Option<JoinHandle<ChannelResult<()>>>,
) -> std::result::Result<ChannelResult<()>, WorkerError> {
    match handle {
        Some(handle) => handle.join().map_err(|payload| WorkerError::Panicked {
            name: name.to_string(),
            message: panic_message(payload.as_ref()),
        }),
        None => Ok(Ok(())),
    }
}

/// A running scatter-gather launch
///
/// Holds the driver's end of the result channel and a handle for every
/// thread the launch started.
pub struct Launch<T> {
    results: ResultReceiver<T>,
    expected_completions: usize,
    workers: Vec<WorkerHandle>,
    producers: Vec<ProducerHandle>,
    channel_stats: Vec<Arc<JobChannelStats>>,
    started: Instant,
}

impl<T> Launch<T> {
    /// Driver end of the result channel
    pub fn results(&self) -> &ResultReceiver<T> {
        &self.results
    }

    /// One completion signal is expected per target worker
    pub fn expected_completions(&self) -> usize {
        self.expected_completions
    }

    /// Processes running a consumer
    pub fn workers(&self) -> Vec<ProcessId> {
        self.workers.iter().map(|w| w.process).collect()
    }

    /// Producer threads started (leaders x top directories)
    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    /// Feed every result to `handler` until all workers have finished
    pub fn collect<H>(&self, handler: H) -> Result<CollectStats>
    where
        H: FnMut(ResultTuple<T>),
    {
        aggregator::collect(handler, &self.results, self.expected_completions)
    }

    /// Like [`Launch::collect`] with a deadline
    pub fn collect_timeout<H>(&self, handler: H, timeout: Duration) -> Result<CollectStats>
    where
        H: FnMut(ResultTuple<T>),
    {
        aggregator::collect_timeout(handler, &self.results, self.expected_completions, timeout)
    }

    /// Wait for every thread and summarize the run.
    ///
    /// Call after collecting: results still queued are discarded, and
    /// workers blocked on a full result channel are released.
    pub fn join(self) -> Result<LaunchSummary> {
        let Launch {
            results,
            workers,
            producers,
            channel_stats,
            started,
            ..
        } = self;
        drop(results);

        let mut summary = LaunchSummary {
            workers: workers.len(),
            producers: producers.len(),
            ..LaunchSummary::default()
        };
        let mut first_panic = None;

        for worker in workers {
            let stats = Arc::clone(&worker.stats);
            let process = worker.process;
            let outcome = worker.join();
            summary.add_consumer(&stats);
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(process = %process, error = %e, "Consumer stopped early"),
                Err(e) => {
                    warn!(process = %process, error = %e, "Consumer thread panicked");
                    first_panic.get_or_insert(e);
                }
            }
        }

        for producer in producers {
            let stats = Arc::clone(&producer.stats);
            let dir = producer.dir.clone();
            let outcome = producer.join();
            summary.add_producer(&stats);
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(_)) => summary.interrupted_producers += 1,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Producer thread panicked");
                    first_panic.get_or_insert(e);
                }
            }
        }

        for stats in &channel_stats {
            summary.jobs_queued += stats.sent_count();
            summary.backpressure_events += stats.backpressure_count();
        }
        summary.elapsed = started.elapsed();

        if let Some(e) = first_panic {
            return Err(e.into());
        }

        info!(
            jobs = summary.jobs_processed,
            results = summary.results,
            work_errors = summary.work_errors,
            predicate_errors = summary.predicate_errors,
            non_utf8_paths = summary.non_utf8_paths,
            unprocessed = summary.unprocessed_jobs(),
            "Launch finished"
        );

        Ok(summary)
    }
}

/// Totals for a finished launch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchSummary {
    /// Consumer threads
    pub workers: usize,

    /// Producer threads
    pub producers: usize,

    /// Directories listed by producers
    pub dirs_walked: u64,

    /// Files offered to the predicate
    pub files_seen: u64,

    /// Paths accepted by the predicate and queued
    pub jobs_queued: u64,

    /// Predicate failures
    pub predicate_errors: u64,

    /// Files skipped because their path is not valid UTF-8
    pub non_utf8_paths: u64,

    /// Jobs taken by consumers
    pub jobs_processed: u64,

    /// Results sent to the driver
    pub results: u64,

    /// Work calls that returned no result
    pub empty_results: u64,

    /// Work failures
    pub work_errors: u64,

    /// Producers that found their job channel closed mid-walk
    pub interrupted_producers: usize,

    /// Times a producer had to wait on a full job channel
    pub backpressure_events: u64,

    /// Time from launch to join
    pub elapsed: Duration,
}

impl LaunchSummary {
    fn add_consumer(&mut self, stats: &ConsumerStats) {
        self.jobs_processed += stats.jobs.load(Ordering::Relaxed);
        self.results += stats.results.load(Ordering::Relaxed);
        self.empty_results += stats.empty.load(Ordering::Relaxed);
        self.work_errors += stats.work_errors.load(Ordering::Relaxed);
    }

    fn add_producer(&mut self, stats: &ProducerStats) {
        self.dirs_walked += stats.dirs.load(Ordering::Relaxed);
        self.files_seen += stats.files_seen.load(Ordering::Relaxed);
        self.predicate_errors += stats.predicate_errors.load(Ordering::Relaxed);
        self.non_utf8_paths += stats.non_utf8.load(Ordering::Relaxed);
    }

    /// Jobs queued but never taken by a consumer
    pub fn unprocessed_jobs(&self) -> u64 {
        self.jobs_queued.saturating_sub(self.jobs_processed)
    }

    /// True when every queued job was processed and no producer was cut short
    pub fn is_complete(&self) -> bool {
        self.unprocessed_jobs() == 0 && self.interrupted_producers == 0
    }
}
