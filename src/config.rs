//! Configuration types for fleet-walker
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Library-level launch settings ([`LaunchConfig`])
//! - Validated runtime configuration for the binary ([`ScatterConfig`])

use crate::builtin::{PathFilter, WorkKind};
use crate::error::ConfigError;
use crate::topology::Topology;
use clap::Parser;
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum reasonable worker count per host
const MAX_WORKERS_PER_HOST: usize = 512;

/// Maximum number of simulated hosts
const MAX_HOSTS: usize = 1024;

/// Minimum channel capacity
const MIN_CAPACITY: usize = 1;

/// Default capacity for both channel kinds
pub const DEFAULT_CAPACITY: usize = 1000;

/// Scatter a file walk across a fleet of workers and gather the results
#[derive(Parser, Debug, Clone)]
#[command(
    name = "fleet-walker",
    version,
    about = "Scatter a file walk across a fleet of workers and gather the results",
    long_about = "Each host's leader walks the top directories and feeds matching files to the \
                  workers on its host through a bounded job channel. Workers run the selected \
                  work function and send results to the driver, which prints them.",
    after_help = "EXAMPLES:\n    \
        fleet-walker /data --include '\\.h5$'\n    \
        fleet-walker /data /scratch --hosts 2 --workers-per-host 8 --work lines\n    \
        fleet-walker /data --exclude '/\\.snapshot/' --json > sizes.jsonl"
)]
pub struct CliArgs {
    /// Top directories to walk
    #[arg(value_name = "DIR", required = true)]
    pub dirs: Vec<PathBuf>,

    /// Number of hosts to spread workers over
    #[arg(long, default_value = "1", value_name = "NUM")]
    pub hosts: usize,

    /// Worker processes per host
    #[arg(
        short = 'w',
        long,
        default_value_t = default_workers(),
        value_name = "NUM"
    )]
    pub workers_per_host: usize,

    /// Per-host job channel capacity
    #[arg(long, default_value_t = DEFAULT_CAPACITY, value_name = "NUM")]
    pub job_capacity: usize,

    /// Result channel capacity
    #[arg(long, default_value_t = DEFAULT_CAPACITY, value_name = "NUM")]
    pub result_capacity: usize,

    /// Only process paths matching pattern (can be repeated)
    #[arg(long = "include", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub include_patterns: Vec<String>,

    /// Skip paths matching pattern (can be repeated)
    #[arg(long = "exclude", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Process symbolic links and descend into linked directories
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Maximum directory depth (unlimited if not set)
    #[arg(short = 'd', long, value_name = "NUM")]
    pub max_depth: Option<usize>,

    /// Work function to run on every file
    #[arg(long, value_enum, default_value = "size")]
    pub work: WorkKind,

    /// When a worker stops taking jobs
    #[arg(long, value_enum, default_value = "every-producer")]
    pub termination: Termination,

    /// Give up collecting after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print results as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (show per-worker activity)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn default_workers() -> usize {
    num_cpus::get()
}

/// When a consumer stops taking jobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Termination {
    /// Stop on the first sentinel seen. With several top directories a fast
    /// directory's sentinels can stop consumers while slower directories are
    /// still being walked; their remaining jobs are dropped.
    #[default]
    FirstSentinel,

    /// Stop after one sentinel per top directory, so no job is dropped
    EveryProducer,
}

impl Termination {
    /// Sentinels a consumer takes before stopping, given `producers` top
    /// directories per host
    pub fn sentinels_to_stop(self, producers: usize) -> usize {
        match self {
            Termination::FirstSentinel => 1,
            Termination::EveryProducer => producers.max(1),
        }
    }
}

/// Launch settings used by [`Launcher`](crate::scatter::Launcher)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Capacity of each per-host job channel
    pub job_capacity: usize,

    /// Capacity of the result channel
    pub result_capacity: usize,

    /// Consumer termination policy
    pub termination: Termination,

    /// Descend into symlinked directories
    pub follow_links: bool,

    /// Maximum traversal depth
    pub max_depth: Option<usize>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            job_capacity: DEFAULT_CAPACITY,
            result_capacity: DEFAULT_CAPACITY,
            termination: Termination::default(),
            follow_links: false,
            max_depth: None,
        }
    }
}

/// Validated runtime configuration for the binary
#[derive(Debug, Clone)]
pub struct ScatterConfig {
    /// Top directories to walk
    pub top_dirs: Vec<PathBuf>,

    /// Number of hosts
    pub hosts: usize,

    /// Workers on each host
    pub workers_per_host: usize,

    /// Launch settings
    pub launch: LaunchConfig,

    /// Path predicate
    pub filter: PathFilter,

    /// Work function
    pub work: WorkKind,

    /// Collection deadline
    pub timeout: Option<Duration>,

    /// JSON lines output
    pub json: bool,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl ScatterConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        if args.dirs.is_empty() {
            return Err(ConfigError::NoDirectories);
        }

        for dir in &args.dirs {
            if !dir.is_dir() {
                return Err(ConfigError::InvalidDirectory {
                    path: dir.clone(),
                    reason: "not an existing directory".to_string(),
                });
            }
        }

        // Validate fleet shape
        if args.hosts == 0 || args.hosts > MAX_HOSTS {
            return Err(ConfigError::InvalidHostCount {
                count: args.hosts,
                max: MAX_HOSTS,
            });
        }

        if args.workers_per_host == 0 || args.workers_per_host > MAX_WORKERS_PER_HOST {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers_per_host,
                max: MAX_WORKERS_PER_HOST,
            });
        }

        // Validate channel capacities
        for (name, capacity) in [("job", args.job_capacity), ("result", args.result_capacity)] {
            if capacity < MIN_CAPACITY {
                return Err(ConfigError::InvalidCapacity {
                    name,
                    capacity,
                    min: MIN_CAPACITY,
                });
            }
        }

        let filter = PathFilter {
            include: compile_patterns(&args.include_patterns)?,
            exclude: compile_patterns(&args.exclude_patterns)?,
            skip_symlinks: !args.follow_symlinks,
        };

        Ok(Self {
            top_dirs: args.dirs,
            hosts: args.hosts,
            workers_per_host: args.workers_per_host,
            launch: LaunchConfig {
                job_capacity: args.job_capacity,
                result_capacity: args.result_capacity,
                termination: args.termination,
                follow_links: args.follow_symlinks,
                max_depth: args.max_depth,
            },
            filter,
            work: args.work,
            timeout: args.timeout.map(Duration::from_secs),
            json: args.json,
            show_progress: !args.quiet && !args.json,
            verbose: args.verbose,
        })
    }

    /// Fleet layout described by this configuration
    pub fn topology(&self) -> Topology {
        Topology::uniform(self.hosts, self.workers_per_host)
    }

    /// Total worker processes across all hosts
    pub fn worker_count(&self) -> usize {
        self.hosts * self.workers_per_host
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| ConfigError::InvalidPattern {
                pattern: p.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}
