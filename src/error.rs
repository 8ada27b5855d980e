//! Error types for fleet-walker
//!
//! This module defines the error hierarchy for:
//! - Topology resolution (leader election, host groups)
//! - Job and result channels
//! - Configuration and CLI errors
//! - Worker and producer threads
//!
//! Only topology, configuration and launch failures ever reach a caller.
//! Per-path predicate and work failures are wrapped in [`CallError`],
//! logged where they happen, and never interrupt a loop.

use crate::topology::ProcessId;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for fleet-walker
#[derive(Error, Debug)]
pub enum FleetError {
    /// Topology errors (no workers, unknown process, ...)
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    /// Channel errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Result collection did not observe every completion signal in time
    #[error("Timed out after {waited:?} with {remaining} completion signal(s) outstanding")]
    Timeout { waited: Duration, remaining: usize },
}

/// Leader election and host group errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// The host (or the whole fleet, when `host` is None) has no worker processes
    #[error("No worker processes on {}", host.as_deref().unwrap_or("any host"))]
    NoWorkers { host: Option<String> },

    /// Process is not part of the topology snapshot
    #[error("Process {process} is not part of the topology")]
    UnknownProcess { process: ProcessId },

    /// Process identities start at 1
    #[error("Invalid process identity {id}: identities must be positive")]
    InvalidProcessId { id: u32 },

    /// Same identity placed twice
    #[error("Process {process} is placed more than once")]
    DuplicateProcess { process: ProcessId },

    /// The driver (or another non-worker) was requested as a worker
    #[error("Process {process} is the driver and cannot run as a worker")]
    NotAWorker { process: ProcessId },
}

/// Job and result channel errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The other side of the channel has gone away
    #[error("{channel} channel closed unexpectedly")]
    Closed { channel: &'static str },

    /// Channels must be able to hold at least one item
    #[error("Channel capacity must be at least 1")]
    ZeroCapacity,

    /// No job channel was created for this leader
    #[error("No job channel registered for leader {leader}")]
    NoJobChannel { leader: ProcessId },
}

impl ChannelError {
    pub(crate) fn job_closed() -> Self {
        ChannelError::Closed { channel: "Job" }
    }

    pub(crate) fn result_closed() -> Self {
        ChannelError::Closed { channel: "Result" }
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid host count
    #[error("Invalid host count {count}: must be between 1 and {max}")]
    InvalidHostCount { count: usize, max: usize },

    /// Invalid channel capacity
    #[error("Invalid {name} capacity {capacity}: must be at least {min}")]
    InvalidCapacity {
        name: &'static str,
        capacity: usize,
        min: usize,
    },

    /// Invalid include/exclude pattern
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Top directory missing or not a directory
    #[error("Invalid top directory '{path}': {reason}")]
    InvalidDirectory { path: PathBuf, reason: String },

    /// Nothing to walk
    #[error("At least one top directory is required")]
    NoDirectories,
}

/// Worker and producer thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Thread panicked outside the isolated predicate/work calls
    #[error("Thread '{name}' panicked: {message}")]
    Panicked { name: String, message: String },

    /// Thread could not be started
    #[error("Failed to spawn thread '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },
}

/// A predicate or work call that failed for one path
#[derive(Error, Debug)]
pub enum CallError {
    /// The callback returned an error
    #[error("{0:#}")]
    Failed(anyhow::Error),

    /// The callback panicked
    #[error("panicked: {0}")]
    Panicked(String),
}

/// Result type alias for FleetError
pub type Result<T> = std::result::Result<T, FleetError>;

/// Result type alias for TopologyError
pub type TopologyResult<T> = std::result::Result<T, TopologyError>;

/// Result type alias for ChannelError
pub type ChannelResult<T> = std::result::Result<T, ChannelError>;
