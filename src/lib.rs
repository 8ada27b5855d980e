//! fleet-walker - Distributed scatter-gather over shared directories
//!
//! A fleet of worker processes spread over several hosts cooperatively
//! discovers the files under a set of top directories, runs a caller
//! supplied work function on each one and gathers the non-empty results at
//! a single driver.
//!
//! # Features
//!
//! - **Per-host leaders**: the lowest-numbered worker on each host walks the
//!   directories for that host. Election is a pure function of a frozen
//!   [`Topology`] snapshot.
//!
//! - **Per-host job channels**: bounded, so a fast walk never outruns the
//!   workers by more than the channel capacity.
//!
//! - **Sentinel termination**: every producer ends its walk by posting one
//!   sentinel per local worker; every worker ends by sending one completion
//!   signal to the driver. No polling, no central coordinator.
//!
//! - **Failure isolation**: a predicate or work function that errors or
//!   panics on one path is logged and skipped.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Driver (process 1)                        │
//! │   Launcher ──► JobChannels + ResultChannel ──► collect()     │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ spawn
//!        ┌───────────────────────┴───────────────────────┐
//!        ▼                                               ▼
//! ┌─────────────────────────────┐         ┌─────────────────────────────┐
//! │ host-0                      │         │ host-1                      │
//! │  leader 2: producer(s)      │         │  leader 5: producer(s)      │
//! │      │                      │         │      │                      │
//! │      ▼                      │         │      ▼                      │
//! │  [ job channel (bounded) ]  │         │  [ job channel (bounded) ]  │
//! │   │        │        │       │         │   │        │        │       │
//! │  w2       w3       w4       │         │  w5       w6       w7       │
//! └───┼────────┼────────┼───────┘         └───┼────────┼────────┼───────┘
//!     └────────┴────────┴───────┬─────────────┴────────┴────────┘
//!                               ▼
//!                 [ result channel (bounded) ] ──► driver
//! ```
//!
//! # Example
//!
//! ```no_run
//! use fleet_walker::{LaunchConfig, Launcher, Topology};
//! use std::path::PathBuf;
//!
//! # fn main() -> fleet_walker::Result<()> {
//! let launcher = Launcher::new(Topology::uniform(2, 4), LaunchConfig::default());
//! let launch = launcher.launch_with(
//!     |path: &str| -> anyhow::Result<Option<u64>> { Ok(Some(std::fs::metadata(path)?.len())) },
//!     |path: &str| -> anyhow::Result<bool> { Ok(path.ends_with(".h5")) },
//!     &[PathBuf::from("/data")],
//! )?;
//!
//! launch.collect(|t| println!("{} {:?}", t.path, t.value))?;
//! launch.join()?;
//! # Ok(())
//! # }
//! ```

pub mod builtin;
pub mod channel;
pub mod config;
pub mod error;
pub mod progress;
pub mod scatter;
pub mod topology;

pub use channel::{make_job_channels, Job, ResultTuple};
pub use config::{CliArgs, LaunchConfig, ScatterConfig, Termination};
pub use error::{FleetError, Result};
pub use scatter::{collect, collect_timeout, Launch, LaunchSummary, Launcher};
pub use topology::{ProcessId, Topology, WorkerContext, DRIVER};
