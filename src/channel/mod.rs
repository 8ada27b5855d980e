//! Bounded channels connecting producers, consumers and the driver
//!
//! ```text
//!   host-0                                  host-1
//!  ┌───────────────────────────┐          ┌───────────────────────────┐
//!  │ Producer(s) @ leader 2    │          │ Producer(s) @ leader 5    │
//!  │        │ Job::Path        │          │        │                  │
//!  │        ▼                  │          │        ▼                  │
//!  │  ┌────────────┐           │          │  ┌────────────┐           │
//!  │  │ JobChannel │ (bounded) │          │  │ JobChannel │           │
//!  │  └─────┬──────┘           │          │  └─────┬──────┘           │
//!  │   ┌────┼────┐             │          │   ┌────┼────┐             │
//!  │   2    3    4  consumers  │          │   5    6    7             │
//!  └───┼────┼────┼─────────────┘          └───┼────┼────┼─────────────┘
//!      └────┴────┴──────────┬──────────────────┴────┴────┘
//!                           ▼
//!                  ┌─────────────────┐
//!                  │  ResultChannel  │ (bounded, one per launch)
//!                  └────────┬────────┘
//!                           ▼
//!                     driver (1): collect
//! ```

pub mod job;
pub mod result;

pub use job::{make_job_channels, Job, JobChannel, JobChannelStats, JobChannels, JobReceiver, JobSender};
pub use result::{ResultChannel, ResultReceiver, ResultSender, ResultTuple};
