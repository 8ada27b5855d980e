//! Scatter-gather over a fleet of worker processes
//!
//! # Architecture
//!
//! ```text
//!   Launcher (driver)
//!     │  make_job_channels + ResultChannel
//!     │
//!     ├── per target worker ──► consume():  JobChannel ─► work(path) ─► ResultChannel
//!     │
//!     └── per host leader,
//!         per top directory ──► produce():  walk ─► predicate(path) ─► JobChannel
//!                                           ... then one Sentinel per local consumer
//!
//!   collect(): ResultChannel ─► handler(tuple), until one completion signal per worker
//! ```
//!
//! Every worker and every producer is its own thread, so a leader's consumer
//! is never starved by the producers running beside it. Threads meet only at
//! the job and result channels.

pub mod aggregator;
pub mod consumer;
pub mod launcher;
pub mod producer;
pub mod traversal;

pub use aggregator::{collect, collect_timeout, CollectStats};
pub use consumer::{consume, ConsumerStats};
pub use launcher::{Launch, LaunchSummary, Launcher};
pub use producer::{produce, ProducerStats};
pub use traversal::{DirListing, LocalTraversal, Traversal};

use crate::error::CallError;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Run a caller-supplied callback, turning errors and panics into a
/// [`CallError`] so a bad path never takes the surrounding loop down.
pub(crate) fn isolate<R>(call: impl FnOnce() -> anyhow::Result<R>) -> Result<R, CallError> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(CallError::Failed(e)),
        Err(payload) => Err(CallError::Panicked(panic_message(payload.as_ref()))),
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
