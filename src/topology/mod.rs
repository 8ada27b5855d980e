//! Fleet topology and leader election
//!
//! A [`Topology`] is a frozen snapshot of which process lives on which host.
//! Every leader decision is a pure function of that snapshot, so two
//! processes asking the same question always get the same answer and there
//! is no election state to race on.
//!
//! ```text
//!   host-0: [1 driver] [2 leader] [3] [4]
//!   host-1:            [5 leader] [6] [7]
//! ```

mod resolver;

pub use resolver::{ProcessId, Topology, WorkerContext, DRIVER};
