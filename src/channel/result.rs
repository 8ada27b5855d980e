//! Fleet-wide result channel
//!
//! Every worker holds a [`ResultSender`]; the driver holds the single
//! [`ResultReceiver`]. A tuple with an empty path and no value is a worker's
//! completion signal.

use crate::error::{ChannelError, ChannelResult};
use crate::topology::ProcessId;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use std::time::Instant;

/// One entry on the result channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultTuple<T> {
    /// Host of the worker that produced this tuple
    pub host: String,

    /// Worker that produced this tuple
    pub process: ProcessId,

    /// Path the value was computed for (empty for completion signals)
    pub path: String,

    /// Work output; `None` is the empty marker
    pub value: Option<T>,
}

impl<T> ResultTuple<T> {
    /// A work result for `path`
    pub fn output(host: impl Into<String>, process: ProcessId, path: impl Into<String>, value: T) -> Self {
        Self {
            host: host.into(),
            process,
            path: path.into(),
            value: Some(value),
        }
    }

    /// The "this worker has finished" signal
    pub fn completion(host: impl Into<String>, process: ProcessId) -> Self {
        Self {
            host: host.into(),
            process,
            path: String::new(),
            value: None,
        }
    }

    /// True for a completion signal
    pub fn is_completion(&self) -> bool {
        self.path.is_empty() && self.value.is_none()
    }
}

/// Bounded result channel, created once per launch
pub struct ResultChannel<T> {
    sender: Sender<ResultTuple<T>>,
    receiver: Receiver<ResultTuple<T>>,
    capacity: usize,
}

impl<T> ResultChannel<T> {
    /// Create a result channel holding at most `capacity` tuples
    pub fn new(capacity: usize) -> ChannelResult<Self> {
        if capacity == 0 {
            return Err(ChannelError::ZeroCapacity);
        }
        let (sender, receiver) = bounded(capacity);
        Ok(Self {
            sender,
            receiver,
            capacity,
        })
    }

    /// Get a sender (clone for each worker)
    pub fn sender(&self) -> ResultSender<T> {
        ResultSender {
            sender: self.sender.clone(),
        }
    }

    /// Channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Give up the driver's own sender and keep only the receiving side.
    ///
    /// Once every worker sender is dropped the receiver reports
    /// [`ChannelError::Closed`] instead of blocking.
    pub fn into_receiver(self) -> ResultReceiver<T> {
        ResultReceiver {
            receiver: self.receiver,
        }
    }
}

/// Handle for sending results
pub struct ResultSender<T> {
    sender: Sender<ResultTuple<T>>,
}

impl<T> Clone for ResultSender<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T> ResultSender<T> {
    /// Send a tuple, blocking while the channel is full
    pub fn send(&self, tuple: ResultTuple<T>) -> ChannelResult<()> {
        self.sender
            .send(tuple)
            .map_err(|_| ChannelError::result_closed())
    }
}

/// Driver-side handle for reading results
pub struct ResultReceiver<T> {
    receiver: Receiver<ResultTuple<T>>,
}

impl<T> ResultReceiver<T> {
    /// Receive a tuple, blocking while the channel is empty
    pub fn recv(&self) -> ChannelResult<ResultTuple<T>> {
        self.receiver
            .recv()
            .map_err(|_| ChannelError::result_closed())
    }

    /// Receive a tuple, giving up at `deadline` (returns `Ok(None)`)
    pub fn recv_deadline(&self, deadline: Instant) -> ChannelResult<Option<ResultTuple<T>>> {
        match self.receiver.recv_deadline(deadline) {
            Ok(tuple) => Ok(Some(tuple)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(ChannelError::result_closed()),
        }
    }

    /// Receive without blocking
    pub fn try_recv(&self) -> Option<ResultTuple<T>> {
        self.receiver.try_recv().ok()
    }

    /// Tuples currently queued
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
