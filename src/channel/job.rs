//! Per-host job channels
//!
//! One bounded channel per host group, owned by the group's leader. Only the
//! processes on that host ever hold a handle to it. A full channel blocks
//! the producer until a consumer drains it; that is the only backpressure
//! in the system.

use crate::error::{ChannelError, ChannelResult, FleetError, Result};
use crate::topology::{ProcessId, Topology};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An item on a job channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Absolute path of a file to process
    Path(String),

    /// No more jobs for the consumer that takes this
    Sentinel,
}

impl Job {
    /// Create a path job
    pub fn path(path: impl Into<String>) -> Self {
        Job::Path(path.into())
    }

    /// True for the termination sentinel
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Job::Sentinel)
    }
}

/// Statistics for one job channel
#[derive(Debug, Default)]
pub struct JobChannelStats {
    /// Path jobs sent
    pub sent: AtomicU64,

    /// Sentinels sent
    pub sentinels: AtomicU64,

    /// Sends that found the channel full and had to wait
    pub backpressure_events: AtomicU64,
}

impl JobChannelStats {
    /// Path jobs sent so far
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Sentinels sent so far
    pub fn sentinel_count(&self) -> u64 {
        self.sentinels.load(Ordering::Relaxed)
    }

    /// Number of times a producer blocked on a full channel
    pub fn backpressure_count(&self) -> u64 {
        self.backpressure_events.load(Ordering::Relaxed)
    }
}

/// Bounded job channel hosted on a leader
pub struct JobChannel {
    /// Leader owning this channel
    leader: ProcessId,

    /// Host the channel is visible on
    host: String,

    sender: Sender<Job>,
    receiver: Receiver<Job>,

    /// Channel capacity
    capacity: usize,

    stats: Arc<JobChannelStats>,
}

impl JobChannel {
    /// Create a job channel for `leader` on `host`
    pub fn new(leader: ProcessId, host: impl Into<String>, capacity: usize) -> ChannelResult<Self> {
        if capacity == 0 {
            return Err(ChannelError::ZeroCapacity);
        }

        let (sender, receiver) = bounded(capacity);
        Ok(Self {
            leader,
            host: host.into(),
            sender,
            receiver,
            capacity,
            stats: Arc::new(JobChannelStats::default()),
        })
    }

    /// Get a sender for this channel (clone for each producer)
    pub fn sender(&self) -> JobSender {
        JobSender {
            sender: self.sender.clone(),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Get a receiver for this channel (clone for each consumer)
    pub fn receiver(&self) -> JobReceiver {
        JobReceiver {
            receiver: self.receiver.clone(),
        }
    }

    /// Leader hosting the channel
    pub fn leader(&self) -> ProcessId {
        self.leader
    }

    /// Host the channel belongs to
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs currently queued
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Channel statistics
    pub fn stats(&self) -> Arc<JobChannelStats> {
        Arc::clone(&self.stats)
    }
}

/// Handle for sending jobs
#[derive(Clone)]
pub struct JobSender {
    sender: Sender<Job>,
    stats: Arc<JobChannelStats>,
}

impl JobSender {
    /// Send a job, blocking while the channel is full
    pub fn send(&self, job: Job) -> ChannelResult<()> {
        let is_sentinel = job.is_sentinel();

        let job = match self.sender.try_send(job) {
            Ok(()) => None,
            Err(TrySendError::Full(job)) => {
                self.stats.backpressure_events.fetch_add(1, Ordering::Relaxed);
                Some(job)
            }
            Err(TrySendError::Disconnected(_)) => return Err(ChannelError::job_closed()),
        };
        if let Some(job) = job {
            self.sender.send(job).map_err(|_| ChannelError::job_closed())?;
        }

        if is_sentinel {
            self.stats.sentinels.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.sent.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Post `count` sentinels
    pub fn send_sentinels(&self, count: usize) -> ChannelResult<()> {
        for _ in 0..count {
            self.send(Job::Sentinel)?;
        }
        Ok(())
    }
}

/// Handle for receiving jobs
#[derive(Clone)]
pub struct JobReceiver {
    receiver: Receiver<Job>,
}

impl JobReceiver {
    /// Receive a job, blocking while the channel is empty
    pub fn recv(&self) -> ChannelResult<Job> {
        self.receiver.recv().map_err(|_| ChannelError::job_closed())
    }

    /// Receive without blocking
    pub fn try_recv(&self) -> Option<Job> {
        self.receiver.try_recv().ok()
    }

    /// Jobs currently queued
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// Registry of job channels, one per leader
pub struct JobChannels {
    channels: BTreeMap<ProcessId, JobChannel>,
}

impl JobChannels {
    /// Channel owned by `leader`
    pub fn get(&self, leader: ProcessId) -> Option<&JobChannel> {
        self.channels.get(&leader)
    }

    /// Channel of the host `process` lives on
    pub fn for_process(&self, topology: &Topology, process: ProcessId) -> Result<&JobChannel> {
        let leader = topology.leader_of(process)?;
        self.channels
            .get(&leader)
            .ok_or_else(|| FleetError::Channel(ChannelError::NoJobChannel { leader }))
    }

    /// Leaders with a channel, sorted
    pub fn leaders(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.channels.keys().copied()
    }

    /// Iterate channels in leader order
    pub fn iter(&self) -> impl Iterator<Item = &JobChannel> {
        self.channels.values()
    }

    /// Number of channels
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True when no channel was created
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Create one bounded job channel of `capacity` per leader in the fleet
pub fn make_job_channels(topology: &Topology, capacity: usize) -> Result<JobChannels> {
    let mut channels = BTreeMap::new();
    for leader in topology.all_leaders()? {
        let host = topology.host_of(leader)?;
        channels.insert(leader, JobChannel::new(leader, host, capacity)?);
    }
    Ok(JobChannels { channels })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TopologyError;
    use crate::topology::DRIVER;
    use std::thread;

    #[test]
    fn test_channel_basic() {
        let channel = JobChannel::new(ProcessId::new(2), "host-0", 10).unwrap();
        let sender = channel.sender();
        let receiver = channel.receiver();

        sender.send(Job::path("/data/a.h5")).unwrap();
        sender.send_sentinels(2).unwrap();
        assert_eq!(channel.len(), 3);

        assert_eq!(receiver.recv().unwrap(), Job::path("/data/a.h5"));
        assert!(receiver.recv().unwrap().is_sentinel());
        assert!(receiver.recv().unwrap().is_sentinel());
        assert!(receiver.try_recv().is_none());

        let stats = channel.stats();
        assert_eq!(stats.sent_count(), 1);
        assert_eq!(stats.sentinel_count(), 2);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(
            JobChannel::new(ProcessId::new(2), "host-0", 0).err(),
            Some(ChannelError::ZeroCapacity)
        );
    }

    #[test]
    fn test_backpressure_blocks_until_drained() {
        let channel = JobChannel::new(ProcessId::new(2), "host-0", 1).unwrap();
        let sender = channel.sender();
        let receiver = channel.receiver();

        let producer = thread::spawn(move || {
            for i in 0..5 {
                sender.send(Job::path(format!("/f{}", i))).unwrap();
            }
        });

        let mut got = Vec::new();
        for _ in 0..5 {
            got.push(receiver.recv().unwrap());
        }
        producer.join().unwrap();

        // FIFO per producer
        let expected: Vec<Job> = (0..5).map(|i| Job::path(format!("/f{}", i))).collect();
        assert_eq!(got, expected);
        assert!(channel.capacity() == 1 && channel.is_empty());
    }

    #[test]
    fn test_closed_channel() {
        let channel = JobChannel::new(ProcessId::new(2), "host-0", 4).unwrap();
        let sender = channel.sender();
        drop(channel);

        assert_eq!(sender.send(Job::Sentinel), Err(ChannelError::job_closed()));
    }

    #[test]
    fn test_make_job_channels() {
        let topo = Topology::uniform(3, 2);
        let channels = make_job_channels(&topo, 8).unwrap();

        assert_eq!(channels.len(), 3);
        assert_eq!(
            channels.leaders().collect::<Vec<_>>(),
            vec![ProcessId::new(2), ProcessId::new(4), ProcessId::new(6)]
        );
        for channel in channels.iter() {
            assert_eq!(channel.capacity(), 8);
            assert_eq!(topo.host_of(channel.leader()).unwrap(), channel.host());
        }

        let ch = channels.for_process(&topo, ProcessId::new(5)).unwrap();
        assert_eq!(ch.leader(), ProcessId::new(4));
        assert_eq!(
            channels.for_process(&topo, DRIVER).unwrap().leader(),
            ProcessId::new(2)
        );
    }

    #[test]
    fn test_make_job_channels_without_workers() {
        let topo = Topology::single_host(0);
        let err = make_job_channels(&topo, 8).err().unwrap();
        assert!(matches!(
            err,
            FleetError::Topology(TopologyError::NoWorkers { host: None })
        ));
    }
}
