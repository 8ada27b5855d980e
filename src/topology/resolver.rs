//! Topology resolver: host groups and per-host leaders

use crate::error::{TopologyError, TopologyResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identity of a process in the fleet (always positive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(u32);

/// The coordinating process; never a worker or a leader
pub const DRIVER: ProcessId = ProcessId(1);

impl ProcessId {
    /// Wrap a raw identity. Validity is checked when placed in a [`Topology`].
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw identity
    pub const fn get(self) -> u32 {
        self.0
    }

    /// True for the driver (identity 1)
    pub fn is_driver(self) -> bool {
        self == DRIVER
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ProcessId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Immutable snapshot of process placement across hosts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Process -> host name
    placement: BTreeMap<ProcessId, String>,
}

impl Topology {
    /// Build a topology from explicit `(process, host)` placements
    pub fn from_placement<I, H>(placement: I) -> TopologyResult<Self>
    where
        I: IntoIterator<Item = (ProcessId, H)>,
        H: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (process, host) in placement {
            if process.get() == 0 {
                return Err(TopologyError::InvalidProcessId { id: 0 });
            }
            if map.insert(process, host.into()).is_some() {
                return Err(TopologyError::DuplicateProcess { process });
            }
        }
        Ok(Self { placement: map })
    }

    /// Evenly sized fleet: the driver sits on `host-0`, workers are numbered
    /// from 2 and fill hosts in order, `workers_per_host` at a time.
    pub fn uniform(hosts: usize, workers_per_host: usize) -> Self {
        let mut placement = BTreeMap::new();
        if hosts > 0 {
            placement.insert(DRIVER, host_name(0));
        }

        let mut next = DRIVER.get() + 1;
        for host in 0..hosts {
            for _ in 0..workers_per_host {
                placement.insert(ProcessId(next), host_name(host));
                next += 1;
            }
        }

        Self { placement }
    }

    /// Driver plus `workers` workers on one host
    pub fn single_host(workers: usize) -> Self {
        Self::uniform(1, workers)
    }

    /// Host a process lives on
    pub fn host_of(&self, process: ProcessId) -> TopologyResult<&str> {
        self.placement
            .get(&process)
            .map(String::as_str)
            .ok_or(TopologyError::UnknownProcess { process })
    }

    /// Every process on the same host as `process`, driver included, sorted
    pub fn co_resident(&self, process: ProcessId) -> TopologyResult<Vec<ProcessId>> {
        let host = self.host_of(process)?;
        Ok(self
            .placement
            .iter()
            .filter(|(_, h)| h.as_str() == host)
            .map(|(p, _)| *p)
            .collect())
    }

    /// Worker processes on the same host as `process`, sorted
    pub fn local_workers(&self, process: ProcessId) -> TopologyResult<Vec<ProcessId>> {
        let mut group = self.co_resident(process)?;
        group.retain(|p| !p.is_driver());
        Ok(group)
    }

    /// Leader of the host `process` lives on: its lowest-numbered worker
    pub fn leader_of(&self, process: ProcessId) -> TopologyResult<ProcessId> {
        let host = self.host_of(process)?;
        self.placement
            .iter()
            .filter(|(p, h)| !p.is_driver() && h.as_str() == host)
            .map(|(p, _)| *p)
            .min()
            .ok_or_else(|| TopologyError::NoWorkers {
                host: Some(host.to_string()),
            })
    }

    /// Leaders of every host with at least one worker, sorted, no duplicates
    pub fn all_leaders(&self) -> TopologyResult<Vec<ProcessId>> {
        let mut leaders: BTreeMap<&str, ProcessId> = BTreeMap::new();
        // Placement iterates in ascending identity, so the first worker seen
        // on a host is its leader.
        for (process, host) in self.placement.iter().filter(|(p, _)| !p.is_driver()) {
            leaders.entry(host.as_str()).or_insert(*process);
        }

        if leaders.is_empty() {
            return Err(TopologyError::NoWorkers { host: None });
        }

        let unique: BTreeSet<ProcessId> = leaders.into_values().collect();
        Ok(unique.into_iter().collect())
    }

    /// True when `process` is the leader of its host
    pub fn is_leader(&self, process: ProcessId) -> bool {
        !process.is_driver() && self.leader_of(process).is_ok_and(|l| l == process)
    }

    /// All worker processes, sorted
    pub fn workers(&self) -> Vec<ProcessId> {
        self.placement
            .keys()
            .copied()
            .filter(|p| !p.is_driver())
            .collect()
    }

    /// Number of worker processes in the fleet
    pub fn worker_count(&self) -> usize {
        self.placement.keys().filter(|p| !p.is_driver()).count()
    }

    /// Distinct host names, sorted
    pub fn hosts(&self) -> Vec<&str> {
        let hosts: BTreeSet<&str> = self.placement.values().map(String::as_str).collect();
        hosts.into_iter().collect()
    }

    /// Total number of processes, driver included
    pub fn len(&self) -> usize {
        self.placement.len()
    }

    /// True when no process is placed
    pub fn is_empty(&self) -> bool {
        self.placement.is_empty()
    }
}

fn host_name(index: usize) -> String {
    format!("host-{}", index)
}

/// Identity of the process running a producer or consumer
///
/// Passed explicitly into every producer and consumer call so the protocol
/// code never consults ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerContext {
    /// Host name
    pub host: String,

    /// This process
    pub process: ProcessId,

    /// Leader of `host`
    pub leader: ProcessId,
}

impl WorkerContext {
    /// Resolve the context of a worker process
    pub fn resolve(topology: &Topology, process: ProcessId) -> TopologyResult<Self> {
        if process.is_driver() {
            return Err(TopologyError::NotAWorker { process });
        }
        let host = topology.host_of(process)?.to_string();
        let leader = topology.leader_of(process)?;
        Ok(Self {
            host,
            process,
            leader,
        })
    }

    /// True when this process owns the host's job channel
    pub fn is_leader(&self) -> bool {
        self.process == self.leader
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(id: u32) -> ProcessId {
        ProcessId::new(id)
    }

    fn two_hosts() -> Topology {
        Topology::from_placement([
            (pid(1), "alpha"),
            (pid(4), "alpha"),
            (pid(2), "alpha"),
            (pid(3), "beta"),
            (pid(6), "beta"),
            (pid(5), "gamma"),
        ])
        .unwrap()
    }

    #[test]
    fn test_leader_is_group_minimum() {
        let topo = two_hosts();

        for p in [2, 4] {
            assert_eq!(topo.leader_of(pid(p)).unwrap(), pid(2));
        }
        for p in [3, 6] {
            assert_eq!(topo.leader_of(pid(p)).unwrap(), pid(3));
        }
        assert_eq!(topo.leader_of(pid(5)).unwrap(), pid(5));

        // Driver resolves to the leader of its host, never to itself
        assert_eq!(topo.leader_of(DRIVER).unwrap(), pid(2));
    }

    #[test]
    fn test_all_leaders_one_per_host() {
        let topo = two_hosts();
        assert_eq!(topo.all_leaders().unwrap(), vec![pid(2), pid(3), pid(5)]);
        // Idempotent
        assert_eq!(topo.all_leaders().unwrap(), topo.all_leaders().unwrap());
    }

    #[test]
    fn test_driver_only_host_has_no_workers() {
        let topo =
            Topology::from_placement([(pid(1), "head"), (pid(2), "compute")]).unwrap();

        assert_eq!(
            topo.leader_of(DRIVER),
            Err(TopologyError::NoWorkers {
                host: Some("head".into())
            })
        );
        assert_eq!(topo.all_leaders().unwrap(), vec![pid(2)]);
    }

    #[test]
    fn test_empty_fleet() {
        let topo = Topology::from_placement([(DRIVER, "head")]).unwrap();
        assert_eq!(
            topo.all_leaders(),
            Err(TopologyError::NoWorkers { host: None })
        );
        assert_eq!(topo.worker_count(), 0);
    }

    #[test]
    fn test_unknown_process() {
        let topo = Topology::single_host(2);
        assert_eq!(
            topo.leader_of(pid(42)),
            Err(TopologyError::UnknownProcess { process: pid(42) })
        );
    }

    #[test]
    fn test_invalid_placement() {
        assert_eq!(
            Topology::from_placement([(pid(0), "a")]),
            Err(TopologyError::InvalidProcessId { id: 0 })
        );
        assert_eq!(
            Topology::from_placement([(pid(2), "a"), (pid(2), "b")]),
            Err(TopologyError::DuplicateProcess { process: pid(2) })
        );
    }

    #[test]
    fn test_uniform_layout() {
        let topo = Topology::uniform(2, 3);

        assert_eq!(topo.len(), 7);
        assert_eq!(topo.worker_count(), 6);
        assert_eq!(topo.hosts(), vec!["host-0", "host-1"]);
        assert_eq!(topo.host_of(DRIVER).unwrap(), "host-0");
        assert_eq!(topo.local_workers(pid(3)).unwrap(), vec![pid(2), pid(3), pid(4)]);
        assert_eq!(topo.co_resident(pid(3)).unwrap().len(), 4);
        assert_eq!(topo.local_workers(pid(6)).unwrap(), vec![pid(5), pid(6), pid(7)]);
        assert_eq!(topo.all_leaders().unwrap(), vec![pid(2), pid(5)]);
        assert!(topo.is_leader(pid(5)));
        assert!(!topo.is_leader(pid(6)));
        assert!(!topo.is_leader(DRIVER));
    }

    #[test]
    fn test_worker_context() {
        let topo = Topology::uniform(2, 2);

        let ctx = WorkerContext::resolve(&topo, pid(5)).unwrap();
        assert_eq!(ctx.host, "host-1");
        assert_eq!(ctx.leader, pid(4));
        assert!(!ctx.is_leader());

        assert_eq!(
            WorkerContext::resolve(&topo, DRIVER),
            Err(TopologyError::NotAWorker { process: DRIVER })
        );
    }
}
