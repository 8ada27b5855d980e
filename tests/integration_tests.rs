//! Integration tests for fleet-walker
//!
//! Every test runs a complete launch over a temporary directory tree with
//! hosts simulated as thread groups.

use fleet_walker::channel::{ResultChannel, ResultTuple};
use fleet_walker::config::{LaunchConfig, Termination};
use fleet_walker::error::FleetError;
use fleet_walker::scatter::{collect, Launcher};
use fleet_walker::topology::{ProcessId, Topology};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::tempdir;

fn write_bytes(path: &Path, len: usize) {
    fs::write(path, vec![b'x'; len]).unwrap();
}

fn h5_tree() -> tempfile::TempDir {
    let dir = tempdir().unwrap();
    write_bytes(&dir.path().join("a.txt"), 5);
    write_bytes(&dir.path().join("b.h5"), 10);
    write_bytes(&dir.path().join("c.h5"), 20);
    dir
}

fn size_of(path: &str) -> anyhow::Result<Option<u64>> {
    Ok(Some(fs::metadata(path)?.len()))
}

fn is_h5(path: &str) -> anyhow::Result<bool> {
    Ok(path.ends_with(".h5"))
}

#[test]
fn test_h5_sizes_single_host() {
    let dir = h5_tree();
    let launcher = Launcher::new(Topology::single_host(2), LaunchConfig::default());
    let launch = launcher
        .launch_with(size_of, is_h5, &[dir.path().to_path_buf()])
        .unwrap();

    // Drain by hand, recognizing completion signals by their absent value
    let mut sizes = BTreeMap::new();
    let mut completions = 0;
    while completions < launch.expected_completions() {
        let tuple = launch.results().recv().unwrap();
        if tuple.is_completion() {
            assert!(tuple.path.is_empty());
            completions += 1;
        } else {
            assert_eq!(tuple.host, "host-0");
            sizes.insert(tuple.path, tuple.value.unwrap());
        }
    }

    let b = dir.path().join("b.h5").to_string_lossy().into_owned();
    let c = dir.path().join("c.h5").to_string_lossy().into_owned();
    assert_eq!(sizes.len(), 2);
    assert_eq!(sizes[&b], 10);
    assert_eq!(sizes[&c], 20);
    assert_eq!(completions, 2);

    let summary = launch.join().unwrap();
    assert_eq!(summary.workers, 2);
    assert_eq!(summary.files_seen, 3);
    assert_eq!(summary.jobs_queued, 2);
    assert_eq!(summary.results, 2);
    assert!(summary.is_complete());
}

#[test]
fn test_empty_work_yields_only_completions() {
    let dir = h5_tree();
    let launcher = Launcher::new(Topology::single_host(3), LaunchConfig::default());
    let launch = launcher
        .launch_with(
            |_: &str| -> anyhow::Result<Option<u64>> { Ok(None) },
            |_: &str| -> anyhow::Result<bool> { Ok(true) },
            &[dir.path().to_path_buf()],
        )
        .unwrap();

    let mut outputs = 0;
    let stats = launch.collect(|_| outputs += 1).unwrap();
    assert_eq!(outputs, 0);
    assert_eq!(stats.results, 0);
    assert_eq!(stats.completions, 3);

    let summary = launch.join().unwrap();
    assert_eq!(summary.empty_results, 3);
}

#[test]
fn test_collect_nothing_expected() {
    let channel: ResultChannel<u64> = ResultChannel::new(4).unwrap();
    let sender = channel.sender();
    let receiver = channel.into_receiver();

    // Queued tuples are left alone when no completion is expected
    sender
        .send(ResultTuple::output("host-0", ProcessId::new(2), "/x", 1))
        .unwrap();

    let mut handled = 0;
    let stats = collect(|_| handled += 1, &receiver, 0).unwrap();
    assert_eq!(handled, 0);
    assert_eq!(stats.completions, 0);
    assert_eq!(receiver.len(), 1);
}

#[test]
fn test_leaders_across_hosts() {
    let topology = Topology::uniform(3, 4);
    let leaders = topology.all_leaders().unwrap();
    assert_eq!(leaders.len(), 3);

    for worker in topology.workers() {
        let leader = topology.leader_of(worker).unwrap();
        assert!(leader <= worker);
        assert_eq!(topology.host_of(leader).unwrap(), topology.host_of(worker).unwrap());
        assert!(leaders.contains(&leader));
    }

    // One leader per host
    let hosts: BTreeSet<&str> = leaders
        .iter()
        .map(|l| topology.host_of(*l).unwrap())
        .collect();
    assert_eq!(hosts.len(), leaders.len());
}

#[test]
fn test_each_host_walks_every_directory() {
    let first = h5_tree();
    let second = tempdir().unwrap();
    write_bytes(&second.path().join("d.h5"), 7);
    fs::create_dir(second.path().join("nested")).unwrap();
    write_bytes(&second.path().join("nested").join("e.h5"), 3);

    let config = LaunchConfig {
        termination: Termination::EveryProducer,
        job_capacity: 2,
        ..LaunchConfig::default()
    };
    let launcher = Launcher::new(Topology::uniform(2, 3), config);
    let dirs: Vec<PathBuf> = vec![first.path().to_path_buf(), second.path().to_path_buf()];
    let launch = launcher.launch_with(size_of, is_h5, &dirs).unwrap();
    assert_eq!(launch.producer_count(), 4);

    let mut seen: BTreeMap<(String, String), u32> = BTreeMap::new();
    let stats = launch
        .collect(|tuple| *seen.entry((tuple.host, tuple.path)).or_default() += 1)
        .unwrap();
    assert_eq!(stats.completions, 6);

    // Four matching files, each processed exactly once on each of two hosts
    assert_eq!(stats.results, 8);
    assert_eq!(seen.len(), 8);
    assert!(seen.values().all(|&n| n == 1));

    let summary = launch.join().unwrap();
    assert!(summary.is_complete());
    assert_eq!(summary.producers, 4);
}

#[test]
fn test_failing_work_does_not_stop_others() {
    let dir = tempdir().unwrap();
    for i in 0..20 {
        write_bytes(&dir.path().join(format!("f{i}.dat")), i);
    }

    let launcher = Launcher::new(Topology::single_host(4), LaunchConfig::default());
    let launch = launcher
        .launch_with(
            |path: &str| -> anyhow::Result<Option<u64>> {
                let len = fs::metadata(path)?.len();
                match len % 3 {
                    0 => anyhow::bail!("refusing {}", path),
                    1 => panic!("boom on {}", path),
                    _ => Ok(Some(len)),
                }
            },
            |path: &str| -> anyhow::Result<bool> {
                if path.ends_with("f19.dat") {
                    anyhow::bail!("predicate failed");
                }
                Ok(true)
            },
            &[dir.path().to_path_buf()],
        )
        .unwrap();

    let mut values = Vec::new();
    let stats = launch.collect(|tuple| values.push(tuple.value.unwrap())).unwrap();
    assert_eq!(stats.completions, 4);

    // Sizes 0..=18 that leave remainder 2
    values.sort_unstable();
    assert_eq!(values, vec![2, 5, 8, 11, 14, 17]);

    let summary = launch.join().unwrap();
    assert_eq!(summary.predicate_errors, 1);
    assert_eq!(summary.jobs_queued, 19);
    assert_eq!(summary.jobs_processed, 19);
    assert_eq!(summary.work_errors, 13);
}

#[test]
fn test_collect_timeout_on_stalled_worker() {
    let dir = h5_tree();
    let launcher = Launcher::new(Topology::single_host(1), LaunchConfig::default());
    let launch = launcher
        .launch_with(
            |_: &str| -> anyhow::Result<Option<u64>> {
                std::thread::sleep(Duration::from_millis(300));
                Ok(Some(1))
            },
            is_h5,
            &[dir.path().to_path_buf()],
        )
        .unwrap();

    let err = launch
        .collect_timeout(|_| {}, Duration::from_millis(50))
        .unwrap_err();
    assert!(matches!(err, FleetError::Timeout { remaining: 1, .. }));

    // Joining still succeeds once the worker finishes
    let summary = launch.join().unwrap();
    assert_eq!(summary.workers, 1);
}

#[test]
fn test_targets_subset_of_fleet() {
    let dir = h5_tree();
    let topology = Topology::uniform(2, 2);
    let workers = topology.workers();
    let target = workers[workers.len() - 1];

    let launcher = Launcher::new(topology, LaunchConfig::default()).targets([target]);
    let launch = launcher
        .launch_with(size_of, is_h5, &[dir.path().to_path_buf()])
        .unwrap();
    assert_eq!(launch.workers(), vec![target]);
    assert_eq!(launch.producer_count(), 1);

    let mut processes = Vec::new();
    let stats = launch.collect(|tuple| processes.push(tuple.process)).unwrap();
    assert_eq!(stats.results, 2);
    assert!(processes.iter().all(|p| *p == target));

    launch.join().unwrap();
}

#[test]
fn test_first_sentinel_loses_slow_directory() {
    let empty = tempdir().unwrap();
    let large = tempdir().unwrap();
    for i in 0..500 {
        write_bytes(&large.path().join(format!("f{i:03}.dat")), 1);
    }

    let config = LaunchConfig {
        termination: Termination::FirstSentinel,
        job_capacity: 1,
        ..LaunchConfig::default()
    };
    let launcher = Launcher::new(Topology::single_host(2), config);
    // The empty directory's producer posts its sentinels almost at once
    let dirs = vec![empty.path().to_path_buf(), large.path().to_path_buf()];
    let launch = launcher
        .launch_with(size_of, |_: &str| -> anyhow::Result<bool> { Ok(true) }, &dirs)
        .unwrap();

    let stats = launch.collect(|_| {}).unwrap();
    assert_eq!(stats.completions, 2);

    let summary = launch.join().unwrap();
    assert!(summary.interrupted_producers >= 1);
    assert!(!summary.is_complete());
    assert!(summary.jobs_processed < 500);
    assert_eq!(summary.results, stats.results);
}

#[cfg(target_os = "linux")]
#[test]
fn test_non_utf8_file_reported_as_skipped() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = tempdir().unwrap();
    write_bytes(&dir.path().join(OsStr::from_bytes(b"bad\xff.h5")), 10);
    write_bytes(&dir.path().join("good.h5"), 5);

    let launcher = Launcher::new(Topology::single_host(1), LaunchConfig::default());
    let launch = launcher.launch(size_of, &[dir.path().to_path_buf()]).unwrap();

    let mut got = Vec::new();
    launch.collect(|tuple| got.push((tuple.path, tuple.value))).unwrap();
    assert_eq!(got.len(), 1);
    assert!(got[0].0.ends_with("good.h5"));
    assert_eq!(got[0].1, Some(5));

    let summary = launch.join().unwrap();
    assert_eq!(summary.non_utf8_paths, 1);
    assert_eq!(summary.files_seen, 1);
    assert_eq!(summary.predicate_errors, 0);
}
