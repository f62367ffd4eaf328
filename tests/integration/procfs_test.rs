use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sysmon::core::system_monitor::{
    CounterBackend, CounterRegistry, IdleSampler, MetricsCollector, SamplingLoop, SystemProfile,
    WarningThresholds, NETWORK_CATEGORY,
};
use sysmon::platform::procfs::ProcfsBackend;
use sysmon::platform::system_times::ProcStatTimes;
use tempfile::TempDir;

const STAT: &str = "\
cpu  4000 0 1000 14000 500 200 300 0 0 0
cpu0 2000 0 500 7000 250 100 150 0 0 0
cpu1 2000 0 500 7000 250 100 150 0 0 0
intr 0
";

const MEMINFO: &str = "\
MemTotal:       8388608 kB
MemFree:        1048576 kB
MemAvailable:   4194304 kB
AnonPages:      2097152 kB
CommitLimit:    8000000 kB
Committed_AS:   2000000 kB
";

const VMSTAT: &str = "pgfault 100000\npgmajfault 50\n";

const LOADAVG: &str = "0.50 0.40 0.30 5/300 4242\n";

const DISKSTATS: &str = "\
   8       0 sda 1000 0 2000 500 3000 0 4000 900 0 1500 2400 0 0 0 0
   7       0 loop0 50 0 100 5 0 0 0 0 0 5 5 0 0 0 0
";

const NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 1234567     1234    0    0    0     0          0         0  1234567     1234    0    0    0     0       0          0
  eth0: 9876543     5678    0    0    0     0          0         0 87654321     4321    0    0    0     0       0          0
";

const NET_DEV_NO_ETH: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 1234567     1234    0    0    0     0          0         0  1234567     1234    0    0    0     0       0          0
";

fn fake_proc() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::write(root.join("stat"), STAT).unwrap();
    fs::write(root.join("meminfo"), MEMINFO).unwrap();
    fs::write(root.join("vmstat"), VMSTAT).unwrap();
    fs::write(root.join("loadavg"), LOADAVG).unwrap();
    fs::write(root.join("diskstats"), DISKSTATS).unwrap();
    fs::create_dir(root.join("net")).unwrap();
    fs::write(root.join("net").join("dev"), NET_DEV).unwrap();
    dir
}

fn sampling_loop(root: &Path) -> SamplingLoop {
    let registry = CounterRegistry::new(Box::new(ProcfsBackend::with_root(root)));
    let profile = SystemProfile {
        total_memory_bytes: 8 * 1024 * 1024 * 1024,
        logical_cores: 2,
    };
    let collector = MetricsCollector::open(Arc::clone(&registry), profile, None).unwrap();
    let idle = IdleSampler::new(
        Box::new(ProcStatTimes::with_root(root, 100)),
        profile.logical_cores,
    );
    SamplingLoop::new(
        collector,
        idle,
        WarningThresholds::default(),
        Duration::from_secs(1),
        true,
    )
}

#[test]
fn test_instances_from_fake_proc() {
    let dir = fake_proc();
    let backend = ProcfsBackend::with_root(dir.path());

    assert_eq!(
        backend.instances(NETWORK_CATEGORY).unwrap(),
        vec!["lo".to_string(), "eth0".to_string()]
    );
    assert_eq!(
        backend.instances("PhysicalDisk").unwrap(),
        vec!["sda".to_string(), "_Total".to_string()]
    );
    assert_eq!(backend.instances("Processor").unwrap().len(), 3);
}

#[test]
fn test_gauges_from_fake_proc() {
    let dir = fake_proc();
    let mut sampling = sampling_loop(dir.path());
    assert_eq!(sampling.collector().network_interface(), Some("eth0"));

    let report = sampling.tick(Instant::now() + Duration::from_secs(1));
    assert_eq!(report.memory.free_gib, 4.0);
    assert_eq!(report.memory.commit_percent, 25.0);
    assert_eq!(report.memory.score.pressure, 0.25);
    // 5 runnable on 2 online CPUs.
    assert_eq!(report.cpu.queue, 3.0);
    assert_eq!(report.disk.split_io_per_sec, 0.0);
    assert_eq!(report.network.queue, 0.0);
}

#[test]
fn test_removed_interface_reads_nan() {
    let dir = fake_proc();
    let mut sampling = sampling_loop(dir.path());
    let live = sampling.collector().live_counters();

    fs::write(dir.path().join("net").join("dev"), NET_DEV_NO_ETH).unwrap();
    let report = sampling.tick(Instant::now() + Duration::from_secs(1));
    assert!(report.network.in_kbps.is_nan());
    assert!(report.network.out_kbps.is_nan());
    assert_eq!(sampling.collector().live_counters(), live - 2);

    // Still gone: reopening fails and the counters stay released.
    let report = sampling.tick(Instant::now() + Duration::from_secs(2));
    assert!(report.network.in_kbps.is_nan());
    assert_eq!(sampling.collector().live_counters(), live - 2);
}
