//! Counter backend that emulates the standard counter set from procfs.
//!
//! Cumulative kernel totals are turned into per-second rates or ratios of
//! deltas between consecutive reads, so the first read of such a counter is
//! a transient failure. Counters without a Linux equivalent read 0.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::core::system_monitor::{
    CounterBackend, CounterPath, RawCounter, ReadFailure, NETWORK_CATEGORY,
};
use crate::error::{MonitorError, Result};

const TOTAL: &str = "_Total";
const SECTOR_BYTES: f64 = 512.0;

/// Device name prefixes that are never physical disks.
const VIRTUAL_DISK_PREFIXES: [&str; 6] = ["loop", "ram", "zram", "sr", "fd", "dm-"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    CpuBusy,
    CpuInterrupt,
    RunQueue,
    MemAvailable,
    CommitPercent,
    AnonBytes,
    DiskBytes,
    DiskBusy,
    DiskInFlight,
    DiskTransfers,
    DiskReadLatency,
    DiskWriteLatency,
    NetRx(String),
    NetTx(String),
    PageFaults,
    MajorFaults,
    Zero,
}

fn resolve(path: &CounterPath) -> Option<Source> {
    let source = match (
        path.category.as_str(),
        path.counter.as_str(),
        path.instance.as_deref(),
    ) {
        ("Processor", "% Processor Time", Some(TOTAL)) => Source::CpuBusy,
        ("Processor", "% Interrupt Time", Some(TOTAL)) => Source::CpuInterrupt,
        ("System", "Processor Queue Length", None) => Source::RunQueue,
        ("Memory", "Available MBytes", None) => Source::MemAvailable,
        ("Memory", "% Committed Bytes In Use", None) => Source::CommitPercent,
        ("Memory", "Page Faults/sec", None) => Source::PageFaults,
        ("Memory", "Page Reads/sec", None) => Source::MajorFaults,
        ("Process", "Private Bytes", Some(TOTAL)) => Source::AnonBytes,
        ("PhysicalDisk", "Disk Bytes/sec", Some(TOTAL)) => Source::DiskBytes,
        ("PhysicalDisk", "% Disk Time", Some(TOTAL)) => Source::DiskBusy,
        ("PhysicalDisk", "Current Disk Queue Length", Some(TOTAL)) => Source::DiskInFlight,
        ("LogicalDisk", "Split IO/sec", Some(TOTAL)) => Source::Zero,
        ("LogicalDisk", "Disk Transfers/sec", Some(TOTAL)) => Source::DiskTransfers,
        ("LogicalDisk", "Avg. Disk sec/Read", Some(TOTAL)) => Source::DiskReadLatency,
        ("LogicalDisk", "Avg. Disk sec/Write", Some(TOTAL)) => Source::DiskWriteLatency,
        (NETWORK_CATEGORY, "Bytes Received/sec", Some(nic)) => Source::NetRx(nic.to_string()),
        (NETWORK_CATEGORY, "Bytes Sent/sec", Some(nic)) => Source::NetTx(nic.to_string()),
        (NETWORK_CATEGORY, "Output Queue Length", Some(_)) => Source::Zero,
        _ => return None,
    };
    Some(source)
}

// ============ Parsers ============

/// `key: value` or `key value` lines, as in `/proc/meminfo` and `/proc/vmstat`.
/// Units are dropped.
pub fn parse_key_values(content: &str) -> HashMap<String, u64> {
    content
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let key = parts.next()?.trim_end_matches(':');
            let value = parts.next()?.parse().ok()?;
            Some((key.to_string(), value))
        })
        .collect()
}

/// Fields of the aggregate `cpu` line of `/proc/stat`, in jiffies.
pub fn parse_stat_cpu(content: &str) -> Option<Vec<u64>> {
    let line = content.lines().find(|l| l.starts_with("cpu "))?;
    Some(
        line.split_whitespace()
            .skip(1)
            .map(|f| f.parse().unwrap_or(0))
            .collect(),
    )
}

/// Number of `cpuN` lines in `/proc/stat`.
pub fn count_online_cpus(content: &str) -> usize {
    content
        .lines()
        .filter(|l| {
            l.strip_prefix("cpu")
                .and_then(|rest| rest.chars().next())
                .is_some_and(|c| c.is_ascii_digit())
        })
        .count()
}

/// Currently runnable scheduling entities from `/proc/loadavg`.
pub fn parse_loadavg_runnable(content: &str) -> Option<u64> {
    let field = content.split_whitespace().nth(3)?;
    field.split('/').next()?.parse().ok()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskStat {
    pub device: String,
    pub reads: u64,
    pub read_sectors: u64,
    pub read_time_ms: u64,
    pub writes: u64,
    pub write_sectors: u64,
    pub write_time_ms: u64,
    pub in_flight: u64,
    pub io_time_ms: u64,
}

pub fn parse_diskstats(content: &str) -> Vec<DiskStat> {
    content
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 14 {
                return None;
            }
            let get_val = |idx: usize| -> u64 { parts[idx].parse().unwrap_or(0) };

            Some(DiskStat {
                device: parts[2].to_string(),
                reads: get_val(3),
                read_sectors: get_val(5),
                read_time_ms: get_val(6),
                writes: get_val(7),
                write_sectors: get_val(9),
                write_time_ms: get_val(10),
                in_flight: get_val(11),
                io_time_ms: get_val(12),
            })
        })
        .collect()
}

fn is_partition(name: &str, all: &[&str]) -> bool {
    let base = name.trim_end_matches(|c: char| c.is_ascii_digit());
    if base.len() == name.len() {
        return false;
    }
    if all.contains(&base) {
        return true;
    }
    base.strip_suffix('p')
        .is_some_and(|parent| all.contains(&parent))
}

/// Whole physical disks only: no partitions, loop, RAM or device-mapper devices.
pub fn whole_disks(stats: Vec<DiskStat>) -> Vec<DiskStat> {
    let names: Vec<String> = stats.iter().map(|d| d.device.clone()).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();

    stats
        .into_iter()
        .filter(|d| {
            !VIRTUAL_DISK_PREFIXES
                .iter()
                .any(|prefix| d.device.starts_with(prefix))
                && !is_partition(&d.device, &refs)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetDev {
    pub interface: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

pub fn parse_net_dev(content: &str) -> Vec<NetDev> {
    content
        .lines()
        .filter(|line| !line.contains('|'))
        .filter_map(|line| {
            let (name, rest) = line.split_once(':')?;
            let values: Vec<u64> = rest
                .split_whitespace()
                .map(|v| v.parse().unwrap_or(0))
                .collect();
            if values.len() < 16 {
                return None;
            }
            Some(NetDev {
                interface: name.trim().to_string(),
                rx_bytes: values[0],
                tx_bytes: values[8],
            })
        })
        .collect()
}

// ============ Backend ============

/// procfs-backed [`CounterBackend`].
#[derive(Debug, Clone)]
pub struct ProcfsBackend {
    root: PathBuf,
}

impl ProcfsBackend {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Read from an alternate proc tree.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self, name: &str) -> Result<String> {
        Ok(fs::read_to_string(self.root.join(name))?)
    }
}

impl Default for ProcfsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterBackend for ProcfsBackend {
    fn open(&self, path: &CounterPath) -> Result<Box<dyn RawCounter>> {
        let source = resolve(path)
            .ok_or_else(|| MonitorError::acquisition(path, "no procfs equivalent"))?;

        if path.category == NETWORK_CATEGORY {
            let nic = path.instance.as_deref().unwrap_or_default();
            let present = self
                .instances(NETWORK_CATEGORY)?
                .iter()
                .any(|name| name == nic);
            if !present {
                return Err(MonitorError::acquisition(path, "interface not found"));
            }
        }

        Ok(Box::new(ProcfsCounter {
            root: self.root.clone(),
            source,
            baseline: None,
        }))
    }

    fn instances(&self, category: &str) -> Result<Vec<String>> {
        let unreadable = |e: MonitorError| MonitorError::acquisition(category, e.to_string());

        match category {
            NETWORK_CATEGORY => {
                let content = self.read("net/dev").map_err(unreadable)?;
                Ok(parse_net_dev(&content)
                    .into_iter()
                    .map(|dev| dev.interface)
                    .collect())
            }
            "PhysicalDisk" => {
                let content = self.read("diskstats").map_err(unreadable)?;
                let mut names: Vec<String> = whole_disks(parse_diskstats(&content))
                    .into_iter()
                    .map(|d| d.device)
                    .collect();
                names.push(TOTAL.to_string());
                Ok(names)
            }
            "Processor" => {
                let content = self.read("stat").map_err(unreadable)?;
                let mut names: Vec<String> =
                    (0..count_online_cpus(&content)).map(|i| i.to_string()).collect();
                names.push(TOTAL.to_string());
                Ok(names)
            }
            _ => Err(MonitorError::acquisition(category, "category has no instances")),
        }
    }
}

/// What one read of a source produced, before rate conversion.
enum Sample {
    Gauge(f64),
    /// Cumulative total reported as a per-second rate times `scale`.
    Rate { total: f64, scale: f64 },
    /// Two cumulative totals reported as Δpart / Δwhole times `scale`.
    Ratio { part: f64, whole: f64, scale: f64 },
}

#[derive(Debug, Clone, Copy)]
struct Baseline {
    at: Instant,
    first: f64,
    second: f64,
}

struct ProcfsCounter {
    root: PathBuf,
    source: Source,
    baseline: Option<Baseline>,
}

impl ProcfsCounter {
    fn read(&self, name: &str) -> std::result::Result<String, ReadFailure> {
        let path = self.root.join(name);
        fs::read_to_string(&path)
            .map_err(|e| ReadFailure::Transient(format!("{}: {}", path.display(), e)))
    }

    fn stat_cpu(&self) -> std::result::Result<Vec<u64>, ReadFailure> {
        let content = self.read("stat")?;
        parse_stat_cpu(&content).ok_or_else(|| ReadFailure::Transient("no cpu line".to_string()))
    }

    fn meminfo(&self, key: &str) -> std::result::Result<f64, ReadFailure> {
        let content = self.read("meminfo")?;
        parse_key_values(&content)
            .get(key)
            .map(|kb| *kb as f64)
            .ok_or_else(|| ReadFailure::Transient(format!("{} missing from meminfo", key)))
    }

    fn vmstat(&self, key: &str) -> std::result::Result<f64, ReadFailure> {
        let content = self.read("vmstat")?;
        parse_key_values(&content)
            .get(key)
            .map(|v| *v as f64)
            .ok_or_else(|| ReadFailure::Transient(format!("{} missing from vmstat", key)))
    }

    fn disks(&self) -> std::result::Result<Vec<DiskStat>, ReadFailure> {
        Ok(whole_disks(parse_diskstats(&self.read("diskstats")?)))
    }

    fn net_dev(&self, nic: &str) -> std::result::Result<NetDev, ReadFailure> {
        parse_net_dev(&self.read("net/dev")?)
            .into_iter()
            .find(|dev| dev.interface == nic)
            .ok_or_else(|| ReadFailure::Vanished(format!("interface {} is gone", nic)))
    }

    fn sample(&self) -> std::result::Result<Sample, ReadFailure> {
        let disk_sum = |f: fn(&DiskStat) -> u64| -> std::result::Result<f64, ReadFailure> {
            Ok(self.disks()?.iter().map(f).sum::<u64>() as f64)
        };

        let sample = match &self.source {
            Source::CpuBusy | Source::CpuInterrupt => {
                let fields = self.stat_cpu()?;
                let field = |i: usize| fields.get(i).copied().unwrap_or(0) as f64;
                let total: f64 = fields.iter().take(8).map(|v| *v as f64).sum();
                let part = if self.source == Source::CpuBusy {
                    total - field(3) - field(4)
                } else {
                    field(5) + field(6)
                };
                Sample::Ratio {
                    part,
                    whole: total,
                    scale: 100.0,
                }
            }
            Source::RunQueue => {
                let loadavg = self.read("loadavg")?;
                let runnable = parse_loadavg_runnable(&loadavg).ok_or_else(|| {
                    ReadFailure::Transient("malformed loadavg".to_string())
                })?;
                let cpus = count_online_cpus(&self.read("stat")?) as u64;
                Sample::Gauge(runnable.saturating_sub(cpus) as f64)
            }
            Source::MemAvailable => Sample::Gauge(self.meminfo("MemAvailable")? / 1024.0),
            Source::CommitPercent => {
                let committed = self.meminfo("Committed_AS")?;
                let limit = self.meminfo("CommitLimit")?;
                if limit <= 0.0 {
                    return Err(ReadFailure::Transient("CommitLimit is zero".to_string()));
                }
                Sample::Gauge(committed / limit * 100.0)
            }
            Source::AnonBytes => Sample::Gauge(self.meminfo("AnonPages")? * 1024.0),
            Source::DiskBytes => Sample::Rate {
                total: disk_sum(|d| d.read_sectors + d.write_sectors)? * SECTOR_BYTES,
                scale: 1.0,
            },
            // Milliseconds busy per second, as a percentage.
            Source::DiskBusy => Sample::Rate {
                total: disk_sum(|d| d.io_time_ms)?,
                scale: 0.1,
            },
            Source::DiskInFlight => Sample::Gauge(disk_sum(|d| d.in_flight)?),
            Source::DiskTransfers => Sample::Rate {
                total: disk_sum(|d| d.reads + d.writes)?,
                scale: 1.0,
            },
            Source::DiskReadLatency => Sample::Ratio {
                part: disk_sum(|d| d.read_time_ms)?,
                whole: disk_sum(|d| d.reads)?,
                scale: 0.001,
            },
            Source::DiskWriteLatency => Sample::Ratio {
                part: disk_sum(|d| d.write_time_ms)?,
                whole: disk_sum(|d| d.writes)?,
                scale: 0.001,
            },
            Source::NetRx(nic) => Sample::Rate {
                total: self.net_dev(nic)?.rx_bytes as f64,
                scale: 1.0,
            },
            Source::NetTx(nic) => Sample::Rate {
                total: self.net_dev(nic)?.tx_bytes as f64,
                scale: 1.0,
            },
            Source::PageFaults => Sample::Rate {
                total: self.vmstat("pgfault")?,
                scale: 1.0,
            },
            Source::MajorFaults => Sample::Rate {
                total: self.vmstat("pgmajfault")?,
                scale: 1.0,
            },
            Source::Zero => Sample::Gauge(0.0),
        };

        Ok(sample)
    }

    /// Swap in a new baseline and return (Δfirst, Δsecond, Δseconds) against the old one.
    fn advance(&mut self, at: Instant, first: f64, second: f64) -> Option<(f64, f64, f64)> {
        let previous = self.baseline.replace(Baseline { at, first, second })?;
        let d_first = first - previous.first;
        let d_second = second - previous.second;
        if d_first < 0.0 || d_second < 0.0 {
            // Counter reset or wrapped.
            return None;
        }
        let seconds = at.saturating_duration_since(previous.at).as_secs_f64();
        Some((d_first, d_second, seconds))
    }

    fn read_at(&mut self, now: Instant) -> std::result::Result<f64, ReadFailure> {
        let no_baseline = || ReadFailure::Transient("waiting for a second sample".to_string());

        match self.sample()? {
            Sample::Gauge(value) => Ok(value),
            Sample::Rate { total, scale } => {
                let (delta, _, seconds) = self.advance(now, total, 0.0).ok_or_else(no_baseline)?;
                if seconds <= 0.0 {
                    return Err(ReadFailure::Transient("zero-length interval".to_string()));
                }
                Ok(delta / seconds * scale)
            }
            Sample::Ratio { part, whole, scale } => {
                let (d_part, d_whole, _) = self.advance(now, part, whole).ok_or_else(no_baseline)?;
                if d_whole <= 0.0 {
                    Ok(0.0)
                } else {
                    Ok(d_part / d_whole * scale)
                }
            }
        }
    }
}

impl RawCounter for ProcfsCounter {
    fn next_value(&mut self) -> std::result::Result<f64, ReadFailure> {
        self.read_at(Instant::now())
    }
}
