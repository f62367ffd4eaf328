use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::alerts::{Alert, WarningFlags};
use super::scoring::{Bottleneck, CpuScore, DiskScore, GpuScore, MemoryScore};

/// Every value a tick can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    CpuUsage,
    CpuIdleUsage,
    CpuInterrupt,
    CpuQueue,
    MemAvailableMb,
    MemCommitPercent,
    MemPrivateBytes,
    MemTotalBytes,
    DiskBytes,
    DiskBusyPercent,
    DiskQueue,
    DiskSplitIo,
    DiskTransfers,
    DiskReadLatency,
    DiskWriteLatency,
    NetBytesIn,
    NetBytesOut,
    NetQueue,
    PageFaults,
    PageReads,
    GpuLoad,
    GpuMemoryLoad,
    GpuMemoryControllerLoad,
    GpuTemperature,
    GpuClock,
    GpuFanRpm,
    GpuFanControl,
    GpuTotalVram,
}

impl Metric {
    pub const ALL: [Metric; 28] = [
        Metric::CpuUsage,
        Metric::CpuIdleUsage,
        Metric::CpuInterrupt,
        Metric::CpuQueue,
        Metric::MemAvailableMb,
        Metric::MemCommitPercent,
        Metric::MemPrivateBytes,
        Metric::MemTotalBytes,
        Metric::DiskBytes,
        Metric::DiskBusyPercent,
        Metric::DiskQueue,
        Metric::DiskSplitIo,
        Metric::DiskTransfers,
        Metric::DiskReadLatency,
        Metric::DiskWriteLatency,
        Metric::NetBytesIn,
        Metric::NetBytesOut,
        Metric::NetQueue,
        Metric::PageFaults,
        Metric::PageReads,
        Metric::GpuLoad,
        Metric::GpuMemoryLoad,
        Metric::GpuMemoryControllerLoad,
        Metric::GpuTemperature,
        Metric::GpuClock,
        Metric::GpuFanRpm,
        Metric::GpuFanControl,
        Metric::GpuTotalVram,
    ];

    /// Stable metric name used in JSON output and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Metric::CpuUsage => "cpu_usage",
            Metric::CpuIdleUsage => "cpu_idle_usage",
            Metric::CpuInterrupt => "cpu_interrupt",
            Metric::CpuQueue => "cpu_queue",
            Metric::MemAvailableMb => "mem_available_mb",
            Metric::MemCommitPercent => "mem_commit_percent",
            Metric::MemPrivateBytes => "mem_private_bytes",
            Metric::MemTotalBytes => "mem_total_bytes",
            Metric::DiskBytes => "disk_bytes",
            Metric::DiskBusyPercent => "disk_busy_percent",
            Metric::DiskQueue => "disk_queue",
            Metric::DiskSplitIo => "disk_split_io",
            Metric::DiskTransfers => "disk_transfers",
            Metric::DiskReadLatency => "disk_read_latency",
            Metric::DiskWriteLatency => "disk_write_latency",
            Metric::NetBytesIn => "net_bytes_in",
            Metric::NetBytesOut => "net_bytes_out",
            Metric::NetQueue => "net_queue",
            Metric::PageFaults => "page_faults",
            Metric::PageReads => "page_reads",
            Metric::GpuLoad => "gpu_load",
            Metric::GpuMemoryLoad => "gpu_memory_load",
            Metric::GpuMemoryControllerLoad => "gpu_memory_controller_load",
            Metric::GpuTemperature => "gpu_temperature",
            Metric::GpuClock => "gpu_clock",
            Metric::GpuFanRpm => "gpu_fan_rpm",
            Metric::GpuFanControl => "gpu_fan_control",
            Metric::GpuTotalVram => "gpu_total_vram",
        }
    }

    pub fn is_gpu(&self) -> bool {
        matches!(
            self,
            Metric::GpuLoad
                | Metric::GpuMemoryLoad
                | Metric::GpuMemoryControllerLoad
                | Metric::GpuTemperature
                | Metric::GpuClock
                | Metric::GpuFanRpm
                | Metric::GpuFanControl
                | Metric::GpuTotalVram
        )
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Metric values gathered in one tick. Missing metrics read as NaN.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Snapshot {
    values: BTreeMap<Metric, f64>,
}

impl Snapshot {
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::default()
    }

    pub fn get(&self, metric: Metric) -> f64 {
        self.values.get(&metric).copied().unwrap_or(f64::NAN)
    }

    pub fn contains(&self, metric: Metric) -> bool {
        self.values.contains_key(&metric)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        self.values.iter().map(|(metric, value)| (*metric, *value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when any GPU reading was recorded.
    pub fn has_gpu(&self) -> bool {
        self.values.keys().any(Metric::is_gpu)
    }
}

#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    values: BTreeMap<Metric, f64>,
}

impl SnapshotBuilder {
    pub fn set(mut self, metric: Metric, value: f64) -> Self {
        self.values.insert(metric, value);
        self
    }

    pub fn insert(&mut self, metric: Metric, value: f64) {
        self.values.insert(metric, value);
    }

    pub fn build(self) -> Snapshot {
        Snapshot {
            values: self.values,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CpuReport {
    pub usage_percent: f64,
    /// Usage derived from cumulative idle time rather than the counter.
    pub idle_usage_percent: f64,
    pub queue: f64,
    pub interrupt_percent: f64,
    pub score: CpuScore,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryReport {
    pub free_gib: f64,
    pub commit_percent: f64,
    pub pressure_percent: f64,
    pub used_mb: f64,
    pub total_mb: f64,
    pub score: MemoryScore,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskReport {
    pub bytes_per_sec: f64,
    pub busy_percent: f64,
    pub transfers_per_sec: f64,
    pub split_io_per_sec: f64,
    pub max_latency_ms: f64,
    pub queue: f64,
    pub score: DiskScore,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageFaultReport {
    pub faults_per_sec: f64,
    pub reads_per_sec: f64,
    pub hard_fault_ratio: f64,
    pub nvm_share: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkReport {
    pub interface: Option<String>,
    pub in_kbps: f64,
    pub out_kbps: f64,
    pub queue: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GpuReport {
    pub name: String,
    pub load_percent: f64,
    pub memory_load_percent: f64,
    pub memory_controller_percent: f64,
    pub temperature_celsius: f64,
    pub clock_mhz: f64,
    pub fan_rpm: f64,
    pub fan_control_percent: f64,
    pub total_vram_mb: f64,
    pub score: GpuScore,
}

/// Everything the presentation side receives for one tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
    pub cpu: CpuReport,
    pub memory: MemoryReport,
    pub disk: DiskReport,
    pub page_faults: PageFaultReport,
    pub network: NetworkReport,
    pub gpu: Option<GpuReport>,
    pub bottleneck: Bottleneck,
    pub warnings: WarningFlags,
    pub alerts: Vec<Alert>,
    pub raw: Snapshot,
}
