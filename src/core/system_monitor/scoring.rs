//! Bottleneck scoring.
//!
//! Converts one [`Snapshot`] into a pressure score per domain. Scores sit on
//! a 0–10+ scale where 8 marks a bottleneck. The bounds below are policy and
//! are never renormalized.

use std::fmt;

use serde::Serialize;

use super::metrics::{Metric, Snapshot};

/// Free memory (GiB) below which the scarcity term kicks in.
pub const LOW_MEM_THRESHOLD_GIB: f64 = 4.0;
/// Score added per GiB of free memory below [`LOW_MEM_THRESHOLD_GIB`].
pub const LOW_MEM_MULTIPLIER: f64 = 5.2;
/// Score at which a domain counts as the bottleneck.
pub const BOTTLENECK_THRESHOLD: f64 = 8.0;
/// Page fault and disk byte rates at or below this are treated as zero.
pub const RATE_EPSILON: f64 = 0.0001;
/// Bytes attributed to one page read when estimating the paging share of disk traffic.
pub const PAGE_READ_BYTES: f64 = 4048.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CpuScore {
    pub score: f64,
    pub curve: f64,
    pub queue_term: f64,
    pub interrupt_term: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MemoryScore {
    pub score: f64,
    pub pressure: f64,
    pub pressure_term: f64,
    pub scarcity_term: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DiskScore {
    pub score: f64,
    pub max_latency_ms: f64,
    pub queue_term: f64,
    pub split_term: f64,
    pub latency_term: f64,
    pub transfer_term: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GpuScore {
    pub score: f64,
    pub load_term: f64,
    /// Memory pressure plus memory-controller load.
    pub memory_term: f64,
}

/// Domain named as the current bottleneck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Domain {
    #[serde(rename = "MEM")]
    Memory,
    #[serde(rename = "NVM")]
    Disk,
    #[serde(rename = "CPU")]
    Cpu,
    #[serde(rename = "GPU")]
    Gpu,
}

impl Domain {
    pub fn label(&self) -> &'static str {
        match self {
            Domain::Memory => "MEM",
            Domain::Disk => "NVM",
            Domain::Cpu => "CPU",
            Domain::Gpu => "GPU",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Dominant domain plus the scores it was picked from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bottleneck {
    pub dominant: Option<Domain>,
    pub memory: f64,
    pub disk: f64,
    pub cpu: f64,
    pub gpu: Option<f64>,
}

impl Bottleneck {
    pub fn label(&self) -> &'static str {
        self.dominant.map(|d| d.label()).unwrap_or("none")
    }
}

/// Every score for one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scores {
    pub cpu: CpuScore,
    pub memory: MemoryScore,
    pub disk: DiskScore,
    pub gpu: Option<GpuScore>,
    pub bottleneck: Bottleneck,
}

impl Scores {
    /// Highest domain score, GPU included when present. NaN scores are ignored.
    pub fn max_score(&self) -> f64 {
        let gpu = self.gpu.map(|g| g.score).unwrap_or(f64::NAN);
        self.cpu
            .score
            .max(self.disk.score)
            .max(self.memory.score)
            .max(gpu)
    }
}

/// Clamp that keeps NaN as NaN.
fn limit_range(value: f64, min: f64, max: f64) -> f64 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// Zero for negative input, NaN passes through.
fn non_negative(value: f64) -> f64 {
    if value < 0.0 {
        0.0
    } else {
        value
    }
}

/// `usage` in percent, `interrupt` in percent.
pub fn cpu_score(usage: f64, queue: f64, interrupt: f64) -> CpuScore {
    let fraction = usage / 100.0;
    let curve = limit_range((fraction + 0.4).powf(7.1) - fraction / 10.0, 0.0, 10.0);
    let queue_term = queue / 2.0;
    let interrupt_term = interrupt / 4.0;

    CpuScore {
        score: curve + queue_term + interrupt_term,
        curve,
        queue_term,
        interrupt_term,
    }
}

/// Pressure is private bytes over total physical bytes.
pub fn memory_score(private_bytes: f64, total_bytes: f64, free_gib: f64) -> MemoryScore {
    let pressure = private_bytes / total_bytes;
    let pressure_term = pressure * 10.0;
    let scarcity_term = non_negative(LOW_MEM_THRESHOLD_GIB - free_gib) * LOW_MEM_MULTIPLIER;

    MemoryScore {
        score: pressure_term + scarcity_term,
        pressure,
        pressure_term,
        scarcity_term,
    }
}

/// Latencies are in seconds, as the counters report them.
pub fn disk_score(
    queue: f64,
    split_io: f64,
    read_latency: f64,
    write_latency: f64,
    transfers: f64,
) -> DiskScore {
    let max_latency_ms = (read_latency * 1000.0).max(write_latency * 1000.0);
    let queue_term = limit_range(queue, 0.0, 8.0);
    let split_term = limit_range(split_io * 0.3, 0.0, 4.0);
    let latency_term = max_latency_ms * 0.08;
    let transfer_term = limit_range(transfers / 500.0, 0.0, 1.0);

    DiskScore {
        score: queue_term + split_term + latency_term + transfer_term,
        max_latency_ms,
        queue_term,
        split_term,
        latency_term,
        transfer_term,
    }
}

pub fn gpu_score(load: f64, memory_load: f64, controller_load: f64) -> GpuScore {
    let load_term = load / 10.0;
    let memory_term = non_negative(memory_load / 10.0 - 7.0) + controller_load / 10.0;

    GpuScore {
        score: load_term + memory_term,
        load_term,
        memory_term,
    }
}

/// Share of page faults that had to read from disk.
pub fn hard_fault_ratio(page_reads: f64, page_faults: f64) -> f64 {
    if page_faults <= RATE_EPSILON {
        0.0
    } else {
        page_reads / page_faults
    }
}

/// Estimated share of disk traffic spent on paging.
pub fn nvm_page_share(page_reads: f64, disk_bytes: f64) -> f64 {
    if disk_bytes <= RATE_EPSILON {
        0.0
    } else {
        page_reads * PAGE_READ_BYTES / disk_bytes
    }
}

/// First domain at or above [`BOTTLENECK_THRESHOLD`], in priority order
/// memory, disk, CPU, GPU.
pub fn dominant(memory: f64, disk: f64, cpu: f64, gpu: Option<f64>) -> Option<Domain> {
    [
        (Domain::Memory, memory),
        (Domain::Disk, disk),
        (Domain::Cpu, cpu),
        (Domain::Gpu, gpu.unwrap_or(f64::NAN)),
    ]
    .into_iter()
    .find(|(_, score)| *score >= BOTTLENECK_THRESHOLD)
    .map(|(domain, _)| domain)
}

/// Score every domain in `snapshot`. GPU is scored only when GPU readings are present.
pub fn score(snapshot: &Snapshot) -> Scores {
    let cpu = cpu_score(
        snapshot.get(Metric::CpuUsage),
        snapshot.get(Metric::CpuQueue),
        snapshot.get(Metric::CpuInterrupt),
    );

    let free_gib = snapshot.get(Metric::MemAvailableMb) / 1024.0;
    let memory = memory_score(
        snapshot.get(Metric::MemPrivateBytes),
        snapshot.get(Metric::MemTotalBytes),
        free_gib,
    );

    let disk = disk_score(
        snapshot.get(Metric::DiskQueue),
        snapshot.get(Metric::DiskSplitIo),
        snapshot.get(Metric::DiskReadLatency),
        snapshot.get(Metric::DiskWriteLatency),
        snapshot.get(Metric::DiskTransfers),
    );

    let gpu = snapshot.has_gpu().then(|| {
        gpu_score(
            snapshot.get(Metric::GpuLoad),
            snapshot.get(Metric::GpuMemoryLoad),
            snapshot.get(Metric::GpuMemoryControllerLoad),
        )
    });

    let gpu_total = gpu.map(|g| g.score);
    let bottleneck = Bottleneck {
        dominant: dominant(memory.score, disk.score, cpu.score, gpu_total),
        memory: memory.score,
        disk: disk.score,
        cpu: cpu.score,
        gpu: gpu_total,
    };

    Scores {
        cpu,
        memory,
        disk,
        gpu,
        bottleneck,
    }
}
