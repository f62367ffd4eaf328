//! Opens the standard counter set and turns each tick's readings into a [`Snapshot`].

use std::sync::Arc;

use super::counters::{CounterHandle, CounterPath, CounterRegistry};
use super::gpu::{GpuReadings, HardwareMonitor};
use super::metrics::{Metric, Snapshot, SnapshotBuilder};
use crate::error::Result;

/// Counter category that lists network interfaces.
pub const NETWORK_CATEGORY: &str = "Network Interface";

/// Static facts about the machine, probed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemProfile {
    pub total_memory_bytes: u64,
    pub logical_cores: usize,
}

impl SystemProfile {
    pub fn total_memory_mb(&self) -> f64 {
        self.total_memory_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// First interface that is not loopback or a tunnel pseudo-interface.
pub fn pick_network_instance(instances: &[String]) -> Option<String> {
    instances
        .iter()
        .find(|name| {
            let lower = name.to_ascii_lowercase();
            !(lower == "lo"
                || lower.contains("loopback")
                || lower.starts_with("isatap")
                || lower.starts_with("teredo")
                || lower.contains("pseudo"))
        })
        .cloned()
}

/// The counters sampled every tick. Network counters are left out when no
/// interface was found.
pub fn standard_counter_paths(nic: Option<&str>) -> Vec<(Metric, CounterPath)> {
    let total = Some("_Total");
    let mut paths = vec![
        (
            Metric::CpuUsage,
            CounterPath::new("Processor", "% Processor Time", total),
        ),
        (
            Metric::CpuInterrupt,
            CounterPath::new("Processor", "% Interrupt Time", total),
        ),
        (
            Metric::CpuQueue,
            CounterPath::new("System", "Processor Queue Length", None),
        ),
        (
            Metric::MemAvailableMb,
            CounterPath::new("Memory", "Available MBytes", None),
        ),
        (
            Metric::MemCommitPercent,
            CounterPath::new("Memory", "% Committed Bytes In Use", None),
        ),
        (
            Metric::MemPrivateBytes,
            CounterPath::new("Process", "Private Bytes", total),
        ),
        (
            Metric::DiskBytes,
            CounterPath::new("PhysicalDisk", "Disk Bytes/sec", total),
        ),
        (
            Metric::DiskBusyPercent,
            CounterPath::new("PhysicalDisk", "% Disk Time", total),
        ),
        (
            Metric::DiskQueue,
            CounterPath::new("PhysicalDisk", "Current Disk Queue Length", total),
        ),
        (
            Metric::DiskSplitIo,
            CounterPath::new("LogicalDisk", "Split IO/sec", total),
        ),
        (
            Metric::DiskTransfers,
            CounterPath::new("LogicalDisk", "Disk Transfers/sec", total),
        ),
        (
            Metric::DiskReadLatency,
            CounterPath::new("LogicalDisk", "Avg. Disk sec/Read", total),
        ),
        (
            Metric::DiskWriteLatency,
            CounterPath::new("LogicalDisk", "Avg. Disk sec/Write", total),
        ),
        (
            Metric::PageFaults,
            CounterPath::new("Memory", "Page Faults/sec", None),
        ),
        (
            Metric::PageReads,
            CounterPath::new("Memory", "Page Reads/sec", None),
        ),
    ];

    if let Some(nic) = nic {
        paths.push((
            Metric::NetBytesIn,
            CounterPath::new(NETWORK_CATEGORY, "Bytes Received/sec", Some(nic)),
        ));
        paths.push((
            Metric::NetBytesOut,
            CounterPath::new(NETWORK_CATEGORY, "Bytes Sent/sec", Some(nic)),
        ));
        paths.push((
            Metric::NetQueue,
            CounterPath::new(NETWORK_CATEGORY, "Output Queue Length", Some(nic)),
        ));
    }

    paths
}

struct CounterSlot {
    metric: Metric,
    path: CounterPath,
    /// `None` after the counter vanished, until it is reopened.
    handle: Option<CounterHandle>,
}

/// Reads the standard counter set and the hardware monitor into a snapshot.
pub struct MetricsCollector {
    registry: Arc<CounterRegistry>,
    slots: Vec<CounterSlot>,
    profile: SystemProfile,
    network_interface: Option<String>,
    hardware: Option<Box<dyn HardwareMonitor>>,
}

impl MetricsCollector {
    /// Acquire every standard counter. Fails if any of them cannot be resolved.
    pub fn open(
        registry: Arc<CounterRegistry>,
        profile: SystemProfile,
        hardware: Option<Box<dyn HardwareMonitor>>,
    ) -> Result<Self> {
        let network_interface = match registry.instances(NETWORK_CATEGORY) {
            Ok(instances) => pick_network_instance(&instances),
            Err(e) => {
                log::warn!("Could not list network interfaces: {}", e);
                None
            }
        };

        match &network_interface {
            Some(nic) => log::info!("Monitoring network interface {}", nic),
            None => log::warn!("No network interface found; network counters disabled"),
        }

        let mut slots = Vec::new();
        for (metric, path) in standard_counter_paths(network_interface.as_deref()) {
            let handle = registry.open(path.clone(), true)?;
            slots.push(CounterSlot {
                metric,
                path,
                handle: Some(handle),
            });
        }

        if let Some(hw) = &hardware {
            log::info!("Hardware monitor attached: {}", hw.name());
        }

        Ok(Self {
            registry,
            slots,
            profile,
            network_interface,
            hardware,
        })
    }

    pub fn profile(&self) -> SystemProfile {
        self.profile
    }

    pub fn network_interface(&self) -> Option<&str> {
        self.network_interface.as_deref()
    }

    pub fn hardware_name(&self) -> Option<&str> {
        self.hardware.as_ref().map(|hw| hw.name())
    }

    pub fn has_hardware_monitor(&self) -> bool {
        self.hardware.is_some()
    }

    /// Number of counters currently holding a live handle.
    pub fn live_counters(&self) -> usize {
        self.slots.iter().filter(|s| s.handle.is_some()).count()
    }

    /// Read every counter once. Failed reads are recorded as NaN.
    pub fn sample(&mut self) -> SnapshotBuilder {
        let mut builder = Snapshot::builder();

        for slot in &mut self.slots {
            let value = match slot.handle.as_mut().map(CounterHandle::read) {
                Some(read) => {
                    if read.is_invalidated() {
                        slot.handle = None;
                    }
                    read.value()
                }
                None => {
                    slot.handle = reopen(&self.registry, &slot.path);
                    f64::NAN
                }
            };
            builder.insert(slot.metric, value);
        }

        builder.insert(
            Metric::MemTotalBytes,
            self.profile.total_memory_bytes as f64,
        );

        if let Some(hw) = self.hardware.as_mut() {
            let readings = match hw.update() {
                Ok(()) => hw.readings(),
                Err(e) => {
                    log::debug!("Hardware monitor update failed: {}", e);
                    GpuReadings::default()
                }
            };
            readings.record(&mut builder);
        }

        builder
    }
}

fn reopen(registry: &Arc<CounterRegistry>, path: &CounterPath) -> Option<CounterHandle> {
    match registry.open(path.clone(), true) {
        Ok(handle) => {
            log::info!("Re-acquired counter {}", path);
            Some(handle)
        }
        Err(e) => {
            log::debug!("Counter {} still unavailable: {}", path, e);
            None
        }
    }
}
