// Platform-specific code module

pub mod gpu;
#[cfg(windows)]
pub mod pdh;
#[cfg(target_os = "linux")]
pub mod procfs;
pub mod system_times;

use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

use crate::core::system_monitor::{CounterBackend, SystemProfile, SystemTimes};
#[cfg(not(any(windows, target_os = "linux")))]
use crate::error::MonitorError;
use crate::error::Result;

// Re-exports for cleaner imports
pub use gpu::detect_hardware_monitor;

/// The OS counter subsystem for this platform.
pub fn default_backend() -> Result<Box<dyn CounterBackend>> {
    #[cfg(windows)]
    {
        Ok(Box::new(pdh::PdhBackend::new()))
    }
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(procfs::ProcfsBackend::new()))
    }
    #[cfg(not(any(windows, target_os = "linux")))]
    {
        Err(MonitorError::other(
            "No performance counter backend for this platform",
        ))
    }
}

/// Cumulative CPU time source for the idle sampler.
pub fn default_system_times() -> Result<Box<dyn SystemTimes>> {
    #[cfg(windows)]
    {
        Ok(Box::new(system_times::WindowsSystemTimes))
    }
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(system_times::ProcStatTimes::new()))
    }
    #[cfg(not(any(windows, target_os = "linux")))]
    {
        Err(MonitorError::system_times(
            "No CPU time source for this platform",
        ))
    }
}

/// Total physical memory and logical core count.
pub fn probe_system_profile() -> SystemProfile {
    let system = System::new_with_specifics(
        RefreshKind::nothing()
            .with_memory(MemoryRefreshKind::nothing().with_ram())
            .with_cpu(CpuRefreshKind::nothing()),
    );

    let logical_cores = match system.cpus().len() {
        0 => std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
        n => n,
    };

    SystemProfile {
        total_memory_bytes: system.total_memory(),
        logical_cores,
    }
}
