//! Hardware monitor discovery.
//!
//! A GPU monitor is attached only when its vendor library is installed.
//! Without one the GPU domain is skipped.

mod nvidia;

pub use nvidia::NvidiaMonitor;

use std::path::{Path, PathBuf};

use crate::core::system_monitor::HardwareMonitor;
use crate::error::{MonitorError, Result};

/// Places the NVML support library is installed to.
pub fn nvml_library_candidates() -> Vec<PathBuf> {
    if cfg!(windows) {
        let system_root = std::env::var_os("SystemRoot")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\Windows"));
        let program_files = std::env::var_os("ProgramFiles")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\Program Files"));
        vec![
            system_root.join("System32").join("nvml.dll"),
            program_files
                .join("NVIDIA Corporation")
                .join("NVSMI")
                .join("nvml.dll"),
        ]
    } else {
        [
            "/usr/lib/x86_64-linux-gnu",
            "/usr/lib64",
            "/usr/lib",
            "/usr/lib/wsl/lib",
        ]
        .iter()
        .map(|dir| Path::new(dir).join("libnvidia-ml.so.1"))
        .collect()
    }
}

/// True when any of `candidates` exists on disk.
pub fn library_present(candidates: &[PathBuf]) -> bool {
    candidates.iter().any(|path| path.is_file())
}

/// Attach a hardware monitor if its library is installed and initializes.
pub fn detect_hardware_monitor() -> Result<Box<dyn HardwareMonitor>> {
    if !library_present(&nvml_library_candidates()) {
        return Err(MonitorError::hardware_monitor_unavailable(
            "NVML library not found",
        ));
    }

    let monitor = NvidiaMonitor::new()?;
    Ok(Box::new(monitor))
}
