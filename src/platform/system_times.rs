//! Cumulative CPU time sources for the idle sampler.

use crate::core::system_monitor::{CpuTimes, SystemTimes};
use crate::error::{MonitorError, Result};

#[cfg(windows)]
pub use windows_impl::WindowsSystemTimes;

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use windows_sys::Win32::Foundation::FILETIME;
    use windows_sys::Win32::System::Threading::GetSystemTimes;

    /// `GetSystemTimes`, already in 100 ns ticks summed over all cores.
    #[derive(Debug, Default)]
    pub struct WindowsSystemTimes;

    fn filetime_to_u64(ft: FILETIME) -> u64 {
        u64::from(ft.dwLowDateTime) | (u64::from(ft.dwHighDateTime) << 32)
    }

    impl SystemTimes for WindowsSystemTimes {
        fn cpu_times(&mut self) -> Result<CpuTimes> {
            let empty = FILETIME {
                dwLowDateTime: 0,
                dwHighDateTime: 0,
            };
            let (mut idle, mut kernel, mut user) = (empty, empty, empty);

            let ok = unsafe { GetSystemTimes(&mut idle, &mut kernel, &mut user) };
            if ok == 0 {
                return Err(MonitorError::system_times(format!(
                    "GetSystemTimes failed: {}",
                    std::io::Error::last_os_error()
                )));
            }

            Ok(CpuTimes {
                idle: filetime_to_u64(idle),
                kernel: filetime_to_u64(kernel),
                user: filetime_to_u64(user),
            })
        }
    }
}

/// 100 ns ticks per second.
const TICKS_PER_SECOND: u64 = 10_000_000;

/// Aggregate `cpu` line of `/proc/stat`, scaled from jiffies to 100 ns ticks.
///
/// Idle includes iowait. Kernel covers system, irq and softirq time.
#[derive(Debug, Clone)]
pub struct ProcStatTimes {
    stat_path: std::path::PathBuf,
    clock_ticks: u64,
}

impl ProcStatTimes {
    pub fn new() -> Self {
        Self::with_root("/proc", clock_ticks_per_second())
    }

    pub fn with_root(root: impl AsRef<std::path::Path>, clock_ticks: u64) -> Self {
        Self {
            stat_path: root.as_ref().join("stat"),
            clock_ticks: clock_ticks.max(1),
        }
    }
}

impl Default for ProcStatTimes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn clock_ticks_per_second() -> u64 {
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 {
        ticks as u64
    } else {
        100
    }
}

#[cfg(not(unix))]
fn clock_ticks_per_second() -> u64 {
    100
}

/// Parse the aggregate `cpu` line into jiffies.
pub fn parse_proc_stat_cpu(content: &str) -> Option<CpuTimes> {
    let line = content.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|f| f.parse().unwrap_or(0))
        .collect();

    let field = |i: usize| fields.get(i).copied().unwrap_or(0);
    // user nice system idle iowait irq softirq steal
    Some(CpuTimes {
        idle: field(3) + field(4),
        kernel: field(2) + field(5) + field(6),
        user: field(0) + field(1),
    })
}

impl SystemTimes for ProcStatTimes {
    fn cpu_times(&mut self) -> Result<CpuTimes> {
        let content = std::fs::read_to_string(&self.stat_path).map_err(|e| {
            MonitorError::system_times(format!("{}: {}", self.stat_path.display(), e))
        })?;
        let jiffies = parse_proc_stat_cpu(&content).ok_or_else(|| {
            MonitorError::system_times(format!("no cpu line in {}", self.stat_path.display()))
        })?;

        let scale = |v: u64| v.saturating_mul(TICKS_PER_SECOND) / self.clock_ticks;
        Ok(CpuTimes {
            idle: scale(jiffies.idle),
            kernel: scale(jiffies.kernel),
            user: scale(jiffies.user),
        })
    }
}
