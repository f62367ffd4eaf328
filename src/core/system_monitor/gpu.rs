use serde::Serialize;

use super::metrics::{Metric, SnapshotBuilder};
use crate::error::Result;

/// Flat set of GPU sensor readings. Unsupported sensors stay NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpuReadings {
    pub load_percent: f64,
    pub memory_load_percent: f64,
    pub memory_controller_percent: f64,
    pub temperature_celsius: f64,
    pub clock_mhz: f64,
    pub fan_rpm: f64,
    pub fan_control_percent: f64,
    pub total_vram_mb: f64,
}

impl Default for GpuReadings {
    fn default() -> Self {
        Self {
            load_percent: f64::NAN,
            memory_load_percent: f64::NAN,
            memory_controller_percent: f64::NAN,
            temperature_celsius: f64::NAN,
            clock_mhz: f64::NAN,
            fan_rpm: f64::NAN,
            fan_control_percent: f64::NAN,
            total_vram_mb: f64::NAN,
        }
    }
}

impl GpuReadings {
    pub fn record(&self, builder: &mut SnapshotBuilder) {
        builder.insert(Metric::GpuLoad, self.load_percent);
        builder.insert(Metric::GpuMemoryLoad, self.memory_load_percent);
        builder.insert(Metric::GpuMemoryControllerLoad, self.memory_controller_percent);
        builder.insert(Metric::GpuTemperature, self.temperature_celsius);
        builder.insert(Metric::GpuClock, self.clock_mhz);
        builder.insert(Metric::GpuFanRpm, self.fan_rpm);
        builder.insert(Metric::GpuFanControl, self.fan_control_percent);
        builder.insert(Metric::GpuTotalVram, self.total_vram_mb);
    }
}

/// Hardware sensor source for the GPU domain.
///
/// Implementations live in the platform layer. The sampling loop calls
/// [`update`](HardwareMonitor::update) once per tick, then reads the cached
/// values.
pub trait HardwareMonitor: Send {
    /// Display name of the monitored device
    fn name(&self) -> &str;

    /// Refresh the cached sensor values
    fn update(&mut self) -> Result<()>;

    /// Values from the last successful update
    fn readings(&self) -> GpuReadings;
}
