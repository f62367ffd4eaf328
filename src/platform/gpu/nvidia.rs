#[cfg(feature = "nvml")]
use nvml_wrapper::{
    enum_wrappers::device::{Clock, TemperatureSensor},
    Device, Nvml,
};

use crate::core::system_monitor::{GpuReadings, HardwareMonitor};
#[cfg(feature = "nvml")]
use crate::error::MonitorError;
use crate::error::Result;

#[cfg(feature = "nvml")]
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// NVIDIA GPU sensors through NVML
pub struct NvidiaMonitor {
    #[cfg(feature = "nvml")]
    nvml: Nvml,
    device_index: u32,
    name: String,
    readings: GpuReadings,
}

impl NvidiaMonitor {
    /// Initialize NVML and select the first GPU.
    pub fn new() -> Result<Self> {
        Self::with_device_index(0)
    }

    pub fn with_device_index(index: u32) -> Result<Self> {
        #[cfg(feature = "nvml")]
        {
            let nvml = Nvml::init().map_err(|e| {
                MonitorError::hardware_monitor_unavailable(format!("Failed to init NVML: {}", e))
            })?;

            let name = nvml
                .device_by_index(index)
                .map_err(|e| {
                    MonitorError::hardware_monitor_unavailable(format!(
                        "GPU {} not found: {}",
                        index, e
                    ))
                })?
                .name()
                .unwrap_or_else(|_| "Unknown NVIDIA GPU".to_string());

            Ok(Self {
                nvml,
                device_index: index,
                name,
                readings: GpuReadings::default(),
            })
        }
        #[cfg(not(feature = "nvml"))]
        {
            let _ = index;
            Err(crate::error::MonitorError::hardware_monitor_unavailable(
                "NVIDIA GPU support not enabled",
            ))
        }
    }

    #[cfg(feature = "nvml")]
    fn device(&self) -> Result<Device<'_>> {
        self.nvml.device_by_index(self.device_index).map_err(|e| {
            MonitorError::metric_collection(format!("Failed to get GPU device: {}", e))
        })
    }
}

impl HardwareMonitor for NvidiaMonitor {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self) -> Result<()> {
        #[cfg(feature = "nvml")]
        {
            let device = self.device()?;
            let mut readings = GpuReadings::default();

            if let Ok(utilization) = device.utilization_rates() {
                readings.load_percent = f64::from(utilization.gpu);
                readings.memory_controller_percent = f64::from(utilization.memory);
            }

            if let Ok(memory) = device.memory_info() {
                readings.total_vram_mb = memory.total as f64 / BYTES_PER_MB;
                if memory.total > 0 {
                    readings.memory_load_percent =
                        memory.used as f64 / memory.total as f64 * 100.0;
                }
            }

            if let Ok(temperature) = device.temperature(TemperatureSensor::Gpu) {
                readings.temperature_celsius = f64::from(temperature);
            }

            if let Ok(clock) = device.clock_info(Clock::Graphics) {
                readings.clock_mhz = f64::from(clock);
            }

            // NVML reports the fan as a percentage of its maximum; RPM stays NaN.
            if let Ok(fan) = device.fan_speed(0) {
                readings.fan_control_percent = f64::from(fan);
            }

            self.readings = readings;
            Ok(())
        }
        #[cfg(not(feature = "nvml"))]
        {
            let _ = self.device_index;
            Err(crate::error::MonitorError::hardware_monitor_unavailable(
                "NVIDIA GPU support not enabled",
            ))
        }
    }

    fn readings(&self) -> GpuReadings {
        self.readings
    }
}
