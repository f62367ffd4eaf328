use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::system_monitor::WarningThresholds;

pub const FREE_MEMORY_RANGE: (f64, f64) = (0.5, 4.0);
pub const MEMORY_PRESSURE_RANGE: (f64, f64) = (0.5, 0.99);
pub const INTERVAL_RANGE_MS: (u64, u64) = (100, 5000);

pub const DEFAULT_FREE_MEMORY_GIB: f64 = 1.5;
pub const DEFAULT_MEMORY_PRESSURE: f64 = 0.9;
pub const DEFAULT_INTERVAL_MS: u64 = 2500;

/// Clamp into `[min, max]`. NaN falls back to `min`.
fn limit_range(value: f64, (min, max): (f64, f64)) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

/// Persisted monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Free memory (GiB) at or below which the memory group warns
    pub free_memory_threshold_gib: f64,
    /// Private bytes over physical memory at or above which the memory group warns
    pub memory_pressure_threshold: f64,
    pub interval_ms: u64,
    pub flash_warnings: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            free_memory_threshold_gib: DEFAULT_FREE_MEMORY_GIB,
            memory_pressure_threshold: DEFAULT_MEMORY_PRESSURE,
            interval_ms: DEFAULT_INTERVAL_MS,
            flash_warnings: true,
        }
    }
}

impl MonitorConfig {
    /// Load from the default location. Missing or unreadable files give defaults.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Ok(Self::load_from(&config_path))
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) => {
                log::warn!("Failed to read config file {:?}: {}", path, e);
                return Self::default();
            }
        };

        if data.trim().is_empty() {
            return Self::default();
        }

        match serde_json::from_str::<MonitorConfig>(&data) {
            Ok(config) => {
                let clamped = config.clamped();
                if clamped != config {
                    log::info!("Config values out of range were clamped");
                }
                clamped
            }
            Err(e) => {
                log::warn!("Ignoring corrupt config file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let data =
            serde_json::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        fs::write(path, data)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        log::info!("Saved config to {:?}", path);
        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().with_context(|| "Could not determine config directory")?;

        Ok(config_dir.join("sysmon").join("config.json"))
    }

    /// Copy with every value pulled into its allowed range.
    pub fn clamped(&self) -> Self {
        Self {
            free_memory_threshold_gib: limit_range(
                self.free_memory_threshold_gib,
                FREE_MEMORY_RANGE,
            ),
            memory_pressure_threshold: limit_range(
                self.memory_pressure_threshold,
                MEMORY_PRESSURE_RANGE,
            ),
            interval_ms: self
                .interval_ms
                .clamp(INTERVAL_RANGE_MS.0, INTERVAL_RANGE_MS.1),
            flash_warnings: self.flash_warnings,
        }
    }

    pub fn set_free_memory_threshold(&mut self, gib: f64) {
        self.free_memory_threshold_gib = limit_range(gib, FREE_MEMORY_RANGE);
    }

    pub fn set_memory_pressure_threshold(&mut self, fraction: f64) {
        self.memory_pressure_threshold = limit_range(fraction, MEMORY_PRESSURE_RANGE);
    }

    pub fn set_interval_ms(&mut self, ms: u64) {
        self.interval_ms = ms.clamp(INTERVAL_RANGE_MS.0, INTERVAL_RANGE_MS.1);
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Warning thresholds with the configurable memory limits applied.
    pub fn thresholds(&self) -> WarningThresholds {
        WarningThresholds {
            free_memory_gib: self.free_memory_threshold_gib,
            memory_pressure: self.memory_pressure_threshold,
            ..Default::default()
        }
    }
}
