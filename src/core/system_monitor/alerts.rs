//! Warning evaluation and highlight debouncing.
//!
//! [`evaluate_alerts`] checks one tick against the thresholds and returns the
//! breaches. [`WarningBoard`] feeds them into one [`WarningState`] per sensor
//! group so a highlight stays lit for a short window after the last breach.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::metrics::{Metric, Snapshot};
use super::scoring::Scores;

/// Highlight window restarted by every breach.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2100);

/// Debounced highlight for one sensor group.
#[derive(Debug, Clone)]
pub struct WarningState {
    window: Duration,
    expires_at: Option<Instant>,
}

impl WarningState {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            expires_at: None,
        }
    }

    /// Start or restart the window at `now`. Never stacks.
    pub fn trigger(&mut self, now: Instant) {
        self.expires_at = Some(now + self.window);
    }

    /// Drop back to normal once the window has elapsed.
    pub fn refresh(&mut self, now: Instant) {
        if matches!(self.expires_at, Some(deadline) if now >= deadline) {
            self.expires_at = None;
        }
    }

    pub fn is_active(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if now < deadline)
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }
}

impl Default for WarningState {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningGroup {
    Cpu,
    Memory,
    Disk,
    GpuLoad,
    GpuMemory,
    Bottleneck,
}

impl WarningGroup {
    pub const ALL: [WarningGroup; 6] = [
        WarningGroup::Cpu,
        WarningGroup::Memory,
        WarningGroup::Disk,
        WarningGroup::GpuLoad,
        WarningGroup::GpuMemory,
        WarningGroup::Bottleneck,
    ];

    pub fn is_gpu(&self) -> bool {
        matches!(self, WarningGroup::GpuLoad | WarningGroup::GpuMemory)
    }
}

/// Breach thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningThresholds {
    pub cpu_usage_percent: f64,
    pub cpu_queue: f64,
    /// Free memory at or below this (GiB) is a breach.
    pub free_memory_gib: f64,
    /// Pressure fraction at or above this is a breach.
    pub memory_pressure: f64,
    pub disk_split_io: f64,
    pub disk_latency_ms: f64,
    pub disk_busy_percent: f64,
    pub bottleneck_score: f64,
    pub gpu_score: f64,
}

impl Default for WarningThresholds {
    fn default() -> Self {
        Self {
            cpu_usage_percent: 85.0,
            cpu_queue: 5.0,
            free_memory_gib: 1.5,
            memory_pressure: 0.9,
            disk_split_io: 2.0,
            disk_latency_ms: 45.0,
            disk_busy_percent: 20.0,
            bottleneck_score: 6.0,
            gpu_score: 8.5,
        }
    }
}

/// A single threshold breach
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub group: WarningGroup,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
}

impl Alert {
    fn at_least(group: WarningGroup, what: &str, value: f64, threshold: f64) -> Option<Self> {
        (value >= threshold).then(|| Alert {
            group,
            message: format!("{} at {:.1} (threshold: {:.1})", what, value, threshold),
            value,
            threshold,
        })
    }

    fn at_most(group: WarningGroup, what: &str, value: f64, threshold: f64) -> Option<Self> {
        (value <= threshold).then(|| Alert {
            group,
            message: format!("{} at {:.2} (threshold: {:.2})", what, value, threshold),
            value,
            threshold,
        })
    }
}

/// Check one tick against `thresholds`. NaN readings never breach.
pub fn evaluate_alerts(
    snapshot: &Snapshot,
    scores: &Scores,
    thresholds: &WarningThresholds,
) -> Vec<Alert> {
    let free_gib = snapshot.get(Metric::MemAvailableMb) / 1024.0;

    let mut alerts: Vec<Alert> = [
        // CPU
        Alert::at_least(
            WarningGroup::Cpu,
            "CPU usage %",
            snapshot.get(Metric::CpuUsage),
            thresholds.cpu_usage_percent,
        ),
        Alert::at_least(
            WarningGroup::Cpu,
            "CPU queue",
            snapshot.get(Metric::CpuQueue),
            thresholds.cpu_queue,
        ),
        // Memory
        Alert::at_most(
            WarningGroup::Memory,
            "Free memory GiB",
            free_gib,
            thresholds.free_memory_gib,
        ),
        Alert::at_least(
            WarningGroup::Memory,
            "Memory pressure",
            scores.memory.pressure,
            thresholds.memory_pressure,
        ),
        // Disk
        Alert::at_least(
            WarningGroup::Disk,
            "Split IO/sec",
            snapshot.get(Metric::DiskSplitIo),
            thresholds.disk_split_io,
        ),
        Alert::at_least(
            WarningGroup::Disk,
            "Disk latency ms",
            scores.disk.max_latency_ms,
            thresholds.disk_latency_ms,
        ),
        Alert::at_least(
            WarningGroup::Disk,
            "Disk busy %",
            snapshot.get(Metric::DiskBusyPercent),
            thresholds.disk_busy_percent,
        ),
        // Composite
        Alert::at_least(
            WarningGroup::Bottleneck,
            "Bottleneck score",
            scores.max_score(),
            thresholds.bottleneck_score,
        ),
    ]
    .into_iter()
    .flatten()
    .collect();

    if let Some(gpu) = scores.gpu {
        alerts.extend(Alert::at_least(
            WarningGroup::GpuLoad,
            "GPU load score",
            gpu.load_term,
            thresholds.gpu_score,
        ));
        alerts.extend(Alert::at_least(
            WarningGroup::GpuMemory,
            "GPU memory score",
            gpu.memory_term,
            thresholds.gpu_score,
        ));
    }

    alerts
}

/// Active flag per group. GPU flags are `None` without a hardware monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WarningFlags {
    pub cpu: bool,
    pub memory: bool,
    pub disk: bool,
    pub bottleneck: bool,
    pub gpu_load: Option<bool>,
    pub gpu_memory: Option<bool>,
}

impl WarningFlags {
    pub fn get(&self, group: WarningGroup) -> bool {
        match group {
            WarningGroup::Cpu => self.cpu,
            WarningGroup::Memory => self.memory,
            WarningGroup::Disk => self.disk,
            WarningGroup::Bottleneck => self.bottleneck,
            WarningGroup::GpuLoad => self.gpu_load.unwrap_or(false),
            WarningGroup::GpuMemory => self.gpu_memory.unwrap_or(false),
        }
    }

    pub fn any(&self) -> bool {
        WarningGroup::ALL.iter().any(|group| self.get(*group))
    }
}

/// One [`WarningState`] per sensor group.
#[derive(Debug, Clone)]
pub struct WarningBoard {
    cpu: WarningState,
    memory: WarningState,
    disk: WarningState,
    bottleneck: WarningState,
    gpu_load: Option<WarningState>,
    gpu_memory: Option<WarningState>,
    enabled: bool,
}

impl WarningBoard {
    /// GPU groups exist only when `with_gpu` is set. A disabled board never
    /// triggers.
    pub fn new(window: Duration, with_gpu: bool, enabled: bool) -> Self {
        Self {
            cpu: WarningState::new(window),
            memory: WarningState::new(window),
            disk: WarningState::new(window),
            bottleneck: WarningState::new(window),
            gpu_load: with_gpu.then(|| WarningState::new(window)),
            gpu_memory: with_gpu.then(|| WarningState::new(window)),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn state_mut(&mut self, group: WarningGroup) -> Option<&mut WarningState> {
        match group {
            WarningGroup::Cpu => Some(&mut self.cpu),
            WarningGroup::Memory => Some(&mut self.memory),
            WarningGroup::Disk => Some(&mut self.disk),
            WarningGroup::Bottleneck => Some(&mut self.bottleneck),
            WarningGroup::GpuLoad => self.gpu_load.as_mut(),
            WarningGroup::GpuMemory => self.gpu_memory.as_mut(),
        }
    }

    /// Apply this tick's breaches at `now` and report the resulting flags.
    pub fn advance(&mut self, alerts: &[Alert], now: Instant) -> WarningFlags {
        if self.enabled {
            for alert in alerts {
                if let Some(state) = self.state_mut(alert.group) {
                    state.trigger(now);
                }
            }
        }

        for group in WarningGroup::ALL {
            if let Some(state) = self.state_mut(group) {
                state.refresh(now);
            }
        }

        self.flags(now)
    }

    pub fn flags(&self, now: Instant) -> WarningFlags {
        WarningFlags {
            cpu: self.cpu.is_active(now),
            memory: self.memory.is_active(now),
            disk: self.disk.is_active(now),
            bottleneck: self.bottleneck.is_active(now),
            gpu_load: self.gpu_load.as_ref().map(|s| s.is_active(now)),
            gpu_memory: self.gpu_memory.as_ref().map(|s| s.is_active(now)),
        }
    }
}
