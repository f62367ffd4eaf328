//! System-wide CPU idle fraction from cumulative idle ticks.

use std::time::Instant;

use crate::error::Result;

/// 100 ns ticks per millisecond.
pub const TICKS_PER_MS: f64 = 10_000.0;

/// Cumulative CPU times in 100 ns ticks, summed over all logical cores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle: u64,
    pub kernel: u64,
    pub user: u64,
}

/// Source of cumulative CPU times.
pub trait SystemTimes: Send {
    fn cpu_times(&mut self) -> Result<CpuTimes>;
}

/// Computes the idle fraction between consecutive calls.
///
/// The first call after construction measures against a zero baseline and
/// its result must be discarded.
pub struct IdleSampler {
    source: Box<dyn SystemTimes>,
    core_count: usize,
    last_instant: Instant,
    last_idle_ticks: u64,
}

impl IdleSampler {
    pub fn new(source: Box<dyn SystemTimes>, core_count: usize) -> Self {
        Self::started_at(source, core_count, Instant::now())
    }

    /// Construct with an explicit start instant.
    pub fn started_at(source: Box<dyn SystemTimes>, core_count: usize, start: Instant) -> Self {
        Self {
            source,
            core_count: core_count.max(1),
            last_instant: start,
            last_idle_ticks: 0,
        }
    }

    pub fn core_count(&self) -> usize {
        self.core_count
    }

    /// Idle fraction since the previous call.
    pub fn idle(&mut self) -> Result<f64> {
        self.idle_at(Instant::now())
    }

    /// Idle fraction between the previous call and `now`.
    ///
    /// Not clamped. A zero-length window yields a non-finite value.
    pub fn idle_at(&mut self, now: Instant) -> Result<f64> {
        let times = self.source.cpu_times()?;

        let elapsed_ms = now.saturating_duration_since(self.last_instant).as_secs_f64() * 1000.0;
        let idle_ticks = times.idle.saturating_sub(self.last_idle_ticks) as f64;

        self.last_instant = now;
        self.last_idle_ticks = times.idle;

        Ok(idle_ticks / (elapsed_ms * TICKS_PER_MS * self.core_count as f64))
    }
}

/// Convert an idle fraction into a usage percentage.
pub fn usage_from_idle(idle: f64) -> f64 {
    (1.0 - idle) * 100.0
}
