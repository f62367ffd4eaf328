//! Telemetry sampling and bottleneck scoring.
//!
//! Counters and idle time are read into a [`Snapshot`] each tick, scored per
//! domain, checked against warning thresholds, and published as a
//! [`TickReport`].

pub mod alerts;
mod collector;
pub mod counters;
mod gpu;
pub mod idle;
mod metrics;
pub mod mock;
mod runtime;
pub mod scoring;

pub use alerts::{
    evaluate_alerts, Alert, WarningBoard, WarningFlags, WarningGroup, WarningState,
    WarningThresholds, DEFAULT_DEBOUNCE,
};
pub use collector::{
    pick_network_instance, standard_counter_paths, MetricsCollector, SystemProfile,
    NETWORK_CATEGORY,
};
pub use counters::{
    CounterBackend, CounterHandle, CounterPath, CounterRead, CounterRegistry, CounterState,
    RawCounter, ReadFailure,
};
pub use gpu::{GpuReadings, HardwareMonitor};
pub use idle::{usage_from_idle, CpuTimes, IdleSampler, SystemTimes};
pub use metrics::{
    CpuReport, DiskReport, GpuReport, MemoryReport, Metric, NetworkReport, PageFaultReport,
    Snapshot, SnapshotBuilder, TickReport,
};
pub use runtime::{MonitorRuntime, ReportReceiver, SamplingLoop, MAX_INTERVAL, MIN_INTERVAL};
pub use scoring::{Bottleneck, CpuScore, DiskScore, Domain, GpuScore, MemoryScore, Scores};
