//! Sampling loop and the runtime that drives it.
//!
//! [`SamplingLoop::tick`] is one synchronous pass: read counters, sample idle
//! time, score, update warnings. [`MonitorRuntime`] runs it on a periodic
//! timer on its own thread and publishes each [`TickReport`] through a watch
//! channel.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;

use super::alerts::{evaluate_alerts, WarningBoard, WarningThresholds, DEFAULT_DEBOUNCE};
use super::collector::MetricsCollector;
use super::counters::CounterRegistry;
use super::idle::{usage_from_idle, IdleSampler};
use super::metrics::{
    CpuReport, DiskReport, GpuReport, Metric, MemoryReport, NetworkReport, PageFaultReport,
    Snapshot, TickReport,
};
use super::scoring::{hard_fault_ratio, nvm_page_share, score, Scores};
use crate::error::{MonitorError, Result};

/// Shortest allowed sampling interval.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);
/// Longest allowed sampling interval.
pub const MAX_INTERVAL: Duration = Duration::from_millis(5000);

/// Latest report, `None` until the first tick completes.
pub type ReportReceiver = watch::Receiver<Option<Arc<TickReport>>>;

/// Everything one tick needs, owned by the sampling thread.
pub struct SamplingLoop {
    collector: MetricsCollector,
    idle: IdleSampler,
    board: WarningBoard,
    thresholds: WarningThresholds,
    interval: Duration,
    sequence: u64,
}

impl SamplingLoop {
    /// Seeds the idle sampler; its first reading is discarded here.
    pub fn new(
        collector: MetricsCollector,
        mut idle: IdleSampler,
        thresholds: WarningThresholds,
        interval: Duration,
        flash_warnings: bool,
    ) -> Self {
        if let Err(e) = idle.idle() {
            log::warn!("Could not seed idle sampler: {}", e);
        }

        let board = WarningBoard::new(
            DEFAULT_DEBOUNCE,
            collector.has_hardware_monitor(),
            flash_warnings,
        );

        Self {
            collector,
            idle,
            board,
            thresholds,
            interval: interval.clamp(MIN_INTERVAL, MAX_INTERVAL),
            sequence: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }

    /// Run one sampling pass at `now`.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let mut builder = self.collector.sample();

        let idle_usage = match self.idle.idle_at(now) {
            Ok(idle) => usage_from_idle(idle),
            Err(e) => {
                log::warn!("Idle sampling failed: {}", e);
                f64::NAN
            }
        };
        builder.insert(Metric::CpuIdleUsage, idle_usage);

        let snapshot = builder.build();
        let scores = score(&snapshot);
        let alerts = evaluate_alerts(&snapshot, &scores, &self.thresholds);
        let warnings = self.board.advance(&alerts, now);

        self.sequence += 1;
        log::trace!(
            "Tick {}: cpu={:.1} mem={:.1} nvm={:.1} bottleneck={}",
            self.sequence,
            scores.cpu.score,
            scores.memory.score,
            scores.disk.score,
            scores.bottleneck.label()
        );

        let mut report = build_report(&self.collector, snapshot, scores);
        report.sequence = self.sequence;
        report.warnings = warnings;
        report.alerts = alerts;
        report
    }

    /// Tick on a fixed interval until `shutdown` fires or every receiver is gone.
    pub async fn run(
        mut self,
        reports: watch::Sender<Option<Arc<TickReport>>>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        // First tick waits a full period so the idle and rate counters cover one interval.
        let start = tokio::time::Instant::now() + self.interval;
        let mut interval = tokio::time::interval_at(start, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.tick(Instant::now());
                    if reports.send(Some(Arc::new(report))).is_err() {
                        log::debug!("No report receivers left, stopping sampling loop");
                        break;
                    }
                }
                _ = shutdown.recv() => {
                    log::debug!("Sampling loop shutting down");
                    break;
                }
            }
        }
    }
}

fn build_report(collector: &MetricsCollector, snapshot: Snapshot, scores: Scores) -> TickReport {
    let profile = collector.profile();
    let available_mb = snapshot.get(Metric::MemAvailableMb);
    let total_mb = profile.total_memory_mb();
    let page_reads = snapshot.get(Metric::PageReads);
    let page_faults = snapshot.get(Metric::PageFaults);
    let disk_bytes = snapshot.get(Metric::DiskBytes);

    let gpu = scores.gpu.map(|gpu_score| GpuReport {
        name: collector.hardware_name().unwrap_or("GPU").to_string(),
        load_percent: snapshot.get(Metric::GpuLoad),
        memory_load_percent: snapshot.get(Metric::GpuMemoryLoad),
        memory_controller_percent: snapshot.get(Metric::GpuMemoryControllerLoad),
        temperature_celsius: snapshot.get(Metric::GpuTemperature),
        clock_mhz: snapshot.get(Metric::GpuClock),
        fan_rpm: snapshot.get(Metric::GpuFanRpm),
        fan_control_percent: snapshot.get(Metric::GpuFanControl),
        total_vram_mb: snapshot.get(Metric::GpuTotalVram),
        score: gpu_score,
    });

    TickReport {
        timestamp: chrono::Utc::now(),
        sequence: 0,
        cpu: CpuReport {
            usage_percent: snapshot.get(Metric::CpuUsage),
            idle_usage_percent: snapshot.get(Metric::CpuIdleUsage),
            queue: snapshot.get(Metric::CpuQueue),
            interrupt_percent: snapshot.get(Metric::CpuInterrupt),
            score: scores.cpu,
        },
        memory: MemoryReport {
            free_gib: available_mb / 1024.0,
            commit_percent: snapshot.get(Metric::MemCommitPercent),
            pressure_percent: scores.memory.pressure * 100.0,
            used_mb: total_mb - available_mb,
            total_mb,
            score: scores.memory,
        },
        disk: DiskReport {
            bytes_per_sec: disk_bytes,
            busy_percent: snapshot.get(Metric::DiskBusyPercent),
            transfers_per_sec: snapshot.get(Metric::DiskTransfers),
            split_io_per_sec: snapshot.get(Metric::DiskSplitIo),
            max_latency_ms: scores.disk.max_latency_ms,
            queue: snapshot.get(Metric::DiskQueue),
            score: scores.disk,
        },
        page_faults: PageFaultReport {
            faults_per_sec: page_faults,
            reads_per_sec: page_reads,
            hard_fault_ratio: hard_fault_ratio(page_reads, page_faults),
            nvm_share: nvm_page_share(page_reads, disk_bytes),
        },
        network: NetworkReport {
            interface: collector.network_interface().map(str::to_string),
            in_kbps: snapshot.get(Metric::NetBytesIn) / 1000.0,
            out_kbps: snapshot.get(Metric::NetBytesOut) / 1000.0,
            queue: snapshot.get(Metric::NetQueue),
        },
        gpu,
        bottleneck: scores.bottleneck,
        warnings: Default::default(),
        alerts: Vec::new(),
        raw: snapshot,
    }
}

/// Owns the sampling thread and the counter registry's shutdown.
pub struct MonitorRuntime {
    /// Receiver for tick reports
    pub report_rx: ReportReceiver,

    shutdown_tx: broadcast::Sender<()>,
    worker: Option<JoinHandle<()>>,
    registry: Arc<CounterRegistry>,
}

impl MonitorRuntime {
    /// Spawn the `metrics-worker` thread and start ticking.
    pub fn start(sampling: SamplingLoop, registry: Arc<CounterRegistry>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        let (report_tx, report_rx) = watch::channel(None);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let shutdown_rx = shutdown_tx.subscribe();

        log::info!(
            "Starting sampling loop with a {} ms interval",
            sampling.interval().as_millis()
        );

        let worker = std::thread::Builder::new()
            .name("metrics-worker".to_string())
            .spawn(move || runtime.block_on(sampling.run(report_tx, shutdown_rx)))
            .map_err(|e| MonitorError::other(format!("Failed to spawn sampling thread: {}", e)))?;

        Ok(Self {
            report_rx,
            shutdown_tx,
            worker: Some(worker),
            registry,
        })
    }

    /// Sender that stops the sampling loop when signalled.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn subscribe(&self) -> ReportReceiver {
        self.report_rx.clone()
    }

    /// Stop the loop, wait for it, then release every counter.
    pub fn shutdown(mut self) -> usize {
        self.stop()
    }

    fn stop(&mut self) -> usize {
        let _ = self.shutdown_tx.send(());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Sampling thread panicked");
            }
        }
        let released = self.registry.release_all();
        if released > 0 {
            log::info!("Released {} counters", released);
        }
        released
    }
}

impl Drop for MonitorRuntime {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::system_monitor::collector::{
        standard_counter_paths, SystemProfile, NETWORK_CATEGORY,
    };
    use crate::core::system_monitor::counters::CounterPath;
    use crate::core::system_monitor::idle::{CpuTimes, SystemTimes};
    use crate::core::system_monitor::mock::ScriptedBackend;

    struct Ticking(u64);

    impl SystemTimes for Ticking {
        fn cpu_times(&mut self) -> Result<CpuTimes> {
            self.0 += 1_000_000;
            Ok(CpuTimes {
                idle: self.0,
                ..Default::default()
            })
        }
    }

    fn sampling(backend: &ScriptedBackend) -> (SamplingLoop, Arc<CounterRegistry>) {
        backend.set_instances(NETWORK_CATEGORY, &["eth0"]);
        for (_, path) in standard_counter_paths(Some("eth0")) {
            backend.define(path, 0.0);
        }
        let registry = CounterRegistry::new(Box::new(backend.clone()));
        let profile = SystemProfile {
            total_memory_bytes: 8 * 1024 * 1024 * 1024,
            logical_cores: 4,
        };
        let collector = MetricsCollector::open(Arc::clone(&registry), profile, None).unwrap();
        let idle = IdleSampler::new(Box::new(Ticking(0)), profile.logical_cores);
        let sampling = SamplingLoop::new(
            collector,
            idle,
            WarningThresholds::default(),
            Duration::from_millis(100),
            true,
        );
        (sampling, registry)
    }

    #[test]
    fn test_interval_is_clamped() {
        let backend = ScriptedBackend::new();
        let (sampling, _) = sampling(&backend);
        assert_eq!(sampling.interval(), MIN_INTERVAL);
    }

    #[test]
    fn test_tick_builds_report() {
        let backend = ScriptedBackend::new();
        let (mut sampling, _) = sampling(&backend);
        backend.define(CounterPath::new("Processor", "% Processor Time", Some("_Total")), 95.0);
        backend.define(CounterPath::new("Memory", "Available MBytes", None), 2048.0);

        let report = sampling.tick(Instant::now() + Duration::from_secs(1));
        assert_eq!(report.sequence, 1);
        assert_eq!(report.cpu.usage_percent, 95.0);
        assert!((report.memory.free_gib - 2.0).abs() < 1e-12);
        assert!((report.memory.used_mb - 6144.0).abs() < 1e-9);
        assert_eq!(report.network.interface.as_deref(), Some("eth0"));
        assert!(report.gpu.is_none());
        assert!(report.warnings.cpu);
        assert!(report.warnings.gpu_load.is_none());
        // Memory score 2 GiB short of the low-memory threshold.
        assert_eq!(report.bottleneck.dominant.map(|d| d.label()), Some("MEM"));

        let next = sampling.tick(Instant::now() + Duration::from_secs(2));
        assert_eq!(next.sequence, 2);
    }

    #[test]
    fn test_first_published_report_spans_interval() {
        let backend = ScriptedBackend::new();
        let (sampling, registry) = sampling(&backend);
        let started = Instant::now();
        let runtime = MonitorRuntime::start(sampling, Arc::clone(&registry)).unwrap();

        let mut rx = runtime.subscribe();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let report = rt.block_on(async {
            tokio::time::timeout(Duration::from_secs(5), async {
                loop {
                    rx.changed().await.unwrap();
                    if let Some(report) = rx.borrow_and_update().clone() {
                        return report;
                    }
                }
            })
            .await
            .unwrap()
        });
        runtime.shutdown();

        assert_eq!(report.sequence, 1);
        assert!(started.elapsed() >= MIN_INTERVAL);
        // 100ms of idle ticks per reading on 4 cores: at most a quarter idle.
        let usage = report.cpu.idle_usage_percent;
        assert!((0.0..=100.0).contains(&usage), "usage {}", usage);
        assert!(usage >= 75.0);
    }

    #[test]
    fn test_runtime_publishes_and_releases() {
        let backend = ScriptedBackend::new();
        let (sampling, registry) = sampling(&backend);
        let runtime = MonitorRuntime::start(sampling, Arc::clone(&registry)).unwrap();

        let mut rx = runtime.subscribe();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let report = rt.block_on(async {
            tokio::time::timeout(Duration::from_secs(5), async {
                loop {
                    rx.changed().await.unwrap();
                    if let Some(report) = rx.borrow_and_update().clone() {
                        return report;
                    }
                }
            })
            .await
            .unwrap()
        });
        assert!(report.sequence >= 1);

        let counters = registry.len();
        assert_eq!(runtime.shutdown(), counters);
        assert!(registry.is_empty());
        assert_eq!(backend.released_count(), counters);
    }
}
