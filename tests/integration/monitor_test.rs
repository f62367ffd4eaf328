use std::sync::Arc;
use std::time::{Duration, Instant};

use sysmon::core::system_monitor::mock::{ScriptedBackend, ScriptedRead};
use sysmon::core::system_monitor::{
    standard_counter_paths, CounterPath, CounterRegistry, CpuTimes, GpuReadings, HardwareMonitor,
    IdleSampler, MetricsCollector, MonitorRuntime, SamplingLoop, SystemProfile, SystemTimes,
    WarningThresholds, NETWORK_CATEGORY,
};
use sysmon::ui::formatters::{report_sections, ERROR_TEXT};
use sysmon::MonitorError;

const PROFILE: SystemProfile = SystemProfile {
    total_memory_bytes: 16 * 1024 * 1024 * 1024,
    logical_cores: 8,
};

/// Idle time advancing by a fixed amount per call.
struct SteadyIdle {
    now: u64,
}

impl SystemTimes for SteadyIdle {
    fn cpu_times(&mut self) -> sysmon::Result<CpuTimes> {
        self.now += 5_000_000;
        Ok(CpuTimes {
            idle: self.now,
            kernel: self.now * 2,
            user: 0,
        })
    }
}

struct FakeGpu {
    readings: GpuReadings,
}

impl HardwareMonitor for FakeGpu {
    fn name(&self) -> &str {
        "Test GPU"
    }

    fn update(&mut self) -> sysmon::Result<()> {
        Ok(())
    }

    fn readings(&self) -> GpuReadings {
        self.readings
    }
}

fn scripted(nic: &str) -> ScriptedBackend {
    let backend = ScriptedBackend::new();
    backend.set_instances(NETWORK_CATEGORY, &["Loopback Pseudo-Interface 1", nic]);
    for (_, path) in standard_counter_paths(Some(nic)) {
        backend.define(path, 0.0);
    }
    backend.define(CounterPath::new("Memory", "Available MBytes", None), 8192.0);
    backend
}

fn sampling_loop(
    backend: &ScriptedBackend,
    hardware: Option<Box<dyn HardwareMonitor>>,
    flash: bool,
) -> (SamplingLoop, Arc<CounterRegistry>) {
    let registry = CounterRegistry::new(Box::new(backend.clone()));
    let collector = MetricsCollector::open(Arc::clone(&registry), PROFILE, hardware).unwrap();
    let idle = IdleSampler::new(Box::new(SteadyIdle { now: 0 }), PROFILE.logical_cores);
    let sampling = SamplingLoop::new(
        collector,
        idle,
        WarningThresholds::default(),
        Duration::from_millis(250),
        flash,
    );
    (sampling, registry)
}

#[test]
fn test_collector_skips_loopback_interface() {
    let backend = scripted("Ethernet");
    let (sampling, registry) = sampling_loop(&backend, None, true);
    assert_eq!(sampling.collector().network_interface(), Some("Ethernet"));
    assert_eq!(registry.len(), standard_counter_paths(Some("Ethernet")).len());
    assert_eq!(sampling.interval(), Duration::from_millis(250));
}

#[test]
fn test_missing_counter_is_fatal() {
    let backend = ScriptedBackend::new();
    backend.set_instances(NETWORK_CATEGORY, &[]);
    let registry = CounterRegistry::new(Box::new(backend));

    let result = MetricsCollector::open(registry, PROFILE, None);
    assert!(matches!(result, Err(MonitorError::Acquisition { .. })));
}

#[test]
fn test_vanished_interface_is_reacquired() {
    let backend = scripted("eth0");
    let (mut sampling, _registry) = sampling_loop(&backend, None, true);
    let rx = CounterPath::new(NETWORK_CATEGORY, "Bytes Received/sec", Some("eth0"));
    backend.define(rx.clone(), 4000.0);
    backend.push(&rx, ScriptedRead::Vanish);

    let start = Instant::now();
    let first = sampling.tick(start + Duration::from_secs(1));
    assert!(first.network.in_kbps.is_nan());
    assert_eq!(sampling.collector().live_counters(), 17);

    let second = sampling.tick(start + Duration::from_secs(2));
    assert!(second.network.in_kbps.is_nan());
    assert_eq!(sampling.collector().live_counters(), 18);
    assert_eq!(backend.open_count(&rx), 2);

    let third = sampling.tick(start + Duration::from_secs(3));
    assert_eq!(third.network.in_kbps, 4.0);
}

#[test]
fn test_transient_failure_shows_error_group() {
    let backend = scripted("eth0");
    let (mut sampling, _registry) = sampling_loop(&backend, None, true);
    let faults = CounterPath::new("Memory", "Page Faults/sec", None);
    backend.push(&faults, ScriptedRead::Transient);

    let report = sampling.tick(Instant::now() + Duration::from_secs(1));
    assert!(report.page_faults.faults_per_sec.is_nan());

    let sections = report_sections(&report);
    let page_faults = sections
        .iter()
        .find(|s| s.title == "Page faults")
        .unwrap();
    assert_eq!(page_faults.lines, vec![ERROR_TEXT.to_string()]);

    let cpu = sections.iter().find(|s| s.title == "CPU").unwrap();
    assert_eq!(cpu.lines[0], "0.0%");
}

#[test]
fn test_idle_usage_uses_core_count() {
    let backend = scripted("eth0");
    let (mut sampling, _registry) = sampling_loop(&backend, None, true);

    let report = sampling.tick(Instant::now() + Duration::from_secs(1));
    assert!(report.cpu.idle_usage_percent.is_finite());
    assert!(report.cpu.idle_usage_percent <= 100.0);
}

#[test]
fn test_gpu_groups_follow_hardware_monitor() {
    let backend = scripted("eth0");
    let readings = GpuReadings {
        load_percent: 95.0,
        memory_load_percent: 40.0,
        memory_controller_percent: 20.0,
        temperature_celsius: 70.0,
        clock_mhz: 1800.0,
        total_vram_mb: 8192.0,
        ..Default::default()
    };
    let gpu: Box<dyn HardwareMonitor> = Box::new(FakeGpu { readings });
    let (mut sampling, _registry) = sampling_loop(&backend, Some(gpu), true);
    assert_eq!(sampling.collector().hardware_name(), Some("Test GPU"));

    let report = sampling.tick(Instant::now() + Duration::from_secs(1));
    let gpu = report.gpu.as_ref().expect("gpu report");
    assert_eq!(gpu.name, "Test GPU");
    assert!(gpu.fan_rpm.is_nan());
    assert_eq!(report.warnings.gpu_load, Some(true));
    assert_eq!(report.warnings.gpu_memory, Some(false));
    assert_eq!(report.bottleneck.label(), "GPU");
}

#[test]
fn test_disabled_flash_never_warns() {
    let backend = scripted("eth0");
    backend.define(
        CounterPath::new("Processor", "% Processor Time", Some("_Total")),
        99.0,
    );
    let (mut sampling, _registry) = sampling_loop(&backend, None, false);

    let report = sampling.tick(Instant::now() + Duration::from_secs(1));
    assert!(report
        .alerts
        .iter()
        .any(|a| a.group == sysmon::core::system_monitor::WarningGroup::Cpu));
    assert!(!report.warnings.any());
}

#[test]
fn test_report_serializes_to_json() {
    let backend = scripted("eth0");
    let (mut sampling, _registry) = sampling_loop(&backend, None, true);
    let report = sampling.tick(Instant::now() + Duration::from_secs(1));

    let json: serde_json::Value = serde_json::to_value(&report).unwrap();
    assert_eq!(json["sequence"], 1);
    assert_eq!(json["network"]["interface"], "eth0");
    assert!(json["gpu"].is_null());
    assert!(json["raw"]["cpu_usage"].is_number());
}

#[test]
fn test_shutdown_releases_every_counter() {
    let backend = scripted("eth0");
    let (sampling, registry) = sampling_loop(&backend, None, true);
    let acquired = registry.len();

    let runtime = MonitorRuntime::start(sampling, Arc::clone(&registry)).unwrap();
    let mut reports = runtime.subscribe();
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let sequence = rt.block_on(async {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                reports.changed().await.unwrap();
                if let Some(report) = reports.borrow_and_update().clone() {
                    return report.sequence;
                }
            }
        })
        .await
        .unwrap()
    });
    assert!(sequence >= 1);

    assert_eq!(runtime.shutdown(), acquired);
    assert!(registry.is_empty());
    assert_eq!(backend.released_count(), acquired);
}
