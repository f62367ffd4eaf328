use std::time::{Duration, Instant};

use sysmon::core::system_monitor::scoring::{
    cpu_score, disk_score, dominant, gpu_score, hard_fault_ratio, memory_score, nvm_page_share,
    score,
};
use sysmon::core::system_monitor::{
    evaluate_alerts, Domain, Metric, Snapshot, WarningBoard, WarningGroup, WarningThresholds,
};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

fn busy_snapshot() -> Snapshot {
    Snapshot::builder()
        .set(Metric::CpuUsage, 50.0)
        .set(Metric::CpuQueue, 0.0)
        .set(Metric::CpuInterrupt, 0.0)
        .set(Metric::MemAvailableMb, 3072.0)
        .set(Metric::MemPrivateBytes, 4.0 * GIB)
        .set(Metric::MemTotalBytes, 8.0 * GIB)
        .set(Metric::DiskQueue, 0.0)
        .set(Metric::DiskSplitIo, 0.0)
        .set(Metric::DiskReadLatency, 0.001)
        .set(Metric::DiskWriteLatency, 0.002)
        .set(Metric::DiskTransfers, 100.0)
        .set(Metric::DiskBusyPercent, 5.0)
        .build()
}

#[test]
fn test_cpu_curve() {
    let half = cpu_score(50.0, 0.0, 0.0);
    let expected = 0.9f64.powf(7.1) - 0.05;
    assert!((half.score - expected).abs() < 1e-12);

    let full = cpu_score(100.0, 0.0, 0.0);
    assert_eq!(full.curve, 10.0);

    let loaded = cpu_score(100.0, 4.0, 8.0);
    assert_eq!(loaded.queue_term, 2.0);
    assert_eq!(loaded.interrupt_term, 2.0);
    assert_eq!(loaded.score, 14.0);
}

#[test]
fn test_memory_score_terms() {
    let memory = memory_score(4.0 * GIB, 8.0 * GIB, 3.0);
    assert_eq!(memory.pressure, 0.5);
    assert_eq!(memory.pressure_term, 5.0);
    assert!((memory.scarcity_term - 5.2).abs() < 1e-12);
    assert!((memory.score - 10.2).abs() < 1e-12);

    let roomy = memory_score(4.0 * GIB, 8.0 * GIB, 6.0);
    assert_eq!(roomy.scarcity_term, 0.0);
}

#[test]
fn test_disk_score_terms_are_capped() {
    let disk = disk_score(10.0, 20.0, 0.05, 0.01, 1000.0);
    assert_eq!(disk.queue_term, 8.0);
    assert_eq!(disk.split_term, 4.0);
    assert!((disk.max_latency_ms - 50.0).abs() < 1e-9);
    assert!((disk.latency_term - 4.0).abs() < 1e-12);
    assert_eq!(disk.transfer_term, 1.0);
    assert!((disk.score - 17.0).abs() < 1e-12);
}

#[test]
fn test_gpu_score_terms() {
    let gpu = gpu_score(90.0, 80.0, 50.0);
    assert_eq!(gpu.load_term, 9.0);
    assert!((gpu.memory_term - 6.0).abs() < 1e-12);
    assert!((gpu.score - 15.0).abs() < 1e-12);

    let idle = gpu_score(0.0, 30.0, 0.0);
    assert_eq!(idle.memory_term, 0.0);
}

#[test]
fn test_dominant_priority() {
    assert_eq!(dominant(9.0, 9.0, 9.0, Some(9.0)), Some(Domain::Memory));
    assert_eq!(dominant(7.0, 8.0, 9.0, None), Some(Domain::Disk));
    assert_eq!(dominant(7.0, 7.0, 8.0, Some(12.0)), Some(Domain::Cpu));
    assert_eq!(dominant(1.0, 1.0, 1.0, Some(8.5)), Some(Domain::Gpu));
    assert_eq!(dominant(7.9, 7.9, 7.9, None), None);
    assert_eq!(dominant(f64::NAN, 1.0, 1.0, None), None);
}

#[test]
fn test_paging_ratios() {
    assert_eq!(hard_fault_ratio(10.0, 0.0), 0.0);
    assert!((hard_fault_ratio(10.0, 100.0) - 0.1).abs() < 1e-12);
    assert_eq!(nvm_page_share(10.0, 0.0), 0.0);
    assert!((nvm_page_share(1000.0, 4_048_000.0) - 1.0).abs() < 1e-12);
}

#[test]
fn test_score_snapshot_without_gpu() {
    let scores = score(&busy_snapshot());
    assert!(scores.gpu.is_none());
    assert!(scores.bottleneck.gpu.is_none());
    assert_eq!(scores.bottleneck.dominant, Some(Domain::Memory));
    assert_eq!(scores.bottleneck.label(), "MEM");
    assert!((scores.max_score() - scores.memory.score).abs() < 1e-12);
}

#[test]
fn test_score_snapshot_with_gpu() {
    let mut builder = Snapshot::builder();
    builder.insert(Metric::MemAvailableMb, 16_384.0);
    builder.insert(Metric::MemPrivateBytes, 1.0 * GIB);
    builder.insert(Metric::MemTotalBytes, 32.0 * GIB);
    builder.insert(Metric::CpuUsage, 10.0);
    builder.insert(Metric::CpuQueue, 0.0);
    builder.insert(Metric::CpuInterrupt, 0.0);
    builder.insert(Metric::DiskQueue, 0.0);
    builder.insert(Metric::DiskSplitIo, 0.0);
    builder.insert(Metric::DiskReadLatency, 0.0);
    builder.insert(Metric::DiskWriteLatency, 0.0);
    builder.insert(Metric::DiskTransfers, 0.0);
    builder.insert(Metric::GpuLoad, 99.0);
    builder.insert(Metric::GpuMemoryLoad, 50.0);
    builder.insert(Metric::GpuMemoryControllerLoad, 10.0);
    let snapshot = builder.build();

    let scores = score(&snapshot);
    let gpu = scores.gpu.expect("gpu scored");
    assert!((gpu.load_term - 9.9).abs() < 1e-12);
    assert_eq!(scores.bottleneck.dominant, Some(Domain::Gpu));

    let alerts = evaluate_alerts(&snapshot, &scores, &WarningThresholds::default());
    assert!(alerts.iter().any(|a| a.group == WarningGroup::GpuLoad));
    assert!(!alerts.iter().any(|a| a.group == WarningGroup::GpuMemory));
    assert!(alerts.iter().any(|a| a.group == WarningGroup::Bottleneck));
}

#[test]
fn test_missing_readings_never_alert() {
    let snapshot = Snapshot::builder().build();
    let scores = score(&snapshot);
    assert!(scores.cpu.score.is_nan());
    assert!(scores.bottleneck.dominant.is_none());

    let alerts = evaluate_alerts(&snapshot, &scores, &WarningThresholds::default());
    assert!(alerts.is_empty());
}

#[test]
fn test_warning_outlives_breach_by_debounce_window() {
    let snapshot = busy_snapshot()
        .iter()
        .fold(Snapshot::builder(), |b, (m, v)| b.set(m, v))
        .set(Metric::MemAvailableMb, 1024.0)
        .build();
    let scores = score(&snapshot);
    let thresholds = WarningThresholds::default();
    let alerts = evaluate_alerts(&snapshot, &scores, &thresholds);
    assert!(alerts.iter().any(|a| a.group == WarningGroup::Memory));

    let start = Instant::now();
    let mut board = WarningBoard::new(Duration::from_millis(2100), false, true);
    assert!(board.advance(&alerts, start).memory);
    assert!(board.advance(&[], start + Duration::from_secs(1)).memory);
    assert!(!board.advance(&[], start + Duration::from_millis(2500)).memory);

    let mut quiet = WarningBoard::new(Duration::from_millis(2100), false, false);
    assert!(!quiet.advance(&alerts, start).any());
}
