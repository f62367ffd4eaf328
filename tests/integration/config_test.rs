use std::fs;
use std::time::Duration;

use sysmon::core::config::MonitorConfig;
use tempfile::TempDir;

#[test]
fn test_config_default() {
    let config = MonitorConfig::default();
    assert_eq!(config.free_memory_threshold_gib, 1.5);
    assert_eq!(config.memory_pressure_threshold, 0.9);
    assert_eq!(config.interval(), Duration::from_millis(2500));
    assert!(config.flash_warnings);
}

#[test]
fn test_config_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("config.json");

    let mut config = MonitorConfig::default();
    config.set_free_memory_threshold(3.0);
    config.set_memory_pressure_threshold(0.8);
    config.set_interval_ms(1000);
    config.flash_warnings = false;
    config.save_to(&path).unwrap();

    let loaded = MonitorConfig::load_from(&path);
    assert_eq!(loaded, config);
}

#[test]
fn test_config_missing_file_gives_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let loaded = MonitorConfig::load_from(&temp_dir.path().join("absent.json"));
    assert_eq!(loaded, MonitorConfig::default());
}

#[test]
fn test_config_corrupt_file_gives_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    fs::write(&path, "{ not json").unwrap();
    assert_eq!(MonitorConfig::load_from(&path), MonitorConfig::default());

    fs::write(&path, "   ").unwrap();
    assert_eq!(MonitorConfig::load_from(&path), MonitorConfig::default());
}

#[test]
fn test_config_out_of_range_values_are_clamped() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    fs::write(
        &path,
        r#"{"free_memory_threshold_gib": 12.0, "memory_pressure_threshold": 0.2, "interval_ms": 10}"#,
    )
    .unwrap();

    let loaded = MonitorConfig::load_from(&path);
    assert_eq!(loaded.free_memory_threshold_gib, 4.0);
    assert_eq!(loaded.memory_pressure_threshold, 0.5);
    assert_eq!(loaded.interval_ms, 100);
    assert!(loaded.flash_warnings);
}

#[test]
fn test_config_thresholds() {
    let mut config = MonitorConfig::default();
    config.set_memory_pressure_threshold(0.95);
    let thresholds = config.thresholds();
    assert_eq!(thresholds.memory_pressure, 0.95);
    assert_eq!(thresholds.free_memory_gib, 1.5);
    assert_eq!(thresholds.bottleneck_score, 6.0);
}
