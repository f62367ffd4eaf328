use std::io;
use thiserror::Error;

/// Custom error type for the sysmon library
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The OS could not resolve a counter category, counter or instance at all.
    #[error("Failed to acquire counter {path}: {reason}")]
    Acquisition { path: String, reason: String },

    #[error("System time query failed: {0}")]
    SystemTimes(String),

    #[error("Hardware monitor not available: {0}")]
    HardwareMonitorUnavailable(String),

    #[error("Metric collection failed: {0}")]
    MetricCollection(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for sysmon
pub type Result<T> = std::result::Result<T, MonitorError>;

impl MonitorError {
    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        MonitorError::Config(msg.into())
    }

    /// Create an acquisition error for the given counter path
    pub fn acquisition<P: ToString, S: Into<String>>(path: P, reason: S) -> Self {
        MonitorError::Acquisition {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub fn system_times<S: Into<String>>(msg: S) -> Self {
        MonitorError::SystemTimes(msg.into())
    }

    pub fn hardware_monitor_unavailable<S: Into<String>>(msg: S) -> Self {
        MonitorError::HardwareMonitorUnavailable(msg.into())
    }

    pub fn metric_collection<S: Into<String>>(msg: S) -> Self {
        MonitorError::MetricCollection(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        MonitorError::Other(msg.into())
    }
}
