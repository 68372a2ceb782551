//! Domain primitive types used across the lxtask workspace.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{DriverError, Result};

/// Container log verbosity accepted by the task configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verbosity {
    /// Suppress runtime log chatter (the default).
    Quiet,
    /// Full runtime logging.
    Verbose,
}

impl Verbosity {
    /// Parses the `verbosity` task config field. An empty string selects
    /// the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not `quiet` or `verbose`.
    pub fn from_config_str(value: &str) -> Result<Self> {
        match value {
            "" | "quiet" => Ok(Self::Quiet),
            "verbose" => Ok(Self::Verbose),
            _ => Err(DriverError::Config {
                message: "'verbosity' can only be either quiet or verbose".into(),
            }),
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quiet => write!(f, "quiet"),
            Self::Verbose => write!(f, "verbose"),
        }
    }
}

/// Container log level accepted by the task configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// Most detailed runtime tracing.
    Trace,
    /// Debug-level runtime logging.
    Debug,
    /// Informational runtime logging.
    Info,
    /// Warnings only.
    Warn,
    /// Errors only (the default).
    Error,
}

impl LogLevel {
    /// Parses the `log_level` task config field. An empty string selects
    /// the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is outside the recognized set.
    pub fn from_config_str(value: &str) -> Result<Self> {
        match value {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "" | "error" => Ok(Self::Error),
            _ => Err(DriverError::Config {
                message: "'log_level' can only be trace, debug, info, warn or error".into(),
            }),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A resolved bind mount from a host path into the container filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    /// Absolute host-side source path.
    pub host_path: PathBuf,
    /// Container-side target path, always relative to the container root.
    pub container_path: String,
    /// Mount options written into the container configuration.
    pub options: String,
}

impl BindMount {
    /// Formats this mount as an `lxc.mount.entry` configuration value.
    #[must_use]
    pub fn config_entry(&self) -> String {
        format!(
            "{} {} none {}",
            self.host_path.display(),
            self.container_path,
            self.options
        )
    }
}

/// CPU time consumed by the container, split by execution mode,
/// in scheduler clock ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    /// Ticks spent in user mode.
    pub user: u64,
    /// Ticks spent in system mode.
    pub system: u64,
}

/// CPU portion of a usage snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CpuUsage {
    /// Percentage of a core spent in system mode since the last sample.
    pub system_mode: f64,
    /// Percentage of a core spent in user mode since the last sample.
    pub user_mode: f64,
    /// Total CPU percentage since the last sample.
    pub percent: f64,
    /// Cumulative user + system ticks at capture time.
    pub total_ticks: f64,
}

/// Memory portion of a usage snapshot, all values in bytes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MemoryUsage {
    /// Resident set size.
    pub rss: u64,
    /// Page cache charged to the container.
    pub cache: u64,
    /// Swap usage.
    pub swap: u64,
    /// High-water mark of memory usage.
    pub max_usage: u64,
    /// Kernel memory usage.
    pub kernel_usage: u64,
    /// High-water mark of kernel memory usage.
    pub kernel_max_usage: u64,
}

/// Structured resource usage captured from the container's cgroup accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// CPU usage rates and cumulative ticks.
    pub cpu: CpuUsage,
    /// Memory usage breakdown.
    pub memory: MemoryUsage,
    /// Capture time as nanoseconds since the Unix epoch.
    pub timestamp: i64,
}
