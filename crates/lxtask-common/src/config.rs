//! Node-level driver configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Driver configuration read from the node's client options.
///
/// These are operator-controlled knobs, distinct from the per-task
/// configuration the orchestrator submits with each allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Override for the LXC configuration root (`driver.lxc.path`).
    /// `None` means the runtime's default path is used.
    pub lxc_path: Option<PathBuf>,
    /// Whether bind mounts to arbitrary absolute host paths are allowed
    /// (`lxc.volumes.enabled`).
    pub volumes_enabled: bool,
    /// Upper bound on the per-task kill timeout.
    pub max_kill_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            lxc_path: None,
            volumes_enabled: true,
            max_kill_timeout: Duration::from_secs(30),
        }
    }
}

impl DriverConfig {
    /// Builds the configuration from the node's flat client options map.
    /// Unset options keep their defaults.
    #[must_use]
    pub fn from_options(options: &std::collections::HashMap<String, String>) -> Self {
        let defaults = Self::default();
        Self {
            lxc_path: options
                .get(crate::constants::LXC_PATH_OPTION)
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
            volumes_enabled: options
                .get(crate::constants::VOLUMES_ENABLED_OPTION)
                .map_or(defaults.volumes_enabled, |v| v == "true" || v == "1"),
            max_kill_timeout: defaults.max_kill_timeout,
        }
    }

    /// Clamps a task-requested kill timeout to the configured maximum.
    #[must_use]
    pub fn clamp_kill_timeout(&self, requested: Duration) -> Duration {
        requested.min(self.max_kill_timeout)
    }
}
