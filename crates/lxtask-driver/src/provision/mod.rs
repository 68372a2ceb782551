//! Container provisioning strategies.
//!
//! Two interchangeable strategies bring a container into existence and get
//! it running: [`template`] builds a fresh root filesystem from an image
//! template (system containers), [`clone`] snapshots an existing logical
//! volume and renders a configuration file from a template (application
//! containers, faster startup). Each returns either a started container or
//! a fully-unwound error.

pub mod clone;
pub mod template;

use std::sync::Arc;

use lxtask_common::error::{DriverError, Result};
use lxtask_common::types::BindMount;
use lxtask_lxc::container::LxcContainer;

use crate::task::{TaskDirs, TaskEnv};

/// A logical-volume snapshot backing a clone-provisioned container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRef {
    /// Volume group holding the snapshot.
    pub vg: String,
    /// Logical volume name (the container name).
    pub lv: String,
}

/// Outcome of a successful provisioning run.
pub struct Provisioned {
    /// The running container.
    pub container: Arc<dyn LxcContainer>,
    /// PID of the container's init process.
    pub init_pid: i32,
    /// Backing snapshot to release at teardown, for clone containers.
    pub snapshot: Option<SnapshotRef>,
}

impl std::fmt::Debug for Provisioned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioned")
            .field("container", &self.container.name())
            .field("init_pid", &self.init_pid)
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

/// Applies the configuration both strategies share: network isolation, the
/// standard `local`/`alloc`/`secrets` bind mounts, any resolved custom
/// volumes, and the task's environment variables. Each assignment is
/// idempotent.
pub(crate) fn apply_common_config(
    container: &dyn LxcContainer,
    dirs: &TaskDirs,
    env: &TaskEnv,
    custom_mounts: &[BindMount],
) -> Result<()> {
    container
        .set_config_item("lxc.network.type", "none")
        .map_err(|e| config_error("network type", &e))?;

    let standard = [
        (&dirs.local_dir, "local"),
        (&dirs.shared_alloc_dir, "alloc"),
        (&dirs.secrets_dir, "secrets"),
    ];
    let mounts = standard
        .into_iter()
        .map(|(host, container_path)| BindMount {
            host_path: host.clone(),
            container_path: container_path.to_string(),
            options: lxtask_common::constants::BIND_MOUNT_OPTIONS.to_string(),
        })
        .chain(custom_mounts.iter().cloned());

    for mount in mounts {
        container
            .set_config_item("lxc.mount.entry", &mount.config_entry())
            .map_err(|e| config_error("bind mount", &e))?;
    }

    for (key, value) in env.vars() {
        container
            .set_config_item("lxc.environment", &format!("{key}={value}"))
            .map_err(|e| config_error("environment variable", &e))?;
    }

    Ok(())
}

fn config_error(what: &str, source: &DriverError) -> DriverError {
    DriverError::Provision {
        message: format!("error setting {what} configuration: {source}"),
    }
}
