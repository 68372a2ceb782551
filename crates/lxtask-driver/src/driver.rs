//! The driver facade the orchestrator embeds.
//!
//! One [`LxcDriver`] lives per node. It validates task configuration,
//! fingerprints the node's LXC capability, starts tasks through one of
//! the two provisioning strategies, and reattaches to containers that
//! survived a driver restart.

use std::collections::HashMap;
use std::sync::Arc;

use lxtask_common::config::DriverConfig;
use lxtask_common::constants::{ATTR_LXC_ENABLED, ATTR_LXC_VERSION, ATTR_VOLUMES_ENABLED};
use lxtask_common::error::{DriverError, Result};
use lxtask_lxc::lvm::{CommandLvm, VolumeManager};
use lxtask_lxc::probe::{ProcessProbe, SignalProbe};
use lxtask_lxc::runtime::{CliRuntime, LxcRuntime};

use crate::config::{self, RawConfig};
use crate::handle::{PersistedIdentity, TaskHandle};
use crate::provision::{clone, template, Provisioned};
use crate::task::{TaskDirs, TaskEnv, TaskSpec};
use crate::volumes;

/// Container lifecycle driver backed by the host's LXC tooling.
pub struct LxcDriver {
    runtime: Arc<dyn LxcRuntime>,
    volumes: Arc<dyn VolumeManager>,
    probe: Arc<dyn ProcessProbe>,
    config: DriverConfig,
}

impl LxcDriver {
    /// Creates a driver using the host's real LXC and LVM tooling.
    #[must_use]
    pub fn new(config: DriverConfig) -> Self {
        Self::with_capabilities(
            Arc::new(CliRuntime),
            Arc::new(CommandLvm),
            Arc::new(SignalProbe),
            config,
        )
    }

    /// Creates a driver over explicit capability implementations.
    #[must_use]
    pub fn with_capabilities(
        runtime: Arc<dyn LxcRuntime>,
        volumes: Arc<dyn VolumeManager>,
        probe: Arc<dyn ProcessProbe>,
        config: DriverConfig,
    ) -> Self {
        Self {
            runtime,
            volumes,
            probe,
            config,
        }
    }

    /// Derives the container name for a task. Allocation IDs are unique
    /// per scheduling attempt, so rescheduled tasks never collide.
    #[must_use]
    pub fn container_name(task: &TaskSpec) -> String {
        format!("{}-{}", task.name, task.alloc_id)
    }

    /// Validates a task's raw configuration without side effects.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] or [`DriverError::VolumeConfig`]
    /// describing the first problem found.
    pub fn validate(&self, raw: &RawConfig) -> Result<()> {
        let common = config::resolve_common(raw)?;
        if common.use_execute {
            let _ = config::resolve_clone(raw)?;
        } else {
            let _ = config::resolve_template(raw)?;
        }
        volumes::validate_specs(&common.volumes)
    }

    /// Reports the node attributes this driver advertises. An empty map
    /// means LXC tooling is not installed and the driver is unusable on
    /// this node.
    #[must_use]
    pub fn fingerprint(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        if !self.runtime.is_available() {
            return attrs;
        }
        let _ = attrs.insert(ATTR_LXC_ENABLED.to_string(), "1".to_string());
        if let Some(version) = self.runtime.version() {
            let _ = attrs.insert(ATTR_LXC_VERSION.to_string(), version);
        }
        let _ = attrs.insert(
            ATTR_VOLUMES_ENABLED.to_string(),
            if self.config.volumes_enabled { "1" } else { "0" }.to_string(),
        );
        attrs
    }

    /// Provisions and starts a task's container, returning the supervised
    /// handle. On failure every partially-committed provisioning step has
    /// been rolled back.
    ///
    /// # Errors
    ///
    /// Propagates configuration, volume, provisioning and limit errors
    /// from the selected strategy.
    pub async fn start(&self, task: &TaskSpec, dirs: &TaskDirs, env: &TaskEnv) -> Result<TaskHandle> {
        let common = config::resolve_common(&task.config)?;
        let mounts = volumes::resolve(&common.volumes, &dirs.dir, self.config.volumes_enabled)?;

        let lxc_path = self
            .config
            .lxc_path
            .clone()
            .unwrap_or_else(|| self.runtime.default_config_path());
        let name = Self::container_name(task);
        let container = self.runtime.container(&name, &lxc_path)?;
        container.set_verbosity(common.verbosity);
        container.set_log_level(common.log_level);
        container.set_log_file(&dirs.dir.join(format!("{}-lxc.log", task.name)));

        tracing::info!(%name, alloc_id = %task.alloc_id, use_execute = common.use_execute, "starting container");

        let provisioned = {
            let resources = task.resources;
            let dirs = dirs.clone();
            let env = env.clone();
            let volumes = Arc::clone(&self.volumes);
            if common.use_execute {
                let cfg = config::resolve_clone(&task.config)?;
                tokio::task::spawn_blocking(move || {
                    clone::provision(container, &cfg, &resources, &dirs, &env, &mounts, &volumes)
                })
                .await
                .map_err(join_error)??
            } else {
                let cfg = config::resolve_template(&task.config)?;
                tokio::task::spawn_blocking(move || {
                    template::provision(container, &cfg, &resources, &dirs, &env, &mounts)
                })
                .await
                .map_err(join_error)??
            }
        };

        Ok(self.supervise(provisioned, task.kill_timeout))
    }

    /// Reattaches to a container from a persisted identity token.
    ///
    /// The backing snapshot of a clone container is not re-adopted; the
    /// monitor destroys the container on termination but leaves volume
    /// cleanup to the operator, since the identity does not record which
    /// strategy provisioned it.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Serialization`] for an unreadable token and
    /// [`DriverError::ContainerNotFound`] when no container with the
    /// persisted name exists any more.
    pub async fn open(&self, identity: &str) -> Result<TaskHandle> {
        let id: PersistedIdentity = serde_json::from_str(identity)?;
        let containers = self.runtime.containers(&id.lxc_path)?;
        let container = containers
            .into_iter()
            .find(|c| c.name() == id.container_name)
            .ok_or(DriverError::ContainerNotFound {
                name: id.container_name,
            })?;

        // Prefer the live PID; a container restarted outside the driver
        // would invalidate the persisted one.
        let live_pid = container.init_pid();
        let init_pid = if live_pid > 0 { live_pid } else { id.init_pid };
        tracing::info!(name = %container.name(), init_pid, "reattached to container");

        Ok(self.supervise(
            Provisioned {
                container,
                init_pid,
                snapshot: None,
            },
            id.kill_timeout,
        ))
    }

    fn supervise(&self, provisioned: Provisioned, kill_timeout: std::time::Duration) -> TaskHandle {
        TaskHandle::spawn(
            provisioned.container,
            provisioned.init_pid,
            Arc::clone(&self.probe),
            Arc::clone(&self.volumes),
            provisioned.snapshot,
            kill_timeout,
            &self.config,
        )
    }
}

fn join_error(e: tokio::task::JoinError) -> DriverError {
    DriverError::Provision {
        message: format!("provisioning task failed: {e}"),
    }
}
