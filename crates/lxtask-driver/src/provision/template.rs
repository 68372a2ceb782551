//! Template provisioning: build a fresh root filesystem from an image
//! template and boot the container's own init.

use std::sync::Arc;

use lxtask_common::error::{DriverError, Result};
use lxtask_common::types::BindMount;
use lxtask_lxc::container::LxcContainer;

use crate::config::TemplateConfig;
use crate::rollback::RollbackStack;
use crate::task::{Resources, TaskDirs, TaskEnv};
use crate::{limits, provision};

use super::Provisioned;

/// Creates, configures and starts a system container from an image
/// template.
///
/// On any failure every committed step is undone in reverse order before
/// the error is returned, so no half-built container survives.
///
/// # Errors
///
/// Returns [`DriverError::Provision`] when creation, configuration or
/// startup fails, and [`DriverError::Limit`] when resource limits cannot
/// be applied.
pub(crate) fn provision(
    container: Arc<dyn LxcContainer>,
    config: &TemplateConfig,
    resources: &Resources,
    dirs: &TaskDirs,
    env: &TaskEnv,
    custom_mounts: &[BindMount],
) -> Result<Provisioned> {
    let mut rollback = RollbackStack::new();

    let options = config.template_options();
    if let Err(e) = container.create(&options) {
        return Err(DriverError::Provision {
            message: format!("unable to create container: {e}"),
        });
    }
    rollback.push("destroy container", {
        let container = Arc::clone(&container);
        move || container.destroy()
    });

    if let Err(e) = provision::apply_common_config(&*container, dirs, env, custom_mounts) {
        return rollback.fail(e);
    }

    if let Err(e) = container.start() {
        return rollback.fail(DriverError::Provision {
            message: format!("unable to start container: {e}"),
        });
    }
    rollback.push("stop container", {
        let container = Arc::clone(&container);
        move || container.stop()
    });

    if let Err(e) = limits::apply(&*container, resources) {
        return rollback.fail(e);
    }

    rollback.disarm();
    let init_pid = container.init_pid();
    tracing::info!(name = %container.name(), init_pid, template = %options.template, "container provisioned from template");
    Ok(Provisioned {
        container,
        init_pid,
        snapshot: None,
    })
}
