//! Clone provisioning: snapshot a base logical volume, render the
//! container configuration from a template file and execute the task's
//! command directly.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use lxtask_common::constants::LVM_PREFIX;
use lxtask_common::error::{DriverError, Result};
use lxtask_common::types::BindMount;
use lxtask_lxc::container::LxcContainer;
use lxtask_lxc::lvm::{self, VolumeManager};

use crate::config::CloneConfig;
use crate::rollback::RollbackStack;
use crate::task::{Resources, TaskDirs, TaskEnv};
use crate::{limits, provision};

use super::{Provisioned, SnapshotRef};

/// Creates, configures and starts an application container backed by a
/// thin snapshot of the configured base volume.
///
/// On any failure every committed step is undone in reverse order: the
/// container is stopped if it started, the rendered configuration file is
/// removed, and the snapshot is released.
///
/// # Errors
///
/// Returns [`DriverError::UnsupportedBackend`] for a base rootfs that is
/// not `lvm:`-prefixed, [`DriverError::VolumeGroupParse`] for an
/// unparseable volume reference, [`DriverError::Provision`] for any
/// failing provisioning step and [`DriverError::Limit`] when resource
/// limits cannot be applied.
pub(crate) fn provision(
    container: Arc<dyn LxcContainer>,
    config: &CloneConfig,
    resources: &Resources,
    dirs: &TaskDirs,
    env: &TaskEnv,
    custom_mounts: &[BindMount],
    volumes: &Arc<dyn VolumeManager>,
) -> Result<Provisioned> {
    let mut rollback = RollbackStack::new();
    let name = container.name().to_string();

    let container_dir = container.config_path().join(&name);
    let rootfs_dir = container_dir.join("rootfs");
    std::fs::create_dir_all(&rootfs_dir).map_err(|e| DriverError::Provision {
        message: format!(
            "unable to create container directory '{}': {e}",
            container_dir.display()
        ),
    })?;

    let Some(base) = config.base_rootfs_path.strip_prefix(LVM_PREFIX) else {
        return Err(DriverError::UnsupportedBackend {
            reference: config.base_rootfs_path.clone(),
        });
    };

    // Resolved before the snapshot exists; an unparseable reference must
    // not leave a volume behind that removal could never name.
    let vg = lvm::extract_vg_name(base)?;

    if let Err(e) = volumes.snapshot(base, &name) {
        return rollback.fail(DriverError::Provision {
            message: format!("could not create thin pool snapshot: {e}"),
        });
    }
    rollback.push("remove volume snapshot", {
        let volumes = Arc::clone(volumes);
        let vg = vg.clone();
        let name = name.clone();
        move || volumes.remove(&vg, &name)
    });

    let config_path = container_dir.join("config");
    let storage = format!("{LVM_PREFIX}{}", lvm::device_mapper_path(&vg, &name));
    if let Err(e) = write_rendered_config(
        &mut rollback,
        &config.base_config_path,
        &config_path,
        &storage,
        &name,
    ) {
        return rollback.fail(e);
    }

    if let Err(e) = container.load_config_file(&config_path) {
        return rollback.fail(DriverError::Provision {
            message: format!(
                "unable to load config file '{}': {e}",
                config_path.display()
            ),
        });
    }

    if let Err(e) = provision::apply_common_config(&*container, dirs, env, custom_mounts) {
        return rollback.fail(e);
    }

    let args = env.parse_and_replace(&config.cmd_args);
    tracing::info!(%name, command = ?args, "executing command in cloned container");
    if let Err(e) = container.start_execute(&args) {
        return rollback.fail(DriverError::Provision {
            message: format!("unable to execute command {args:?}: {e}"),
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
    tracing::info!(%name, init_pid, %vg, "container provisioned from snapshot");
    Ok(Provisioned {
        container,
        init_pid,
        snapshot: Some(SnapshotRef { vg, lv: name }),
    })
}

/// Renders the base configuration template into the container's config
/// file, registering removal of the file for rollback as soon as it
/// exists.
fn write_rendered_config(
    rollback: &mut RollbackStack,
    template_path: &Path,
    config_path: &Path,
    storage: &str,
    name: &str,
) -> Result<()> {
    let mut file = std::fs::File::create(config_path).map_err(|e| DriverError::Provision {
        message: format!(
            "unable to create config file '{}': {e}",
            config_path.display()
        ),
    })?;
    rollback.push("remove rendered config file", {
        let path = config_path.to_path_buf();
        move || {
            std::fs::remove_file(&path).map_err(|source| DriverError::Io {
                path: path.clone(),
                source,
            })
        }
    });

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(config_path, std::fs::Permissions::from_mode(0o777)).map_err(
            |e| DriverError::Provision {
                message: format!(
                    "unable to change permissions on config file '{}': {e}",
                    config_path.display()
                ),
            },
        )?;
    }

    let template =
        std::fs::read_to_string(template_path).map_err(|e| DriverError::Provision {
            message: format!(
                "unable to read config template '{}': {e}",
                template_path.display()
            ),
        })?;
    let rendered = render_config(&template, storage, name);
    file.write_all(rendered.as_bytes())
        .map_err(|e| DriverError::Provision {
            message: format!(
                "unable to write config file '{}': {e}",
                config_path.display()
            ),
        })?;
    Ok(())
}

/// Substitutes the storage-path and container-name placeholders of a base
/// configuration template.
fn render_config(template: &str, storage: &str, name: &str) -> String {
    template
        .replace("{{.RootFSPath}}", storage)
        .replace("{{.ContainerName}}", name)
}
