//! Volume bind-mount policy.
//!
//! Specs have the form `hostPath:containerPath` with a relative
//! container-side path. The shape rules run twice with identical results:
//! once statically at configuration-validation time and once at
//! provisioning time, where resolution additionally needs the task
//! directory and the node-level volumes gate.

use std::path::{Path, PathBuf};

use lxtask_common::constants::{BIND_MOUNT_OPTIONS, VOLUMES_ENABLED_OPTION};
use lxtask_common::error::{DriverError, Result};
use lxtask_common::types::BindMount;

/// Checks the shape of every spec without touching the filesystem.
///
/// # Errors
///
/// Returns [`DriverError::VolumeConfig`] for the first malformed spec.
pub fn validate_specs(specs: &[String]) -> Result<()> {
    for spec in specs {
        let _ = split_spec(spec)?;
    }
    Ok(())
}

/// Resolves specs into bind-mount descriptors.
///
/// Relative host paths are resolved against the task's private working
/// directory; absolute host paths additionally require the node-level
/// volumes gate.
///
/// # Errors
///
/// Returns [`DriverError::VolumeConfig`] if a spec is malformed or an
/// absolute host path is used while the gate is disabled.
pub fn resolve(specs: &[String], task_dir: &Path, volumes_enabled: bool) -> Result<Vec<BindMount>> {
    specs
        .iter()
        .map(|spec| {
            let (host, container) = split_spec(spec)?;
            let host_path = if Path::new(host).is_absolute() {
                if !volumes_enabled {
                    return Err(DriverError::VolumeConfig {
                        spec: spec.clone(),
                        reason: format!(
                            "absolute bind-mount volume in config but '{VOLUMES_ENABLED_OPTION}' is false"
                        ),
                    });
                }
                PathBuf::from(host)
            } else {
                task_dir.join(host)
            };
            Ok(BindMount {
                host_path,
                container_path: container.to_string(),
                options: BIND_MOUNT_OPTIONS.to_string(),
            })
        })
        .collect()
}

/// Splits a spec into `(host, container)`, enforcing the shape rules.
fn split_spec(spec: &str) -> Result<(&str, &str)> {
    let bad = |reason: &str| DriverError::VolumeConfig {
        spec: spec.to_string(),
        reason: reason.to_string(),
    };

    let mut parts = spec.split(':');
    let (host, container) = match (parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(c), None) => (h, c),
        _ => return Err(bad("must have exactly two components")),
    };
    if host.is_empty() || container.is_empty() {
        return Err(bad("host and container paths must be non-empty"));
    }
    if container.starts_with('/') {
        return Err(bad("unsupported absolute container mount point"));
    }
    Ok((host, container))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_specs_pass_static_validation() {
        let specs = vec!["data:data".to_string(), "/srv/shared:shared".to_string()];
        assert!(validate_specs(&specs).is_ok());
    }

    #[test]
    fn malformed_specs_fail_static_validation() {
        for bad in ["noseparator", "a:b:c", ":container", "host:", "host:/abs"] {
            let specs = vec![bad.to_string()];
            assert!(
                matches!(
                    validate_specs(&specs),
                    Err(DriverError::VolumeConfig { .. })
                ),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn relative_host_resolves_against_task_dir() {
        let mounts = resolve(
            &["data:data".to_string()],
            Path::new("/alloc/task"),
            false,
        )
        .expect("resolve");
        assert_eq!(mounts[0].host_path, PathBuf::from("/alloc/task/data"));
        assert_eq!(mounts[0].container_path, "data");
        assert_eq!(mounts[0].options, "rw,bind,create=dir");
    }

    #[test]
    fn absolute_host_requires_volumes_gate() {
        let specs = vec!["/srv/shared:shared".to_string()];
        assert!(matches!(
            resolve(&specs, Path::new("/alloc/task"), false),
            Err(DriverError::VolumeConfig { .. })
        ));
        let mounts = resolve(&specs, Path::new("/alloc/task"), true).expect("resolve");
        assert_eq!(mounts[0].host_path, PathBuf::from("/srv/shared"));
    }

    #[test]
    fn static_and_dynamic_checks_agree_on_shape() {
        for spec in ["data:data", "a:b:c", "host:/abs", ":x"] {
            let specs = vec![spec.to_string()];
            let static_ok = validate_specs(&specs).is_ok();
            let dynamic_ok = resolve(&specs, Path::new("/t"), true).is_ok();
            assert_eq!(static_ok, dynamic_ok, "disagreement on {spec:?}");
        }
    }
}
