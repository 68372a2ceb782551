//! LVM tooling capability: thin-snapshot management and logical-volume
//! reference parsing.
//!
//! Clone-provisioned containers sit on a thin snapshot of a base logical
//! volume. The base may be referenced three ways: `vgname/lvname`,
//! `/dev/mapper/vg--escaped-lv--escaped` (device-mapper escapes `-` as `--`),
//! or `/dev/vgname/lvname`.

use lxtask_common::error::{DriverError, Result};

use crate::command;

/// Narrow interface over the host's logical-volume tooling.
pub trait VolumeManager: Send + Sync {
    /// Creates a thin snapshot of `base` named `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be created; nothing is
    /// committed in that case.
    fn snapshot(&self, base: &str, name: &str) -> Result<()>;

    /// Removes the logical volume `name` from volume group `vg`.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails.
    fn remove(&self, vg: &str, name: &str) -> Result<()>;
}

/// Volume manager shelling out to the `lvcreate`/`lvremove` tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandLvm;

impl VolumeManager for CommandLvm {
    fn snapshot(&self, base: &str, name: &str) -> Result<()> {
        tracing::debug!(base, name, "creating lv: lvcreate -kn -n {name} -s {base}");
        let _ = command::run("lvcreate", &["-kn", "-n", name, "-s", base])?;
        Ok(())
    }

    fn remove(&self, vg: &str, name: &str) -> Result<()> {
        let reference = format!("{vg}/{name}");
        tracing::debug!(%reference, "removing lv");
        let _ = command::run("lvremove", &["-f", &reference])?;
        Ok(())
    }
}

/// Escapes a volume-group or logical-volume name for use in a
/// device-mapper path (`-` becomes `--`).
#[must_use]
pub fn escape_dashes(name: &str) -> String {
    name.replace('-', "--")
}

/// Builds the device-mapper path for a logical volume, escaping both
/// name components.
#[must_use]
pub fn device_mapper_path(vg: &str, lv: &str) -> String {
    format!("/dev/mapper/{}-{}", escape_dashes(vg), escape_dashes(lv))
}

/// Extracts the volume-group name from a logical-volume reference.
///
/// Accepts `vgname/lvname`, `/dev/mapper/<escaped>`, and
/// `/dev/vgname/lvname`. Names recovered from the device-mapper form are
/// unescaped, so [`device_mapper_path`] round-trips through this parser.
///
/// # Errors
///
/// Returns [`DriverError::VolumeGroupParse`] if the reference matches none
/// of the accepted forms.
pub fn extract_vg_name(reference: &str) -> Result<String> {
    let parse_err = || DriverError::VolumeGroupParse {
        reference: reference.to_string(),
    };

    if let Some(escaped) = reference.strip_prefix("/dev/mapper/") {
        let (vg, _lv) = split_device_mapper(escaped).ok_or_else(parse_err)?;
        return Ok(vg);
    }
    if let Some(rest) = reference.strip_prefix("/dev/") {
        // /dev/vgname/lvname
        let (vg, lv) = rest.rsplit_once('/').ok_or_else(parse_err)?;
        if vg.is_empty() || lv.is_empty() {
            return Err(parse_err());
        }
        return Ok(vg.to_string());
    }
    if reference.starts_with('/') {
        return Err(parse_err());
    }

    // vgname/lvname
    let mut components = reference.split('/');
    match (components.next(), components.next(), components.next()) {
        (Some(vg), Some(lv), None) if !vg.is_empty() && !lv.is_empty() => Ok(vg.to_string()),
        _ => Err(parse_err()),
    }
}

/// Splits an escaped device-mapper name into unescaped `(vg, lv)`.
///
/// A single `-` separates the components; `--` is a literal dash inside
/// either name.
fn split_device_mapper(escaped: &str) -> Option<(String, String)> {
    let bytes = escaped.as_bytes();
    let mut vg = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'-' {
            if bytes.get(i + 1) == Some(&b'-') {
                vg.push(b'-');
                i += 2;
            } else {
                let lv = escaped[i + 1..].replace("--", "-");
                if vg.is_empty() || lv.is_empty() {
                    return None;
                }
                let vg = String::from_utf8(vg).ok()?;
                return Some((vg, lv));
            }
        } else {
            vg.push(bytes[i]);
            i += 1;
        }
    }
    None
}
