//! Task configuration resolver.
//!
//! Decodes the orchestrator's loosely-typed configuration map into the
//! strongly-typed common and mode-specific configs, using permissive
//! coercion: numeric-looking strings are accepted for numbers, the usual
//! spellings are accepted for booleans, and scalars coerce into
//! single-element lists. Decoding has no side effects.

use std::path::PathBuf;

use serde_json::{Map, Value};

use lxtask_common::error::{DriverError, Result};
use lxtask_common::types::{LogLevel, Verbosity};
use lxtask_lxc::container::TemplateOptions;

/// Raw task configuration as submitted by the orchestrator.
pub type RawConfig = Map<String, Value>;

/// Configuration shared by both provisioning modes.
#[derive(Debug, Clone)]
pub struct CommonConfig {
    /// Runtime log verbosity.
    pub verbosity: Verbosity,
    /// Runtime log level.
    pub log_level: LogLevel,
    /// Selects the clone strategy (`true`) or the template strategy.
    pub use_execute: bool,
    /// Raw `host:container` volume specs.
    pub volumes: Vec<String>,
}

/// Configuration for template-provisioned (system) containers.
#[derive(Debug, Clone, Default)]
pub struct TemplateConfig {
    /// Template name. Mandatory.
    pub template: String,
    /// Distribution passed to the template.
    pub distro: String,
    /// Release passed to the template.
    pub release: String,
    /// Architecture passed to the template.
    pub arch: String,
    /// Image variant requested from the image server.
    pub image_variant: String,
    /// Image server override.
    pub image_server: String,
    /// GPG key ID used to validate downloaded images.
    pub gpg_key_id: String,
    /// GPG key server override.
    pub gpg_key_server: String,
    /// Whether to skip GPG validation entirely.
    pub disable_gpg: bool,
    /// Whether to flush the local image cache before building.
    pub flush_cache: bool,
    /// Whether to force use of the local image cache.
    pub force_cache: bool,
    /// Extra arguments passed through to the template.
    pub template_args: Vec<String>,
}

impl TemplateConfig {
    /// Maps this config onto the runtime's template invocation options.
    #[must_use]
    pub fn template_options(&self) -> TemplateOptions {
        TemplateOptions {
            template: self.template.clone(),
            distro: self.distro.clone(),
            release: self.release.clone(),
            arch: self.arch.clone(),
            flush_cache: self.flush_cache,
            disable_gpg_validation: self.disable_gpg,
            extra_args: self.template_args.clone(),
        }
    }
}

/// Configuration for clone-provisioned (application) containers.
#[derive(Debug, Clone)]
pub struct CloneConfig {
    /// Base logical-volume reference, `lvm:`-prefixed. Mandatory.
    pub base_rootfs_path: String,
    /// Path to the base container-config template file. Mandatory.
    pub base_config_path: PathBuf,
    /// Command and arguments executed inside the clone.
    pub cmd_args: Vec<String>,
}

/// Decodes the mode-independent configuration.
///
/// # Errors
///
/// Returns [`DriverError::Config`] if a field cannot be coerced or the
/// verbosity/log-level values are outside the recognized sets.
pub fn resolve_common(raw: &RawConfig) -> Result<CommonConfig> {
    Ok(CommonConfig {
        verbosity: Verbosity::from_config_str(&weak_string(raw, "verbosity")?)?,
        log_level: LogLevel::from_config_str(&weak_string(raw, "log_level")?)?,
        use_execute: weak_bool(raw, "use_execute")?,
        volumes: weak_string_list(raw, "volumes")?,
    })
}

/// Decodes the template-mode configuration.
///
/// # Errors
///
/// Returns [`DriverError::Config`] if `template` is missing or a field
/// cannot be coerced.
pub fn resolve_template(raw: &RawConfig) -> Result<TemplateConfig> {
    let template = weak_string(raw, "template")?;
    if template.is_empty() {
        return Err(DriverError::Config {
            message: "missing required field 'template'".into(),
        });
    }
    Ok(TemplateConfig {
        template,
        distro: weak_string(raw, "distro")?,
        release: weak_string(raw, "release")?,
        arch: weak_string(raw, "arch")?,
        image_variant: weak_string(raw, "image_variant")?,
        image_server: weak_string(raw, "image_server")?,
        gpg_key_id: weak_string(raw, "gpg_key_id")?,
        gpg_key_server: weak_string(raw, "gpg_key_server")?,
        disable_gpg: weak_bool(raw, "disable_gpg")?,
        flush_cache: weak_bool(raw, "flush_cache")?,
        force_cache: weak_bool(raw, "force_cache")?,
        template_args: weak_string_list(raw, "template_args")?,
    })
}

/// Decodes the clone-mode configuration.
///
/// # Errors
///
/// Returns [`DriverError::Config`] if `base_rootfs_path` or
/// `base_config_path` is missing, or a field cannot be coerced.
pub fn resolve_clone(raw: &RawConfig) -> Result<CloneConfig> {
    let base_rootfs_path = weak_string(raw, "base_rootfs_path")?;
    if base_rootfs_path.is_empty() {
        return Err(DriverError::Config {
            message: "missing required field 'base_rootfs_path'".into(),
        });
    }
    let base_config_path = weak_string(raw, "base_config_path")?;
    if base_config_path.is_empty() {
        return Err(DriverError::Config {
            message: "missing required field 'base_config_path'".into(),
        });
    }
    Ok(CloneConfig {
        base_rootfs_path,
        base_config_path: PathBuf::from(base_config_path),
        cmd_args: weak_string_list(raw, "cmd_args")?,
    })
}

/// Coerces a field to a string. Missing fields yield an empty string.
fn weak_string(raw: &RawConfig, key: &str) -> Result<String> {
    match raw.get(key) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(other) => Err(DriverError::Config {
            message: format!("invalid value for '{key}': {other}"),
        }),
    }
}

/// Coerces a field to a boolean. Missing fields yield `false`.
fn weak_bool(raw: &RawConfig, key: &str) -> Result<bool> {
    match raw.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) => match s.as_str() {
            "" | "false" | "0" => Ok(false),
            "true" | "1" => Ok(true),
            _ => Err(DriverError::Config {
                message: format!("invalid value for '{key}': {s}"),
            }),
        },
        Some(Value::Number(n)) => match n.as_u64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(DriverError::Config {
                message: format!("invalid value for '{key}': {n}"),
            }),
        },
        Some(other) => Err(DriverError::Config {
            message: format!("invalid value for '{key}': {other}"),
        }),
    }
}

/// Coerces a field to a list of strings. Missing fields yield an empty
/// list; a lone scalar coerces to a single-element list.
fn weak_string_list(raw: &RawConfig, key: &str) -> Result<Vec<String>> {
    match raw.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                Value::Bool(b) => Ok(b.to_string()),
                other => Err(DriverError::Config {
                    message: format!("invalid element in '{key}': {other}"),
                }),
            })
            .collect(),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(other) => Err(DriverError::Config {
            message: format!("invalid value for '{key}': {other}"),
        }),
    }
}
