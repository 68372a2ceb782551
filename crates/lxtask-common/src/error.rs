//! Unified error types for the lxtask workspace.
//!
//! Every provisioning-stage error is paired with a rollback closure by the
//! caller; teardown problems inside the liveness monitor are logged and never
//! surface as a value of this type.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum DriverError {
    /// A task configuration field is missing, malformed, or out of range.
    #[error("invalid driver configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A volume bind-mount specification is malformed or disallowed.
    #[error("invalid volume bind mount entry '{spec}': {reason}")]
    VolumeConfig {
        /// The raw `host:container` spec as given.
        spec: String,
        /// Why the spec was rejected.
        reason: String,
    },

    /// A clone base rootfs reference names a storage backend other than LVM.
    #[error("only LVM is supported as a base to clone from, got '{reference}'")]
    UnsupportedBackend {
        /// The offending base rootfs reference.
        reference: String,
    },

    /// Container materialization (template build or clone) failed.
    #[error("provisioning failed: {message}")]
    Provision {
        /// Description of the failed provisioning step.
        message: String,
    },

    /// A logical-volume reference could not be parsed into a volume group.
    #[error("could not parse LVM volume group name from '{reference}'")]
    VolumeGroupParse {
        /// The unparseable logical-volume reference.
        reference: String,
    },

    /// Applying cgroup resource limits to the container failed.
    #[error("unable to set resource limits: {message}")]
    Limit {
        /// Description of the failed limit application.
        message: String,
    },

    /// `open` found no container with the persisted name at the config path.
    #[error("container {name} not found")]
    ContainerNotFound {
        /// Name of the missing container.
        name: String,
    },

    /// An external runtime command failed or reported an error.
    #[error("{command} failed: {message}")]
    Runtime {
        /// The command or runtime operation that failed.
        command: String,
        /// Captured stderr or error description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Serialization or deserialization of the identity token failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, DriverError>;
