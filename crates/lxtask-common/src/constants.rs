//! Fixed values shared by the driver and capability crates.

use std::time::Duration;

/// Interval at which the liveness monitor checks the container's init process.
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(2);

/// How long the monitor waits for the container to reach the stopped state
/// before destroying it anyway.
pub const STOP_WAIT_TIMEOUT: Duration = Duration::from_secs(15);

/// Mount options applied to every bind mount entry.
pub const BIND_MOUNT_OPTIONS: &str = "rw,bind,create=dir";

/// Prefix tagging a clone base rootfs reference as LVM-backed.
pub const LVM_PREFIX: &str = "lvm:";

/// Default LXC configuration root when the node config does not override it.
pub const DEFAULT_LXC_PATH: &str = "/var/lib/lxc";

/// Node option enabling bind mounts to arbitrary absolute host paths.
pub const VOLUMES_ENABLED_OPTION: &str = "lxc.volumes.enabled";

/// Node option overriding the LXC configuration root path.
pub const LXC_PATH_OPTION: &str = "driver.lxc.path";

/// Node attribute carrying the detected LXC version.
pub const ATTR_LXC_VERSION: &str = "driver.lxc.version";

/// Node attribute advertising that the driver is usable.
pub const ATTR_LXC_ENABLED: &str = "driver.lxc";

/// Node attribute advertising custom volume support.
pub const ATTR_VOLUMES_ENABLED: &str = "driver.lxc.volumes.enabled";

/// Scheduler clock ticks per second assumed when converting cgroup CPU
/// accounting into percentages (USER_HZ on every mainstream Linux).
pub const CLOCK_TICKS_PER_SEC: f64 = 100.0;
