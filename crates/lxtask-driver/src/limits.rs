//! Resource limit application.
//!
//! Runs after the container exists; the template strategy applies limits
//! after start, the clone strategy around direct execution. Failures are
//! non-retryable and trigger full provisioning rollback in the caller.

use lxtask_common::error::{DriverError, Result};
use lxtask_lxc::container::LxcContainer;

use crate::task::Resources;

/// Applies the task's memory ceiling and CPU-share weight to the container.
///
/// # Errors
///
/// Returns [`DriverError::Limit`] if either cgroup write fails.
pub fn apply(container: &dyn LxcContainer, resources: &Resources) -> Result<()> {
    container
        .set_memory_limit(resources.memory_mb * 1024 * 1024)
        .map_err(|e| DriverError::Limit {
            message: format!("unable to set memory limits: {e}"),
        })?;
    container
        .set_cgroup_item("cpu.shares", &resources.cpu_shares.to_string())
        .map_err(|e| DriverError::Limit {
            message: format!("unable to set cpu shares: {e}"),
        })?;
    tracing::debug!(
        name = %container.name(),
        memory_mb = resources.memory_mb,
        cpu_shares = resources.cpu_shares,
        "resource limits applied"
    );
    Ok(())
}
