//! Running-task handle.
//!
//! A [`TaskHandle`] is the driver's view of one supervised container: it
//! can signal a kill, adjust the kill timeout, persist its identity for
//! reattachment, translate usage statistics, and await termination. All
//! teardown is owned by the paired monitor task; the handle only signals.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use lxtask_common::config::DriverConfig;
use lxtask_common::error::{DriverError, Result};
use lxtask_common::types::UsageSnapshot;
use lxtask_lxc::container::LxcContainer;
use lxtask_lxc::lvm::VolumeManager;
use lxtask_lxc::probe::ProcessProbe;

use crate::monitor::Monitor;
use crate::provision::SnapshotRef;
use crate::stats::{self, CpuRates};

/// How a supervised task ended: cleanly (process exit or kill) or with a
/// supervision failure.
pub type TerminationResult = std::result::Result<(), DriverError>;

/// The identity a handle persists so a restarted driver can reattach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedIdentity {
    /// Derived container name, unique per task and allocation.
    pub container_name: String,
    /// Init PID observed at provisioning time.
    pub init_pid: i32,
    /// The LXC config path the container lives under.
    pub lxc_path: PathBuf,
    /// Kill timeout in effect when the identity was persisted.
    pub kill_timeout: Duration,
}

/// Handle to one running container.
pub struct TaskHandle {
    container: Arc<dyn LxcContainer>,
    init_pid: i32,
    kill_timeout: Mutex<Duration>,
    max_kill_timeout: Duration,
    cpu: Mutex<CpuRates>,
    kill_tx: watch::Sender<bool>,
    wait_rx: tokio::sync::Mutex<mpsc::Receiver<TerminationResult>>,
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("container", &self.container.name())
            .field("init_pid", &self.init_pid)
            .finish_non_exhaustive()
    }
}

impl TaskHandle {
    /// Wraps a provisioned container and spawns its monitor task.
    pub(crate) fn spawn(
        container: Arc<dyn LxcContainer>,
        init_pid: i32,
        probe: Arc<dyn ProcessProbe>,
        volumes: Arc<dyn VolumeManager>,
        snapshot: Option<SnapshotRef>,
        kill_timeout: Duration,
        config: &DriverConfig,
    ) -> Self {
        let (kill_tx, kill_rx) = watch::channel(false);
        let (result_tx, wait_rx) = mpsc::channel(1);
        let monitor = Monitor::new(
            Arc::clone(&container),
            init_pid,
            probe,
            volumes,
            snapshot,
            kill_rx,
            result_tx,
        );
        drop(tokio::spawn(monitor.run()));
        Self {
            container,
            init_pid,
            kill_timeout: Mutex::new(config.clamp_kill_timeout(kill_timeout)),
            max_kill_timeout: config.max_kill_timeout,
            cpu: Mutex::new(CpuRates::default()),
            kill_tx,
            wait_rx: tokio::sync::Mutex::new(wait_rx),
        }
    }

    /// Name of the underlying container.
    #[must_use]
    pub fn container_name(&self) -> &str {
        self.container.name()
    }

    /// Init PID observed at provisioning or reattach time.
    #[must_use]
    pub const fn init_pid(&self) -> i32 {
        self.init_pid
    }

    /// Requests termination: a graceful shutdown within the kill timeout,
    /// a forced stop if that fails, then the kill signal to the monitor,
    /// which performs all teardown. Idempotent; killing an
    /// already-stopped container is a no-op that still signals.
    ///
    /// # Errors
    ///
    /// Returns an error only if the forced stop itself fails; the
    /// container may still be running in that case.
    pub async fn kill(&self) -> Result<()> {
        let outcome = if self.container.is_running() {
            let timeout = *self
                .kill_timeout
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let container = Arc::clone(&self.container);
            tokio::task::spawn_blocking(move || {
                if let Err(e) = container.shutdown(timeout) {
                    tracing::warn!(name = %container.name(), error = %e, "graceful shutdown failed, forcing stop");
                    return container.stop();
                }
                Ok(())
            })
            .await
            .map_err(|e| DriverError::Runtime {
                command: "kill".into(),
                message: format!("kill task failed: {e}"),
            })?
        } else {
            Ok(())
        };
        // Signal regardless: the monitor owns destruction and must run
        // teardown even for a container that already stopped.
        let _ = self.kill_tx.send(true);
        outcome
    }

    /// Updates the kill timeout, clamped to the driver maximum.
    pub fn update_kill_timeout(&self, requested: Duration) {
        let clamped = requested.min(self.max_kill_timeout);
        *self
            .kill_timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = clamped;
    }

    /// Serializes the handle's identity for persistence.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Serialization`] if encoding fails.
    pub fn identity(&self) -> Result<String> {
        let identity = PersistedIdentity {
            container_name: self.container.name().to_string(),
            init_pid: self.init_pid,
            lxc_path: self.container.config_path().to_path_buf(),
            kill_timeout: *self
                .kill_timeout
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        };
        Ok(serde_json::to_string(&identity)?)
    }

    /// Samples the container's resource usage.
    ///
    /// Returns `Ok(None)` when CPU accounting is unavailable, which covers
    /// the window where the container is already gone but the monitor has
    /// not yet published termination.
    ///
    /// # Errors
    ///
    /// Currently infallible beyond the `None` case; the `Result` mirrors
    /// the other handle operations.
    pub fn stats(&self) -> Result<Option<UsageSnapshot>> {
        let times = match self.container.cpu_stats() {
            Ok(times) => times,
            Err(e) => {
                tracing::debug!(name = %self.container.name(), error = %e, "cpu accounting unavailable");
                return Ok(None);
            }
        };
        let total_ticks = match self.container.cpu_time() {
            Ok(total) => total,
            Err(e) => {
                tracing::debug!(name = %self.container.name(), error = %e, "cpu time unavailable");
                return Ok(None);
            }
        };
        let cpu = self
            .cpu
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sample(times, total_ticks);
        let memory = stats::collect_memory(&*self.container);
        Ok(Some(UsageSnapshot {
            cpu,
            memory,
            timestamp: chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        }))
    }

    /// Awaits the monitor's termination result.
    ///
    /// The first caller receives the result; every later call returns
    /// `None` because the monitor publishes exactly once and then closes
    /// the channel.
    pub async fn wait(&self) -> Option<TerminationResult> {
        self.wait_rx.lock().await.recv().await
    }
}
